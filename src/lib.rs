// Travel planning service: provider gateway with an expiring cache, a
// concurrent planning pipeline and a bounded plan store

pub mod budget;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod itinerary;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod service;
pub mod store;

// Re-export key types for convenience
pub use cache::{CacheConfig, CacheStats, ExpiringCache};
pub use config::{BudgetRates, GatewayConfig, PlannerConfig, ProviderEndpoints};
pub use error::{ConfigError, ErrorRecord, PlannerError, ProviderError};
pub use gateway::ProviderGateway;
pub use models::{
    BudgetBreakdown, Flight, ItineraryDay, OptimizePreferences, Place, PlaceType, Plan,
    PlanComponents, PlanRequest, StageResult, TravelStyle, WeatherSnapshot,
};
pub use pipeline::TravelPlanner;
pub use providers::{CatalogUpstream, HttpUpstream, ProviderKind, Upstream};
pub use service::{ServiceError, ToolResponse, TravelService};
pub use store::PlanStore;
