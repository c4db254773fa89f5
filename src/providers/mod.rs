// Upstream provider contract. The gateway talks to providers only through this
// trait; responses are already normalized into the crate's record types.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::ProviderError,
    models::{Flight, Place, PlaceType, WeatherSnapshot},
};

pub mod catalog;
pub mod http;

pub use catalog::{CatalogUpstream, ServerMode};
pub use http::HttpUpstream;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Weather,
    Places,
    Flights,
    Translation,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Weather,
        ProviderKind::Places,
        ProviderKind::Flights,
        ProviderKind::Translation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Weather => "weather",
            ProviderKind::Places => "places",
            ProviderKind::Flights => "flights",
            ProviderKind::Translation => "translate",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            ProviderKind::Weather => 0,
            ProviderKind::Places => 1,
            ProviderKind::Flights => 2,
            ProviderKind::Translation => 3,
        }
    }
}

// Calls must be idempotent reads; the gateway may drop a call mid-flight when
// every caller waiting on it has gone away.
#[async_trait]
pub trait Upstream: Send + Sync + 'static {
    async fn weather(&self, city: &str) -> Result<WeatherSnapshot, ProviderError>;

    async fn places(&self, location: &str, kind: PlaceType) -> Result<Vec<Place>, ProviderError>;

    async fn flights(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Flight>, ProviderError>;

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError>;
}
