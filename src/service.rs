// Service boundary: named operations and read-only resources over JSON.
// `call` reports typed errors; `handle` folds every outcome, including a
// panic inside an operation, into a ToolResponse.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use futures::FutureExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::{
    config::PlannerConfig,
    error::{ConfigError, PlannerError},
    models::{parse_date, CreatePlanArgs, OptimizePreferences, PlaceType, PlanRequest},
    pipeline::TravelPlanner,
    providers::HttpUpstream,
};

pub const CURRENT_PLAN_URI: &str = "travel://current-plan";
pub const CACHE_STATS_URI: &str = "travel://cache-stats";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(#[source] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub is_error: bool,
    pub payload: Value,
}

#[derive(Deserialize)]
struct WeatherArgs {
    city: String,
}

#[derive(Deserialize)]
struct PlacesArgs {
    location: String,
    #[serde(rename = "type")]
    kind: PlaceType,
}

#[derive(Deserialize)]
struct FlightsArgs {
    origin: String,
    destination: String,
    date: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateArgs {
    text: String,
    target_lang: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeArgs {
    plan_id: String,
    #[serde(default)]
    preferences: OptimizePreferences,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ServiceError> {
    // Operations without required arguments accept a missing object
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(ServiceError::InvalidArguments)
}

fn to_payload<T: Serialize>(value: &T, what: &str) -> Result<Value, ServiceError> {
    Ok(serde_json::to_value(value).with_context(|| format!("serializing {what}"))?)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string())
}

pub struct TravelService {
    planner: Arc<TravelPlanner>,
}

impl TravelService {
    pub fn new(planner: Arc<TravelPlanner>) -> Self {
        Self { planner }
    }

    /// Service backed by the live HTTP providers configured in `config`.
    pub fn from_config(config: &PlannerConfig) -> Result<Self, ConfigError> {
        let upstream = HttpUpstream::new(
            config.providers.clone(),
            Duration::from_millis(config.gateway.timeout_ms),
        )?;
        let planner = TravelPlanner::new(config, Arc::new(upstream))?;
        Ok(Self::new(Arc::new(planner)))
    }

    pub fn planner(&self) -> &TravelPlanner {
        &self.planner
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<Value, ServiceError> {
        debug!(operation = name, "dispatching operation");
        let gateway = self.planner.gateway();

        match name {
            "create_travel_plan" => {
                let args: CreatePlanArgs = parse_args(args)?;
                let request = PlanRequest::try_from(args)?;
                let plan = self.planner.create_plan(request).await?;
                to_payload(&plan, "plan")
            }
            "get_weather" => {
                let args: WeatherArgs = parse_args(args)?;
                to_payload(&gateway.get_weather(&args.city).await, "weather")
            }
            "search_places" => {
                let args: PlacesArgs = parse_args(args)?;
                to_payload(&gateway.search_places(&args.location, args.kind).await, "places")
            }
            "search_flights" => {
                let args: FlightsArgs = parse_args(args)?;
                let date = parse_date("date", &args.date)?;
                to_payload(
                    &gateway.search_flights(&args.origin, &args.destination, date).await,
                    "flights",
                )
            }
            "translate" => {
                let args: TranslateArgs = parse_args(args)?;
                to_payload(
                    &gateway.translate(&args.text, args.target_lang.as_deref()).await,
                    "translation",
                )
            }
            "optimize_plan" => {
                let args: OptimizeArgs = parse_args(args)?;
                let plan = self.planner.optimize_plan(&args.plan_id, &args.preferences)?;
                to_payload(&plan, "plan")
            }
            other => Err(ServiceError::UnknownOperation(other.to_string())),
        }
    }

    pub async fn handle(&self, name: &str, args: Value) -> ToolResponse {
        let outcome = AssertUnwindSafe(self.call(name, args))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic);
                error!(operation = name, panic = %message, "operation panicked");
                Err(ServiceError::Internal(anyhow!(message)))
            });

        match outcome {
            Ok(payload) => ToolResponse {
                is_error: false,
                payload,
            },
            Err(err) => {
                warn!(operation = name, error = %err, "operation failed");
                ToolResponse {
                    is_error: true,
                    payload: json!({ "error": err.to_string() }),
                }
            }
        }
    }

    pub fn read_resource(&self, uri: &str) -> Result<Value, ServiceError> {
        match uri {
            CURRENT_PLAN_URI => match self.planner.store().current() {
                Some(plan) => to_payload(&plan, "current plan"),
                None => Ok(json!({ "message": "No travel plan created yet" })),
            },
            CACHE_STATS_URI => {
                let stats = self.planner.gateway().cache_stats();
                Ok(json!({
                    "cacheSize": stats.items_count,
                    "maxSize": stats.capacity,
                    "ttl": stats.ttl.as_millis() as u64,
                    "hitCount": stats.hit_count,
                    "missCount": stats.miss_count,
                    "evictionCount": stats.eviction_count,
                    "expiredCount": stats.expired_count,
                }))
            }
            other => Err(ServiceError::UnknownResource(other.to_string())),
        }
    }
}
