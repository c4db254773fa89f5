// Provider gateway: every upstream lookup goes through here. The gateway builds
// the cache key, answers from the cache when it can, coalesces concurrent
// misses onto a single upstream call, bounds upstream concurrency and turns
// every failure into an ErrorRecord.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::NaiveDate;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::{
    cache::{CacheStats, ExpiringCache},
    config::GatewayConfig,
    error::{ErrorRecord, ProviderError},
    models::{Flight, Place, PlaceType, StageResult, WeatherSnapshot, DATE_FORMAT},
    providers::{ProviderKind, Upstream},
};

pub const DEFAULT_TARGET_LANG: &str = "EN";

type CallOutcome = Result<Value, ErrorRecord>;
type CallFuture = BoxFuture<'static, CallOutcome>;
type SharedCall = Shared<CallFuture>;

// In-flight upstream calls keyed by cache key. The map only holds weak
// handles; the call stays alive while at least one caller is waiting on it.
// The id lets a finished call remove its own entry without clobbering a newer
// call for the same key.
type InflightMap = DashMap<String, (u64, WeakShared<CallFuture>)>;

// Cache keys are built from the operation name plus normalized arguments
pub fn weather_key(city: &str) -> String {
    format!("weather:{}", normalize(city))
}

pub fn places_key(location: &str, kind: PlaceType) -> String {
    format!("places:{}:{}", normalize(location), kind.as_str())
}

pub fn flights_key(origin: &str, destination: &str, date: NaiveDate) -> String {
    format!(
        "flights:{}:{}:{}",
        normalize(origin),
        normalize(destination),
        date.format(DATE_FORMAT)
    )
}

pub fn translate_key(text: &str, target_lang: &str) -> String {
    format!("translate:{}:{}", text.trim(), target_lang.trim().to_uppercase())
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

// User-facing message for each operation's failure record
fn failure_message(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Weather => "Unable to fetch weather information",
        ProviderKind::Places => "Unable to fetch place information",
        ProviderKind::Flights => "Unable to fetch flight information",
        ProviderKind::Translation => "Translation failed",
    }
}

// One caller's handle on an in-flight call. The last waiter to go away,
// finished or cancelled, removes the entry.
struct Waiter {
    shared: Option<SharedCall>,
    inflight: Arc<InflightMap>,
    key: String,
    id: u64,
}

impl Drop for Waiter {
    fn drop(&mut self) {
        // Release our strong handle first so the liveness check below sees
        // only the other waiters.
        self.shared.take();
        let id = self.id;
        self.inflight.remove_if(&self.key, |_, (entry_id, weak)| {
            *entry_id == id && weak.upgrade().is_none()
        });
    }
}

pub struct ProviderGateway {
    upstream: Arc<dyn Upstream>,
    cache: Arc<ExpiringCache<Value>>,
    inflight: Arc<InflightMap>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
    next_call_id: AtomicU64,
}

impl ProviderGateway {
    pub fn new(
        upstream: Arc<dyn Upstream>,
        cache: Arc<ExpiringCache<Value>>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            upstream,
            cache,
            inflight: Arc::new(DashMap::new()),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            timeout: Duration::from_millis(config.timeout_ms),
            next_call_id: AtomicU64::new(0),
        }
    }

    pub async fn get_weather(&self, city: &str) -> StageResult<WeatherSnapshot> {
        let city = city.trim().to_string();
        self.fetch(ProviderKind::Weather, weather_key(&city), move |upstream| async move {
            upstream.weather(&city).await
        })
        .await
    }

    pub async fn search_places(&self, location: &str, kind: PlaceType) -> StageResult<Vec<Place>> {
        let location = location.trim().to_string();
        self.fetch(
            ProviderKind::Places,
            places_key(&location, kind),
            move |upstream| async move { upstream.places(&location, kind).await },
        )
        .await
    }

    pub async fn search_flights(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> StageResult<Vec<Flight>> {
        let origin = origin.trim().to_string();
        let destination = destination.trim().to_string();
        self.fetch(
            ProviderKind::Flights,
            flights_key(&origin, &destination, date),
            move |upstream| async move { upstream.flights(&origin, &destination, date).await },
        )
        .await
    }

    pub async fn translate(&self, text: &str, target_lang: Option<&str>) -> StageResult<String> {
        let text = text.trim().to_string();
        let lang = target_lang
            .map(|l| l.trim().to_uppercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_TARGET_LANG.to_string());
        self.fetch(
            ProviderKind::Translation,
            translate_key(&text, &lang),
            move |upstream| async move { upstream.translate(&text, &lang).await },
        )
        .await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    async fn fetch<T, F, Fut>(&self, kind: ProviderKind, key: String, call: F) -> StageResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(Arc<dyn Upstream>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(&key) {
            debug!(key = %key, "cache hit");
            return decode(kind, value);
        }

        let (id, shared) = match self.inflight.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get().1.upgrade() {
                Some(shared) => {
                    debug!(key = %key, "joining in-flight call");
                    (entry.get().0, shared)
                }
                None => {
                    // Every waiter on the previous call is gone
                    let (id, shared) = self.begin(kind, &key, call);
                    if let Some(weak) = shared.downgrade() {
                        entry.insert((id, weak));
                    }
                    (id, shared)
                }
            },
            Entry::Vacant(entry) => {
                // A call that completed between the first lookup and taking the
                // shard lock has already written the cache.
                if let Some(value) = self.cache.peek(&key) {
                    return decode(kind, value);
                }

                let (id, shared) = self.begin(kind, &key, call);
                if let Some(weak) = shared.downgrade() {
                    entry.insert((id, weak));
                }
                (id, shared)
            }
        };

        let mut waiter = Waiter {
            shared: Some(shared),
            inflight: Arc::clone(&self.inflight),
            key,
            id,
        };
        let outcome = match waiter.shared.as_mut() {
            Some(shared) => shared.await,
            None => {
                return StageResult::Failed(ErrorRecord::new(failure_message(kind), "call released"))
            }
        };

        match outcome {
            Ok(value) => decode(kind, value),
            Err(record) => StageResult::Failed(record),
        }
    }

    fn begin<T, F, Fut>(&self, kind: ProviderKind, key: &str, call: F) -> (u64, SharedCall)
    where
        T: Serialize + Send + 'static,
        F: FnOnce(Arc<dyn Upstream>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
        let shared = self.start_call(kind, key.to_string(), id, call(Arc::clone(&self.upstream)));
        (id, shared)
    }

    fn start_call<T, Fut>(&self, kind: ProviderKind, key: String, id: u64, call: Fut) -> SharedCall
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        let inflight = Arc::clone(&self.inflight);
        let limiter = Arc::clone(&self.limiter);
        let timeout = self.timeout;

        async move {
            let outcome = async {
                let _permit = limiter
                    .acquire()
                    .await
                    .map_err(|_| ProviderError::Unavailable("gateway shut down".to_string()))?;
                let value = tokio::time::timeout(timeout, call)
                    .await
                    .map_err(|_| ProviderError::Timeout(timeout.as_millis() as u64))??;
                serde_json::to_value(value).map_err(ProviderError::from)
            }
            .await;

            let result = match outcome {
                Ok(value) => {
                    cache.set(key.clone(), value.clone());
                    Ok(value)
                }
                Err(err) => {
                    warn!(provider = kind.as_str(), key = %key, error = %err, "provider call failed");
                    Err(ErrorRecord::new(failure_message(kind), err.to_string()))
                }
            };

            inflight.remove_if(&key, |_, (entry_id, _)| *entry_id == id);
            result
        }
        .boxed()
        .shared()
    }
}

fn decode<T: DeserializeOwned>(kind: ProviderKind, value: Value) -> StageResult<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => StageResult::Ready(decoded),
        Err(err) => StageResult::Failed(ErrorRecord::new(
            failure_message(kind),
            ProviderError::from(err).to_string(),
        )),
    }
}
