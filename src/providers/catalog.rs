// Offline upstream backed by a fixed catalog. Used when no real provider is
// configured and as the test double: failures, latency and outages can be
// injected per provider.

use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use tracing::trace;

use super::{ProviderKind, Upstream};
use crate::{
    error::ProviderError,
    models::{Flight, Place, PlaceType, WeatherSnapshot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Normal,
    Degraded,
    PartialOutage,
    CompleteOutage,
}

pub struct CatalogUpstream {
    mode: AtomicU8,
    request_counts: [AtomicUsize; 4],
    fail_next_requests: AtomicUsize,
    delay_ms: AtomicU64,
    failing: RwLock<HashSet<ProviderKind>>,
    places: RwLock<HashMap<PlaceType, Vec<Place>>>,
    flights: Vec<Flight>,
}

impl Default for CatalogUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogUpstream {
    pub fn new() -> Self {
        let places = HashMap::from([
            (PlaceType::TouristAttraction, default_attractions()),
            (PlaceType::Restaurant, default_restaurants()),
            (PlaceType::Hotel, default_hotels()),
        ]);

        Self {
            mode: AtomicU8::new(0),
            request_counts: Default::default(),
            fail_next_requests: AtomicUsize::new(0),
            delay_ms: AtomicU64::new(0),
            failing: RwLock::new(HashSet::new()),
            places: RwLock::new(places),
            flights: default_flights(),
        }
    }

    pub fn set_mode(&self, mode: ServerMode) {
        let mode_value = match mode {
            ServerMode::Normal => 0,
            ServerMode::Degraded => 1,
            ServerMode::PartialOutage => 2,
            ServerMode::CompleteOutage => 3,
        };
        self.mode.store(mode_value, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    // Every call to `kind` fails until `restore` is called
    pub fn fail_provider(&self, kind: ProviderKind) {
        self.failing.write().insert(kind);
    }

    pub fn restore(&self, kind: ProviderKind) {
        self.failing.write().remove(&kind);
    }

    pub fn set_places(&self, kind: PlaceType, places: Vec<Place>) {
        self.places.write().insert(kind, places);
    }

    pub fn request_count(&self, kind: ProviderKind) -> usize {
        self.request_counts[kind.index()].load(Ordering::SeqCst)
    }

    pub fn total_requests(&self) -> usize {
        ProviderKind::ALL
            .iter()
            .map(|kind| self.request_count(*kind))
            .sum()
    }

    // Shared preamble for every call: counting, delay and failure injection
    async fn admit(&self, kind: ProviderKind) -> Result<(), ProviderError> {
        self.request_counts[kind.index()].fetch_add(1, Ordering::SeqCst);
        trace!(provider = kind.as_str(), "catalog upstream call");

        let mode = self.mode.load(Ordering::SeqCst);
        if mode == 3 {
            return Err(ProviderError::Network("Service unavailable".to_string()));
        }

        if self.failing.read().contains(&kind) {
            return Err(ProviderError::ApiResponse {
                status_code: 503,
                message: format!("{} provider is down", kind.as_str()),
            });
        }

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            // Normal mode adds no jitter
            let jitter = if mode > 0 {
                rand::random::<u64>() % delay
            } else {
                0
            };
            tokio::time::sleep(Duration::from_millis(delay + jitter)).await;
        }

        let fail_probability = match mode {
            1 => 0.1,
            2 => 0.5,
            _ => 0.0,
        };
        if fail_probability > 0.0 && rand::random::<f64>() < fail_probability {
            return Err(ProviderError::ApiResponse {
                status_code: 503,
                message: "Service temporarily unavailable".to_string(),
            });
        }

        let claimed = self
            .fail_next_requests
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if claimed.is_ok() {
            return Err(ProviderError::ApiResponse {
                status_code: 500,
                message: "Internal Server Error".to_string(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Upstream for CatalogUpstream {
    async fn weather(&self, city: &str) -> Result<WeatherSnapshot, ProviderError> {
        self.admit(ProviderKind::Weather).await?;

        Ok(WeatherSnapshot {
            temperature: 22.0,
            feels_like: 21.4,
            humidity: 48.0,
            description: "clear sky".to_string(),
            wind_speed: 3.1,
            city: city.trim().to_string(),
            country: "CN".to_string(),
        })
    }

    async fn places(&self, _location: &str, kind: PlaceType) -> Result<Vec<Place>, ProviderError> {
        self.admit(ProviderKind::Places).await?;
        Ok(self.places.read().get(&kind).cloned().unwrap_or_default())
    }

    async fn flights(
        &self,
        _origin: &str,
        _destination: &str,
        _date: NaiveDate,
    ) -> Result<Vec<Flight>, ProviderError> {
        self.admit(ProviderKind::Flights).await?;
        Ok(self.flights.clone())
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        self.admit(ProviderKind::Translation).await?;

        let known = match (text, target_lang) {
            ("你好", "EN") => Some("Hello"),
            ("谢谢", "EN") => Some("Thank you"),
            ("再见", "EN") => Some("Goodbye"),
            ("多少钱", "EN") => Some("How much"),
            ("洗手间在哪里", "EN") => Some("Where is the restroom"),
            _ => None,
        };

        Ok(known
            .map(str::to_string)
            .unwrap_or_else(|| format!("[Translation of: {text}]")))
    }
}

fn place(
    name: &str,
    rating: f64,
    category: Option<&str>,
    price_level: Option<u8>,
    stars: Option<u8>,
    price_range: Option<&str>,
) -> Place {
    Place {
        name: name.to_string(),
        rating,
        category: category.map(str::to_string),
        price_level,
        stars,
        price_range: price_range.map(str::to_string),
    }
}

fn default_attractions() -> Vec<Place> {
    vec![
        place("Forbidden City", 4.8, Some("historic site"), Some(2), None, None),
        place("Great Wall at Badaling", 4.9, Some("world heritage"), Some(2), None, None),
        place("Summer Palace", 4.7, Some("imperial garden"), Some(2), None, None),
    ]
}

fn default_restaurants() -> Vec<Place> {
    vec![
        place("Quanjude Roast Duck", 4.5, Some("Beijing cuisine"), Some(3), None, None),
        place("Donglaishun", 4.6, Some("hot pot"), Some(3), None, None),
        place("Bianyifang", 4.4, Some("roast duck"), Some(2), None, None),
    ]
}

fn default_hotels() -> Vec<Place> {
    vec![
        place("Beijing Hotel", 4.7, None, None, Some(5), Some("¥800-1500")),
        place("Peace Hotel", 4.6, None, None, Some(4), Some("¥500-800")),
        place("Home Inn", 4.2, None, None, Some(3), Some("¥200-400")),
    ]
}

fn flight(airline: &str, number: &str, departure: &str, arrival: &str, price: f64, duration: &str) -> Flight {
    Flight {
        airline: airline.to_string(),
        flight_number: number.to_string(),
        departure: departure.to_string(),
        arrival: arrival.to_string(),
        price,
        duration: duration.to_string(),
    }
}

fn default_flights() -> Vec<Flight> {
    vec![
        flight("Air China", "CA1234", "08:00", "10:30", 1250.0, "2h 30m"),
        flight("China Eastern", "MU5678", "14:00", "16:45", 980.0, "2h 45m"),
        flight("China Southern", "CZ9012", "19:00", "21:20", 1100.0, "2h 20m"),
    ]
}
