// Planner configuration: cache sizing, gateway limits, provider endpoints and
// budget rates. Every section has a usable default; `from_env` overlays the
// process environment on top.

use std::{env, str::FromStr, time::Duration};

use crate::{cache::CacheConfig, error::ConfigError};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub timeout_ms: u64,
    pub max_concurrent_requests: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_concurrent_requests: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub api_key: String,
}

impl Endpoint {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub weather: Endpoint,
    pub places: Endpoint,
    pub translation: Endpoint,
    pub flight: Endpoint,
    // `lang` sent with weather requests; localizes the description
    pub weather_lang: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            weather: Endpoint::new("https://api.openweathermap.org/data/2.5"),
            places: Endpoint::new("https://maps.googleapis.com/maps/api/place"),
            translation: Endpoint::new("https://api-free.deepl.com/v2"),
            flight: Endpoint::new("https://api.amadeus.com/v2"),
            weather_lang: "zh_cn".to_string(),
        }
    }
}

// Base amounts before the travel-style multiplier. `per_day` categories are
// multiplied by the trip length, the rest are flat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetRates {
    pub flights: u64,
    pub accommodation_per_day: u64,
    pub meals_per_day: u64,
    pub attractions_per_day: u64,
    pub transportation_per_day: u64,
    pub shopping: u64,
    pub emergency: u64,
}

impl Default for BudgetRates {
    fn default() -> Self {
        Self {
            flights: 2000,
            accommodation_per_day: 500,
            meals_per_day: 200,
            attractions_per_day: 150,
            transportation_per_day: 100,
            shopping: 500,
            emergency: 500,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub cache: CacheConfig,
    pub gateway: GatewayConfig,
    pub providers: ProviderEndpoints,
    pub budget: BudgetRates,
    pub phrases: Vec<String>,
    pub phrase_target_lang: String,
    pub max_plans: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            gateway: GatewayConfig::default(),
            providers: ProviderEndpoints::default(),
            budget: BudgetRates::default(),
            phrases: ["你好", "谢谢", "再见", "多少钱", "洗手间在哪里"]
                .iter()
                .map(|p| p.to_string())
                .collect(),
            phrase_target_lang: "EN".to_string(),
            max_plans: 16,
        }
    }
}

impl PlannerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(key) = read_var("WEATHER_API_KEY") {
            config.providers.weather.api_key = key;
        }
        if let Some(key) = read_var("GOOGLE_PLACES_KEY") {
            config.providers.places.api_key = key;
        }
        if let Some(key) = read_var("DEEPL_API_KEY") {
            config.providers.translation.api_key = key;
        }
        if let Some(key) = read_var("AMADEUS_API_KEY") {
            config.providers.flight.api_key = key;
        }
        if let Some(lang) = read_var("WEATHER_LANG") {
            config.providers.weather_lang = lang;
        }

        if let Some(size) = parse_var::<usize>("TRAVEL_CACHE_MAX_SIZE")? {
            config.cache.max_size = size;
        }
        if let Some(secs) = parse_var::<u64>("TRAVEL_CACHE_TTL_SECS")? {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_var::<u64>("TRAVEL_PROVIDER_TIMEOUT_MS")? {
            config.gateway.timeout_ms = ms;
        }
        if let Some(limit) = parse_var::<usize>("TRAVEL_MAX_CONCURRENT_REQUESTS")? {
            config.gateway.max_concurrent_requests = limit;
        }
        if let Some(limit) = parse_var::<usize>("TRAVEL_MAX_PLANS")? {
            config.max_plans = limit;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("cache.max_size", self.cache.max_size),
            ("gateway.max_concurrent_requests", self.gateway.max_concurrent_requests),
            ("max_plans", self.max_plans),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(invalid(key, "must be at least 1"));
            }
        }

        if self.cache.ttl.is_zero() {
            return Err(invalid("cache.ttl", "must be non-zero"));
        }
        if self.gateway.timeout_ms == 0 {
            return Err(invalid("gateway.timeout_ms", "must be non-zero"));
        }

        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn read_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    read_var(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| invalid(key, format!("cannot parse {raw:?}: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlannerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.max_size, 100);
        assert_eq!(config.cache.ttl, Duration::from_secs(3600));
        assert_eq!(config.phrases.len(), 5);
        assert_eq!(config.providers.weather_lang, "zh_cn");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = PlannerConfig::default();
        config.max_plans = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { ref key, .. }) if key == "max_plans"
        ));

        let mut config = PlannerConfig::default();
        config.gateway.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overlay() {
        env::set_var("TRAVEL_CACHE_MAX_SIZE", "7");
        env::set_var("TRAVEL_PROVIDER_TIMEOUT_MS", "250");
        env::set_var("WEATHER_LANG", "en");
        let config = PlannerConfig::from_env().unwrap();
        assert_eq!(config.cache.max_size, 7);
        assert_eq!(config.gateway.timeout_ms, 250);
        assert_eq!(config.providers.weather_lang, "en");

        env::set_var("TRAVEL_CACHE_MAX_SIZE", "lots");
        assert!(PlannerConfig::from_env().is_err());

        env::remove_var("TRAVEL_CACHE_MAX_SIZE");
        env::remove_var("TRAVEL_PROVIDER_TIMEOUT_MS");
        env::remove_var("WEATHER_LANG");
    }
}
