// Planning pipeline: fan out to the providers, join, then derive the itinerary,
// translations and budget, and commit the finished plan to the store.

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    budget::estimate_budget,
    cache::ExpiringCache,
    config::{BudgetRates, PlannerConfig},
    error::{ConfigError, PlannerError},
    gateway::ProviderGateway,
    itinerary::generate_itinerary,
    models::{
        calculate_days, OptimizePreferences, Plan, PlaceType, PlanRequest, TravelStyle,
        Translations,
    },
    providers::Upstream,
    store::PlanStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Created,
    FanOut,
    Itinerary,
    Translations,
    Budget,
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Created => "created",
            Stage::FanOut => "fan_out",
            Stage::Itinerary => "itinerary",
            Stage::Translations => "translations",
            Stage::Budget => "budget",
            Stage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

pub struct TravelPlanner {
    gateway: Arc<ProviderGateway>,
    store: PlanStore,
    rates: BudgetRates,
    phrases: Vec<String>,
    phrase_target_lang: String,
    plan_seq: AtomicU64,
}

impl TravelPlanner {
    pub fn new(config: &PlannerConfig, upstream: Arc<dyn Upstream>) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache: Arc<ExpiringCache<Value>> = Arc::new(ExpiringCache::new(config.cache.clone())?);
        let gateway = Arc::new(ProviderGateway::new(upstream, cache, &config.gateway));

        Ok(Self {
            gateway,
            store: PlanStore::new(config.max_plans),
            rates: config.budget,
            phrases: config.phrases.clone(),
            phrase_target_lang: config.phrase_target_lang.clone(),
            plan_seq: AtomicU64::new(0),
        })
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    pub fn store(&self) -> &PlanStore {
        &self.store
    }

    fn next_plan_id(&self) -> String {
        let seq = self.plan_seq.fetch_add(1, Ordering::Relaxed);
        format!("plan_{}_{}", Utc::now().timestamp_millis(), seq)
    }

    /// Runs the full pipeline and commits the plan.
    ///
    /// Provider failures never abort the run: the affected component carries
    /// an error record and later stages work with what is left. The plan is
    /// only visible in the store once every stage has finished.
    pub async fn create_plan(&self, request: PlanRequest) -> Result<Plan, PlannerError> {
        let started = Instant::now();
        let mut plan = Plan::new(self.next_plan_id(), &request);
        info!(
            plan_id = %plan.id,
            destination = %request.destination,
            origin = %request.origin,
            days = request.days(),
            stage = %Stage::Created,
            "creating travel plan"
        );

        debug!(plan_id = %plan.id, stage = %Stage::FanOut, "querying providers");
        let gateway = &self.gateway;
        let (weather, flights, hotels, attractions, restaurants) = tokio::join!(
            gateway.get_weather(&request.destination),
            gateway.search_flights(&request.origin, &request.destination, request.start_date),
            gateway.search_places(&request.destination, PlaceType::Hotel),
            gateway.search_places(&request.destination, PlaceType::TouristAttraction),
            gateway.search_places(&request.destination, PlaceType::Restaurant),
        );

        let components = &mut plan.components;
        components.weather = Some(weather);
        components.flights = Some(flights);
        components.hotels = Some(hotels);
        components.attractions = Some(attractions);
        components.restaurants = Some(restaurants);

        debug!(plan_id = %plan.id, stage = %Stage::Itinerary, "building itinerary");
        components.itinerary = Some(generate_itinerary(
            request.start_date,
            request.end_date,
            components.attractions.as_ref(),
            components.restaurants.as_ref(),
        ));

        debug!(plan_id = %plan.id, stage = %Stage::Translations, "translating phrases");
        plan.components.translations = Some(self.prepare_translations().await);

        debug!(plan_id = %plan.id, stage = %Stage::Budget, "estimating budget");
        plan.components.budget_estimate = Some(estimate_budget(
            &self.rates,
            request.days(),
            request.travel_style,
        ));

        self.store.commit(plan.clone());
        info!(
            plan_id = %plan.id,
            stage = %Stage::Finalized,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "travel plan created"
        );
        Ok(plan)
    }

    // Dropping the pipeline future on cancellation drops every pending
    // provider call with it; nothing reaches the store.
    pub async fn create_plan_with_cancel(
        &self,
        request: PlanRequest,
        token: CancellationToken,
    ) -> Result<Plan, PlannerError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("travel plan creation cancelled");
                Err(PlannerError::Cancelled)
            }
            result = self.create_plan(request) => result,
        }
    }

    async fn prepare_translations(&self) -> Translations {
        let lang = Some(self.phrase_target_lang.as_str());
        let results = join_all(
            self.phrases
                .iter()
                .map(|phrase| self.gateway.translate(phrase, lang)),
        )
        .await;

        self.phrases.iter().cloned().zip(results).collect()
    }

    /// Re-ranks and re-prices a stored plan in place.
    ///
    /// `prioritize_high_rated` stable-sorts attractions by rating, highest
    /// first; `save_money` re-prices with the budget multiplier. The itinerary
    /// is always rebuilt from the current attractions and restaurants.
    pub fn optimize_plan(
        &self,
        plan_id: &str,
        preferences: &OptimizePreferences,
    ) -> Result<Plan, PlannerError> {
        let rates = self.rates;
        let plan = self.store.update(plan_id, |plan| {
            let components = &mut plan.components;

            if preferences.prioritize_high_rated {
                if let Some(attractions) = components.attractions.as_mut().and_then(|a| a.ready_mut()) {
                    attractions.sort_by(|a, b| b.rating.total_cmp(&a.rating));
                }
            }

            if preferences.save_money {
                let days = calculate_days(plan.start_date, plan.end_date);
                components.budget_estimate =
                    Some(estimate_budget(&rates, days, TravelStyle::Budget));
            }

            components.itinerary = Some(generate_itinerary(
                plan.start_date,
                plan.end_date,
                components.attractions.as_ref(),
                components.restaurants.as_ref(),
            ));
        })?;

        info!(
            plan_id,
            prioritize_high_rated = preferences.prioritize_high_rated,
            save_money = preferences.save_money,
            "travel plan optimized"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GatewayConfig,
        models::{Place, StageResult},
        providers::{CatalogUpstream, ProviderKind},
    };
    use chrono::NaiveDate;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn request(start: &str, end: &str) -> PlanRequest {
        PlanRequest::new(
            "Beijing",
            "Shanghai",
            NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap(),
            NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
        )
        .unwrap()
    }

    fn planner(upstream: Arc<CatalogUpstream>) -> TravelPlanner {
        TravelPlanner::new(&PlannerConfig::default(), upstream).unwrap()
    }

    fn ratings(plan: &Plan) -> Vec<f64> {
        plan.components
            .attractions
            .as_ref()
            .and_then(StageResult::ready)
            .map(|a| a.iter().map(|p| p.rating).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_full_plan_has_every_component() {
        let upstream = Arc::new(CatalogUpstream::new());
        let planner = planner(Arc::clone(&upstream));

        let plan = assert_ok!(planner.create_plan(request("2025-10-01", "2025-10-07")).await);
        let c = &plan.components;

        assert!(c.weather.as_ref().and_then(StageResult::ready).is_some());
        assert_eq!(c.flights.as_ref().and_then(StageResult::ready).map(Vec::len), Some(3));
        assert_eq!(c.hotels.as_ref().and_then(StageResult::ready).map(Vec::len), Some(3));
        assert_eq!(c.itinerary.as_ref().map(Vec::len), Some(7));
        assert_eq!(
            c.itinerary.as_ref().unwrap().iter().map(|d| d.day).collect::<Vec<_>>(),
            (1..=7u32).collect::<Vec<_>>()
        );

        let translations = c.translations.as_ref().unwrap();
        assert_eq!(translations.len(), 5);
        assert_eq!(
            translations.get("谢谢").and_then(StageResult::ready).map(String::as_str),
            Some("Thank you")
        );

        let budget = c.budget_estimate.unwrap();
        assert_eq!(budget.total(), 9650);

        assert_eq!(planner.store().current().map(|p| p.id), Some(plan.id.clone()));
        // 1 weather + 1 flights + 3 place types + 5 phrases
        assert_eq!(upstream.total_requests(), 10);
    }

    #[tokio::test]
    async fn test_weather_outage_only_affects_weather() {
        let upstream = Arc::new(CatalogUpstream::new());
        upstream.fail_provider(ProviderKind::Weather);
        let planner = planner(Arc::clone(&upstream));

        let plan = planner.create_plan(request("2025-10-01", "2025-10-03")).await.unwrap();
        let c = &plan.components;

        let weather = c.weather.as_ref().unwrap();
        assert_eq!(
            weather.failure().map(|r| r.error.as_str()),
            Some("Unable to fetch weather information")
        );
        assert!(c.flights.as_ref().and_then(StageResult::ready).is_some());
        assert!(c.hotels.as_ref().and_then(StageResult::ready).is_some());
        assert!(c.attractions.as_ref().and_then(StageResult::ready).is_some());
        assert!(c.restaurants.as_ref().and_then(StageResult::ready).is_some());
        assert_eq!(c.itinerary.as_ref().map(Vec::len), Some(3));
        assert!(c.translations.as_ref().unwrap().values().all(|t| !t.is_failed()));
        assert!(c.budget_estimate.is_some());
    }

    #[tokio::test]
    async fn test_failed_places_degrade_itinerary() {
        let upstream = Arc::new(CatalogUpstream::new());
        upstream.fail_provider(ProviderKind::Places);
        let planner = planner(Arc::clone(&upstream));

        let plan = planner.create_plan(request("2025-10-01", "2025-10-02")).await.unwrap();
        let itinerary = plan.components.itinerary.unwrap();

        assert_eq!(itinerary.len(), 2);
        assert!(itinerary.iter().all(|d| d.activities.len() == 1));
        assert!(plan.components.attractions.unwrap().is_failed());
    }

    #[tokio::test]
    async fn test_second_plan_is_served_from_cache() {
        let upstream = Arc::new(CatalogUpstream::new());
        let planner = planner(Arc::clone(&upstream));

        let first = planner.create_plan(request("2025-10-01", "2025-10-03")).await.unwrap();
        let second = planner.create_plan(request("2025-10-01", "2025-10-03")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(upstream.total_requests(), 10);
        assert_eq!(first.components.flights, second.components.flights);
    }

    #[tokio::test]
    async fn test_optimize_sorts_by_rating_and_is_idempotent() {
        let upstream = Arc::new(CatalogUpstream::new());
        upstream.set_places(
            PlaceType::TouristAttraction,
            vec![
                Place::new("Temple of Heaven", 4.6),
                Place::new("Great Wall", 4.9),
                Place::new("Lama Temple", 4.6),
                Place::new("798 Art District", 4.8),
            ],
        );
        let planner = planner(upstream);
        let plan = planner.create_plan(request("2025-10-01", "2025-10-03")).await.unwrap();

        let prefs = OptimizePreferences {
            prioritize_high_rated: true,
            save_money: false,
        };
        let once = planner.optimize_plan(&plan.id, &prefs).unwrap();
        assert_eq!(ratings(&once), vec![4.9, 4.8, 4.6, 4.6]);

        // Equal ratings keep their original relative order
        let names: Vec<String> = once
            .components
            .attractions
            .as_ref()
            .and_then(StageResult::ready)
            .unwrap()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names[2], "Temple of Heaven");
        assert_eq!(names[3], "Lama Temple");

        let twice = planner.optimize_plan(&plan.id, &prefs).unwrap();
        assert_eq!(once.components.attractions, twice.components.attractions);

        let first_day = &twice.components.itinerary.as_ref().unwrap()[0];
        assert_eq!(first_day.activities[0].name, "Great Wall");
        // Budget untouched without save_money
        assert_eq!(twice.components.budget_estimate, plan.components.budget_estimate);
        assert_eq!(planner.store().get(&plan.id), Some(twice));
    }

    #[tokio::test]
    async fn test_optimize_save_money_reprices() {
        let planner = planner(Arc::new(CatalogUpstream::new()));
        let lux = request("2025-10-01", "2025-10-07").with_style(TravelStyle::Luxury);
        let plan = planner.create_plan(lux).await.unwrap();
        let before = plan.components.budget_estimate.unwrap();

        let optimized = planner
            .optimize_plan(
                &plan.id,
                &OptimizePreferences {
                    prioritize_high_rated: false,
                    save_money: true,
                },
            )
            .unwrap();
        let after = optimized.components.budget_estimate.unwrap();

        assert!(after.total() < before.total());
        assert_eq!(after, estimate_budget(&BudgetRates::default(), 7, TravelStyle::Budget));
        // The plan keeps its declared style
        assert_eq!(optimized.travel_style, TravelStyle::Luxury);
    }

    #[tokio::test]
    async fn test_optimize_unknown_plan() {
        let planner = planner(Arc::new(CatalogUpstream::new()));
        let plan = planner.create_plan(request("2025-10-01", "2025-10-03")).await.unwrap();

        let result = planner.optimize_plan("plan_missing", &OptimizePreferences::default());
        assert_err!(&result);
        assert!(matches!(result, Err(PlannerError::PlanNotFound { .. })));
        assert_eq!(planner.store().get(&plan.id), Some(plan));
    }

    #[tokio::test]
    async fn test_cancellation_commits_nothing() {
        let upstream = Arc::new(CatalogUpstream::new());
        upstream.set_delay(Duration::from_millis(500));
        let planner = planner(Arc::clone(&upstream));

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let result = planner
            .create_plan_with_cancel(request("2025-10-01", "2025-10-03"), token)
            .await;

        assert!(matches!(result, Err(PlannerError::Cancelled)));
        assert!(planner.store().is_empty());
        assert_eq!(planner.gateway().cache_stats().items_count, 0);
    }

    #[tokio::test]
    async fn test_fan_out_runs_concurrently() {
        let upstream = Arc::new(CatalogUpstream::new());
        upstream.set_delay(Duration::from_millis(100));
        let config = PlannerConfig {
            gateway: GatewayConfig {
                timeout_ms: 5_000,
                max_concurrent_requests: 8,
            },
            ..PlannerConfig::default()
        };
        let planner = TravelPlanner::new(&config, upstream).unwrap();

        let started = Instant::now();
        planner.create_plan(request("2025-10-01", "2025-10-02")).await.unwrap();

        // Fan-out then translations: two rounds of provider latency, not ten
        assert!(started.elapsed() < Duration::from_millis(600));
    }
}
