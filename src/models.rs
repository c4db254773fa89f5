// Plan data model and the normalized provider records that feed it

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};

use crate::error::{ErrorRecord, PlannerError};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

// Longest trip a single plan may cover, in days
pub const MAX_TRIP_DAYS: u32 = 365;

// Outcome of one pipeline stage: the value, or the structured failure that
// replaced it. Serialized untagged so a failed component is just the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StageResult<T> {
    Ready(T),
    Failed(ErrorRecord),
}

impl<T> StageResult<T> {
    pub fn ready(&self) -> Option<&T> {
        match self {
            StageResult::Ready(value) => Some(value),
            StageResult::Failed(_) => None,
        }
    }

    pub fn ready_mut(&mut self) -> Option<&mut T> {
        match self {
            StageResult::Ready(value) => Some(value),
            StageResult::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ErrorRecord> {
        match self {
            StageResult::Ready(_) => None,
            StageResult::Failed(record) => Some(record),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageResult::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub temperature: f64,
    pub feels_like: f64,
    pub humidity: f64,
    pub description: String,
    pub wind_speed: f64,
    pub city: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
    #[serde(default)]
    pub rating: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_level: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stars: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
}

impl Place {
    pub fn new(name: impl Into<String>, rating: f64) -> Self {
        Self {
            name: name.into(),
            rating,
            category: None,
            price_level: None,
            stars: None,
            price_range: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub airline: String,
    pub flight_number: String,
    pub departure: String,
    pub arrival: String,
    pub price: f64,
    pub duration: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceType {
    TouristAttraction,
    Restaurant,
    Hotel,
}

impl PlaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceType::TouristAttraction => "tourist_attraction",
            PlaceType::Restaurant => "restaurant",
            PlaceType::Hotel => "hotel",
        }
    }
}

impl fmt::Display for PlaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TravelStyle {
    Budget,
    #[default]
    Balanced,
    Luxury,
}

impl TravelStyle {
    pub fn multiplier(&self) -> f64 {
        match self {
            TravelStyle::Budget => 0.7,
            TravelStyle::Balanced => 1.0,
            TravelStyle::Luxury => 1.5,
        }
    }

    // Unrecognized styles price like `balanced`
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "budget" => TravelStyle::Budget,
            "luxury" => TravelStyle::Luxury,
            "balanced" => TravelStyle::Balanced,
            other => {
                tracing::warn!(style = other, "unknown travel style, using balanced");
                TravelStyle::Balanced
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub time: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day: u32,
    pub date: NaiveDate,
    pub activities: Vec<Activity>,
}

// Category amounts in whole currency units. The total is derived from the
// parts every time it is read and is never stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct BudgetBreakdown {
    pub flights: u64,
    pub accommodation: u64,
    pub meals: u64,
    pub attractions: u64,
    pub transportation: u64,
    pub shopping: u64,
    pub emergency: u64,
}

impl BudgetBreakdown {
    pub fn total(&self) -> u64 {
        self.flights
            + self.accommodation
            + self.meals
            + self.attractions
            + self.transportation
            + self.shopping
            + self.emergency
    }
}

impl Serialize for BudgetBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("BudgetBreakdown", 8)?;
        state.serialize_field("flights", &self.flights)?;
        state.serialize_field("accommodation", &self.accommodation)?;
        state.serialize_field("meals", &self.meals)?;
        state.serialize_field("attractions", &self.attractions)?;
        state.serialize_field("transportation", &self.transportation)?;
        state.serialize_field("shopping", &self.shopping)?;
        state.serialize_field("emergency", &self.emergency)?;
        state.serialize_field("total", &self.total())?;
        state.end()
    }
}

pub type Translations = BTreeMap<String, StageResult<String>>;

// Only stages that have finished appear here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanComponents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<StageResult<WeatherSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flights: Option<StageResult<Vec<Flight>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotels: Option<StageResult<Vec<Place>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attractions: Option<StageResult<Vec<Place>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restaurants: Option<StageResult<Vec<Place>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub itinerary: Option<Vec<ItineraryDay>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translations: Option<Translations>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_estimate: Option<BudgetBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub destination: String,
    pub origin: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    pub interests: BTreeSet<String>,
    pub travel_style: TravelStyle,
    pub components: PlanComponents,
}

impl Plan {
    pub fn new(id: String, request: &PlanRequest) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            destination: request.destination.clone(),
            origin: request.origin.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            budget: request.budget,
            interests: request.interests.clone(),
            travel_style: request.travel_style,
            components: PlanComponents::default(),
        }
    }
}

// Raw arguments of `create_travel_plan` as they arrive from a caller
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanArgs {
    pub destination: Option<String>,
    pub origin: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub budget: Option<f64>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub travel_style: Option<String>,
}

/// A validated planning request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    pub destination: String,
    pub origin: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub budget: Option<f64>,
    pub interests: BTreeSet<String>,
    pub travel_style: TravelStyle,
}

impl PlanRequest {
    pub fn new(
        destination: impl Into<String>,
        origin: impl Into<String>,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Self, PlannerError> {
        Self::try_from(CreatePlanArgs {
            destination: Some(destination.into()),
            origin: Some(origin.into()),
            start_date: Some(start_date.format(DATE_FORMAT).to_string()),
            end_date: Some(end_date.format(DATE_FORMAT).to_string()),
            ..Default::default()
        })
    }

    pub fn with_style(mut self, travel_style: TravelStyle) -> Self {
        self.travel_style = travel_style;
        self
    }

    pub fn days(&self) -> u32 {
        calculate_days(self.start_date, self.end_date)
    }
}

fn required(field: &str, value: Option<String>) -> Result<String, PlannerError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PlannerError::validation(field, "is required")),
    }
}

pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, PlannerError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| PlannerError::validation(field, format!("expected YYYY-MM-DD: {e}")))
}

impl TryFrom<CreatePlanArgs> for PlanRequest {
    type Error = PlannerError;

    fn try_from(args: CreatePlanArgs) -> Result<Self, Self::Error> {
        let destination = required("destination", args.destination)?;
        let origin = required("origin", args.origin)?;
        let start_date = parse_date("startDate", &required("startDate", args.start_date)?)?;
        let end_date = parse_date("endDate", &required("endDate", args.end_date)?)?;

        if start_date > end_date {
            return Err(PlannerError::validation(
                "endDate",
                "must not be before startDate",
            ));
        }
        if calculate_days(start_date, end_date) > MAX_TRIP_DAYS {
            return Err(PlannerError::validation(
                "endDate",
                format!("trip may span at most {MAX_TRIP_DAYS} days"),
            ));
        }

        Ok(Self {
            destination,
            origin,
            start_date,
            end_date,
            budget: args.budget,
            interests: args
                .interests
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            travel_style: args
                .travel_style
                .as_deref()
                .map(TravelStyle::parse_lenient)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizePreferences {
    #[serde(default)]
    pub prioritize_high_rated: bool,
    #[serde(default)]
    pub save_money: bool,
}

// Whole days between the two dates, both ends included
pub fn calculate_days(start: NaiveDate, end: NaiveDate) -> u32 {
    let span = (end - start).num_days().max(0) as u32;
    span + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_calculate_days_is_inclusive() {
        assert_eq!(calculate_days(date("2025-10-01"), date("2025-10-07")), 7);
        assert_eq!(calculate_days(date("2025-10-01"), date("2025-10-01")), 1);
        assert_eq!(calculate_days(date("2024-02-28"), date("2024-03-01")), 3);
    }

    #[test]
    fn test_budget_total_is_serialized_from_parts() {
        let budget = BudgetBreakdown {
            flights: 1400,
            accommodation: 350,
            meals: 140,
            attractions: 105,
            transportation: 70,
            shopping: 350,
            emergency: 350,
        };
        let value = serde_json::to_value(budget).unwrap();
        assert_eq!(value["total"], json!(2765));
        assert_eq!(value["total"], json!(budget.total()));
    }

    #[test]
    fn test_request_requires_core_fields() {
        let err = PlanRequest::try_from(CreatePlanArgs {
            origin: Some("Shanghai".into()),
            start_date: Some("2025-10-01".into()),
            end_date: Some("2025-10-07".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, PlannerError::Validation { ref field, .. } if field == "destination"));

        let err = PlanRequest::try_from(CreatePlanArgs {
            destination: Some("  ".into()),
            origin: Some("Shanghai".into()),
            start_date: Some("2025-10-01".into()),
            end_date: Some("2025-10-07".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, PlannerError::Validation { .. }));
    }

    #[test]
    fn test_request_rejects_bad_dates() {
        let base = CreatePlanArgs {
            destination: Some("Beijing".into()),
            origin: Some("Shanghai".into()),
            start_date: Some("2025-10-07".into()),
            end_date: Some("2025-10-01".into()),
            ..Default::default()
        };
        assert!(PlanRequest::try_from(base.clone()).is_err());

        let garbled = CreatePlanArgs {
            start_date: Some("10/01/2025".into()),
            end_date: Some("2025-10-07".into()),
            ..base
        };
        let err = PlanRequest::try_from(garbled).unwrap_err();
        assert!(matches!(err, PlannerError::Validation { ref field, .. } if field == "startDate"));
    }

    #[test]
    fn test_request_rejects_overlong_trip() {
        let args = |end: &str| CreatePlanArgs {
            destination: Some("Beijing".into()),
            origin: Some("Shanghai".into()),
            start_date: Some("2025-01-01".into()),
            end_date: Some(end.into()),
            ..Default::default()
        };

        // 2025 is not a leap year: Jan 1 to Dec 31 is exactly 365 days
        let year = PlanRequest::try_from(args("2025-12-31")).unwrap();
        assert_eq!(year.days(), MAX_TRIP_DAYS);

        let err = PlanRequest::try_from(args("2026-01-01")).unwrap_err();
        assert!(matches!(err, PlannerError::Validation { ref field, .. } if field == "endDate"));

        let err = PlanRequest::try_from(CreatePlanArgs {
            start_date: Some("0001-01-01".into()),
            ..args("9999-12-31")
        })
        .unwrap_err();
        assert!(matches!(err, PlannerError::Validation { .. }));
    }

    #[test]
    fn test_request_from_json_arguments() {
        let args: CreatePlanArgs = serde_json::from_value(json!({
            "destination": "Beijing",
            "origin": "Shanghai",
            "startDate": "2025-10-01",
            "endDate": "2025-10-03",
            "budget": 8000,
            "interests": ["history", "food", "history"],
            "travelStyle": "LUXURY"
        }))
        .unwrap();

        let request = PlanRequest::try_from(args).unwrap();
        assert_eq!(request.days(), 3);
        assert_eq!(request.travel_style, TravelStyle::Luxury);
        assert_eq!(request.interests.len(), 2);
        assert_eq!(request.budget, Some(8000.0));
    }

    #[test]
    fn test_unknown_style_prices_as_balanced() {
        assert_eq!(TravelStyle::parse_lenient("backpacker"), TravelStyle::Balanced);
        assert_eq!(TravelStyle::parse_lenient("backpacker").multiplier(), 1.0);
    }

    #[test]
    fn test_failed_stage_serializes_as_record() {
        let stage: StageResult<Vec<Place>> =
            StageResult::Failed(ErrorRecord::new("Unable to search places", "timeout"));
        assert_eq!(
            serde_json::to_value(&stage).unwrap(),
            json!({ "error": "Unable to search places", "details": "timeout" })
        );

        let ready: StageResult<Vec<Place>> =
            serde_json::from_value(json!([{ "name": "Great Wall", "rating": 4.9 }])).unwrap();
        assert_eq!(ready.ready().map(Vec::len), Some(1));
    }
}
