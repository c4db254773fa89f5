// HTTP upstream. Each provider's native response schema is parsed here and
// translated into the normalized records before it reaches the gateway.

use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::Upstream;
use crate::{
    config::ProviderEndpoints,
    error::{ConfigError, ProviderError},
    models::{Flight, Place, PlaceType, WeatherSnapshot, DATE_FORMAT},
};

const MAX_ERROR_BODY: usize = 200;

pub struct HttpUpstream {
    client: Client,
    endpoints: ProviderEndpoints,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(endpoints: ProviderEndpoints, timeout: Duration) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Init(format!("http client: {e}")))?;

        Ok(Self {
            client,
            endpoints,
            timeout,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout.as_millis() as u64)
        } else {
            err.into()
        }
    }

    async fn fetch_body(&self, request: RequestBuilder) -> Result<String, ProviderError> {
        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(ProviderError::ApiResponse {
                status_code: status.as_u16(),
                message: error_message(body),
            });
        }

        Ok(body)
    }
}

// Error bodies are cut to MAX_ERROR_BODY bytes on a char boundary
fn error_message(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn weather(&self, city: &str) -> Result<WeatherSnapshot, ProviderError> {
        let endpoint = &self.endpoints.weather;
        let request = self
            .client
            .get(format!("{}/weather", endpoint.base_url))
            .query(&[
                ("q", city),
                ("appid", endpoint.api_key.as_str()),
                ("units", "metric"),
                ("lang", self.endpoints.weather_lang.as_str()),
            ]);

        debug!(city, "requesting weather");
        parse_weather(&self.fetch_body(request).await?)
    }

    async fn places(&self, location: &str, kind: PlaceType) -> Result<Vec<Place>, ProviderError> {
        let endpoint = &self.endpoints.places;
        let query = format!("{} in {}", kind.as_str().replace('_', " "), location);
        let request = self
            .client
            .get(format!("{}/textsearch/json", endpoint.base_url))
            .query(&[
                ("query", query.as_str()),
                ("type", kind.as_str()),
                ("key", endpoint.api_key.as_str()),
            ]);

        debug!(location, kind = %kind, "searching places");
        parse_places(&self.fetch_body(request).await?, kind)
    }

    async fn flights(
        &self,
        origin: &str,
        destination: &str,
        date: NaiveDate,
    ) -> Result<Vec<Flight>, ProviderError> {
        let endpoint = &self.endpoints.flight;
        let departure_date = date.format(DATE_FORMAT).to_string();
        let request = self
            .client
            .get(format!("{}/shopping/flight-offers", endpoint.base_url))
            .bearer_auth(&endpoint.api_key)
            .query(&[
                ("originLocationCode", origin),
                ("destinationLocationCode", destination),
                ("departureDate", departure_date.as_str()),
                ("adults", "1"),
            ]);

        debug!(origin, destination, date = %departure_date, "searching flights");
        parse_flights(&self.fetch_body(request).await?)
    }

    async fn translate(&self, text: &str, target_lang: &str) -> Result<String, ProviderError> {
        let endpoint = &self.endpoints.translation;
        let request = self
            .client
            .post(format!("{}/translate", endpoint.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("DeepL-Auth-Key {}", endpoint.api_key),
            )
            .json(&json!({ "text": [text], "target_lang": target_lang }));

        parse_translation(&self.fetch_body(request).await?)
    }
}

// Native schemas, trimmed to the fields we use

#[derive(Deserialize)]
struct OwmResponse {
    main: OwmMain,
    weather: Vec<OwmCondition>,
    wind: OwmWind,
    name: String,
    sys: OwmSys,
}

#[derive(Deserialize)]
struct OwmMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
}

#[derive(Deserialize)]
struct OwmCondition {
    description: String,
}

#[derive(Deserialize)]
struct OwmWind {
    speed: f64,
}

#[derive(Deserialize)]
struct OwmSys {
    #[serde(default)]
    country: String,
}

#[derive(Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlacesResult>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct PlacesResult {
    name: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    price_level: Option<u8>,
    #[serde(default)]
    types: Vec<String>,
}

#[derive(Deserialize)]
struct FlightOffers {
    #[serde(default)]
    data: Vec<FlightOffer>,
    #[serde(default)]
    dictionaries: Option<FlightDictionaries>,
}

#[derive(Deserialize)]
struct FlightDictionaries {
    #[serde(default)]
    carriers: HashMap<String, String>,
}

#[derive(Deserialize)]
struct FlightOffer {
    price: OfferPrice,
    itineraries: Vec<OfferItinerary>,
}

#[derive(Deserialize)]
struct OfferPrice {
    total: String,
}

#[derive(Deserialize)]
struct OfferItinerary {
    duration: String,
    segments: Vec<OfferSegment>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferSegment {
    carrier_code: String,
    number: String,
    departure: SegmentPoint,
    arrival: SegmentPoint,
}

#[derive(Deserialize)]
struct SegmentPoint {
    at: String,
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<TranslatedText>,
}

#[derive(Deserialize)]
struct TranslatedText {
    text: String,
}

pub(crate) fn parse_weather(body: &str) -> Result<WeatherSnapshot, ProviderError> {
    let native: OwmResponse = serde_json::from_str(body)?;
    let description = native
        .weather
        .into_iter()
        .next()
        .map(|c| c.description)
        .ok_or_else(|| ProviderError::Malformed("weather conditions missing".to_string()))?;

    Ok(WeatherSnapshot {
        temperature: native.main.temp,
        feels_like: native.main.feels_like,
        humidity: native.main.humidity,
        description,
        wind_speed: native.wind.speed,
        city: native.name,
        country: native.sys.country,
    })
}

pub(crate) fn parse_places(body: &str, kind: PlaceType) -> Result<Vec<Place>, ProviderError> {
    let native: PlacesResponse = serde_json::from_str(body)?;

    match native.status.as_str() {
        "OK" | "ZERO_RESULTS" => {}
        other => {
            return Err(ProviderError::Unavailable(format!(
                "places search returned {other}: {}",
                native.error_message.unwrap_or_default()
            )))
        }
    }

    Ok(native
        .results
        .into_iter()
        .map(|result| Place {
            category: result
                .types
                .into_iter()
                .find(|t| t != kind.as_str() && t != "point_of_interest" && t != "establishment"),
            rating: result.rating.unwrap_or_default(),
            price_level: result.price_level,
            ..Place::new(result.name, 0.0)
        })
        .collect())
}

pub(crate) fn parse_flights(body: &str) -> Result<Vec<Flight>, ProviderError> {
    let native: FlightOffers = serde_json::from_str(body)?;
    let carriers = native
        .dictionaries
        .map(|d| d.carriers)
        .unwrap_or_default();

    native
        .data
        .into_iter()
        .map(|offer| {
            let itinerary = offer
                .itineraries
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::Malformed("offer without itinerary".to_string()))?;
            let (first, last) = match (itinerary.segments.first(), itinerary.segments.last()) {
                (Some(first), Some(last)) => (first, last),
                _ => {
                    return Err(ProviderError::Malformed(
                        "itinerary without segments".to_string(),
                    ))
                }
            };
            let price = offer
                .price
                .total
                .parse::<f64>()
                .map_err(|e| ProviderError::Malformed(format!("price {:?}: {e}", offer.price.total)))?;

            Ok(Flight {
                airline: carriers
                    .get(&first.carrier_code)
                    .cloned()
                    .unwrap_or_else(|| first.carrier_code.clone()),
                flight_number: format!("{}{}", first.carrier_code, first.number),
                departure: clock_time(&first.departure.at)?,
                arrival: clock_time(&last.arrival.at)?,
                price,
                duration: readable_duration(&itinerary.duration)?,
            })
        })
        .collect()
}

pub(crate) fn parse_translation(body: &str) -> Result<String, ProviderError> {
    let native: TranslateResponse = serde_json::from_str(body)?;
    native
        .translations
        .into_iter()
        .next()
        .map(|t| t.text)
        .ok_or_else(|| ProviderError::Malformed("empty translation list".to_string()))
}

// "2025-10-01T08:05:00" -> "08:05"
fn clock_time(timestamp: &str) -> Result<String, ProviderError> {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|e| ProviderError::Malformed(format!("timestamp {timestamp:?}: {e}")))
}

// ISO-8601 duration "PT2H30M" -> "2h 30m"
fn readable_duration(iso: &str) -> Result<String, ProviderError> {
    let malformed = || ProviderError::Malformed(format!("duration {iso:?}"));
    let rest = iso.strip_prefix("PT").ok_or_else(malformed)?;

    let (mut hours, mut minutes) = (0u32, 0u32);
    let mut digits = String::new();
    for ch in rest.chars() {
        match ch {
            '0'..='9' => digits.push(ch),
            'H' => hours = digits.parse().map_err(|_| malformed())?,
            'M' => minutes = digits.parse().map_err(|_| malformed())?,
            _ => return Err(malformed()),
        }
        if !ch.is_ascii_digit() {
            digits.clear();
        }
    }
    if !digits.is_empty() {
        return Err(malformed());
    }

    Ok(format!("{hours}h {minutes}m"))
}
