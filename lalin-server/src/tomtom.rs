/**
 * TOMTOM PROVIDER - Géocodage + flux trafic via l'API TomTom
 *
 * RÔLE : Implémentation production de `DataProvider`.
 * - resolve_location : search/2/geocode (premier résultat, pays = country_set)
 * - fetch_reading    : traffic flowSegmentData + reverseGeocode pour le nom de rue
 *
 * Chaque requête est bornée par le timeout du client HTTP.
 */

use crate::config::ProviderConf;
use crate::models::{Coordinates, TrafficReading};
use crate::provider::{DataProvider, ProviderError};
use async_trait::async_trait;
use chrono::Local;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

const UNKNOWN_ROAD: &str = "Unknown Road";

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    position: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct FlowResponse {
    #[serde(rename = "flowSegmentData", default)]
    flow: FlowSegment,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowSegment {
    #[serde(default)]
    current_speed: f64,
    #[serde(default = "default_free_flow")]
    free_flow_speed: f64,
    #[serde(default)]
    confidence: f64,
}

impl Default for FlowSegment {
    fn default() -> Self {
        Self {
            current_speed: 0.0,
            free_flow_speed: default_free_flow(),
            confidence: 0.0,
        }
    }
}

fn default_free_flow() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct ReverseGeocodeResponse {
    #[serde(default)]
    addresses: Vec<ReverseAddress>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    #[serde(default)]
    address: AddressFields,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressFields {
    street_name: Option<String>,
}

/// Pourcentage de congestion : clamp(1 - courant/libre, 0, 1) * 100, arrondi à 0.1.
pub fn congestion_percent(current_speed: f64, free_flow_speed: f64) -> f64 {
    if free_flow_speed <= 0.0 {
        return 0.0;
    }
    let ratio = (1.0 - current_speed / free_flow_speed).clamp(0.0, 1.0);
    (ratio * 1000.0).round() / 10.0
}

pub struct TomTomProvider {
    client: Client,
    base_url: Url,
    api_key: String,
    country_set: String,
}

impl TomTomProvider {
    pub fn new(conf: &ProviderConf) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(conf.timeout())
            .user_agent(concat!("lalin-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = Url::parse(&conf.base_url)
            .map_err(|e| ProviderError::Upstream(format!("invalid base url: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: conf.api_key.clone().unwrap_or_default(),
            country_set: conf.country_set.clone(),
        })
    }

    /// Construit `{base}/seg1/seg2/...` ; chaque segment est encodé.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Upstream("base url cannot hold a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        debug!(path = url.path(), "tomtom request");
        let response = self
            .client
            .get(url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status.as_u16()));
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DataProvider for TomTomProvider {
    async fn resolve_location(&self, text: &str) -> Result<Coordinates, ProviderError> {
        let url = self.endpoint(&["search", "2", "geocode", &format!("{text}.json")])?;
        let response: GeocodeResponse = self
            .get_json(url, &[("countrySet", self.country_set.as_str())])
            .await?;

        first_position(response, text)
    }

    async fn fetch_reading(&self, coords: Coordinates) -> Result<TrafficReading, ProviderError> {
        let point = format!("{},{}", coords.latitude, coords.longitude);

        let flow_url = self.endpoint(&[
            "traffic", "services", "4", "flowSegmentData", "absolute", "10", "json",
        ])?;
        let flow: FlowResponse = self.get_json(flow_url, &[("point", point.as_str())]).await?;

        let road_url = self.endpoint(&["search", "2", "reverseGeocode", &format!("{point}.json")])?;
        let road: ReverseGeocodeResponse = self.get_json(road_url, &[]).await?;

        Ok(build_reading(flow.flow, road))
    }
}

/// Premier résultat du géocodage ; une position hors bornes compte comme introuvable.
fn first_position(response: GeocodeResponse, text: &str) -> Result<Coordinates, ProviderError> {
    response
        .results
        .into_iter()
        .next()
        .map(|r| Coordinates::new(r.position.lat, r.position.lon))
        .filter(Coordinates::is_valid)
        .ok_or_else(|| ProviderError::NotFound(text.to_string()))
}

fn build_reading(flow: FlowSegment, road: ReverseGeocodeResponse) -> TrafficReading {
    let place_name = road
        .addresses
        .into_iter()
        .next()
        .and_then(|a| a.address.street_name)
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_ROAD.to_string());

    TrafficReading {
        timestamp: Local::now(),
        place_name,
        current_speed: flow.current_speed.max(0.0).round() as u32,
        free_flow_speed: flow.free_flow_speed.max(0.0).round() as u32,
        congestion_percent: congestion_percent(flow.current_speed, flow.free_flow_speed),
        confidence: flow.confidence,
    }
}
