//! Google Maps Geocoding API provider. Key required, per-request cost.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{classify_send_error, parse_endpoint, read_json, FetchError};
use crate::error::EngineError;
use crate::models::GeocodeResult;

const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[derive(Debug)]
pub struct Google {
    endpoint: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleItem>,
}

#[derive(Debug, Deserialize)]
struct GoogleItem {
    formatted_address: String,
    geometry: GoogleGeometry,
}

#[derive(Debug, Deserialize)]
struct GoogleGeometry {
    location: GoogleLocation,
}

#[derive(Debug, Deserialize)]
struct GoogleLocation {
    lat: f64,
    lng: f64,
}

impl Google {
    pub(crate) fn new(endpoint: Option<String>, api_key: String) -> Result<Self, EngineError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint, DEFAULT_ENDPOINT)?,
            api_key,
        })
    }

    pub(crate) async fn lookup(
        &self,
        client: &Client,
        query: &str,
    ) -> Result<GeocodeResult, FetchError> {
        let response = client
            .get(self.endpoint.clone())
            .query(&[("address", query), ("key", &self.api_key)])
            .send()
            .await
            .map_err(classify_send_error)?;

        let body: GoogleResponse = read_json(response).await?;
        normalize(body)
    }
}

/// Google reports request-level conditions through the body's `status`
/// field, not the HTTP status.
fn normalize(body: GoogleResponse) -> Result<GeocodeResult, FetchError> {
    match body.status.as_str() {
        "OK" => {
            let Some(item) = body.results.into_iter().next() else {
                return Ok(GeocodeResult::failed());
            };
            Ok(GeocodeResult::success(
                item.geometry.location.lat,
                item.geometry.location.lng,
                item.formatted_address,
            ))
        }
        "ZERO_RESULTS" => Ok(GeocodeResult::failed()),
        "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => Err(FetchError::Transient(format!(
            "Google API status {}",
            body.status
        ))),
        other => Err(FetchError::Permanent(format!("Google API status {}", other))),
    }
}
