//! Mapbox Geocoding API provider. Access token required.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{classify_send_error, parse_endpoint, read_json, FetchError};
use crate::error::EngineError;
use crate::models::GeocodeResult;

const DEFAULT_ENDPOINT: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

#[derive(Debug)]
pub struct Mapbox {
    endpoint: Url,
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct MapboxResponse {
    #[serde(default)]
    features: Vec<MapboxFeature>,
}

#[derive(Debug, Deserialize)]
struct MapboxFeature {
    /// `[longitude, latitude]`
    center: [f64; 2],
    place_name: String,
}

impl Mapbox {
    pub(crate) fn new(endpoint: Option<String>, access_token: String) -> Result<Self, EngineError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint, DEFAULT_ENDPOINT)?,
            access_token,
        })
    }

    pub(crate) async fn lookup(
        &self,
        client: &Client,
        query: &str,
    ) -> Result<GeocodeResult, FetchError> {
        // The query is a path segment: {endpoint}/{query}.json
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Permanent("endpoint is not a valid base URL".to_string()))?
            .push(&format!("{}.json", query));

        let response = client
            .get(url)
            .query(&[("access_token", self.access_token.as_str()), ("limit", "1")])
            .send()
            .await
            .map_err(classify_send_error)?;

        let body: MapboxResponse = read_json(response).await?;
        Ok(normalize(body))
    }
}

fn normalize(body: MapboxResponse) -> GeocodeResult {
    let Some(feature) = body.features.into_iter().next() else {
        return GeocodeResult::failed();
    };
    let [lon, lat] = feature.center;
    GeocodeResult::success(lat, lon, feature.place_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeocodeStatus;

    fn parse(body: &str) -> MapboxResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_normalize_match_swaps_center_order() {
        let body = r#"{
            "features": [{
                "center": [-122.0842, 37.4224],
                "place_name": "1600 Amphitheatre Parkway, Mountain View, California 94043"
            }]
        }"#;
        let result = normalize(parse(body));
        assert_eq!(result.status, GeocodeStatus::Success);
        assert_eq!(result.latitude, Some(37.4224));
        assert_eq!(result.longitude, Some(-122.0842));
    }

    #[test]
    fn test_normalize_empty_features_is_failed() {
        let result = normalize(parse(r#"{"features": []}"#));
        assert_eq!(result.status, GeocodeStatus::Failed);
        assert_eq!(result.formatted_address, None);
    }
}
