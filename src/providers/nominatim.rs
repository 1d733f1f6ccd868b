//! OpenStreetMap Nominatim provider. Free, no key required.

use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{classify_send_error, parse_endpoint, read_json, FetchError};
use crate::error::EngineError;
use crate::models::GeocodeResult;

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug)]
pub struct Nominatim {
    endpoint: Url,
}

/// One entry of Nominatim's search response. Coordinates arrive as strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    display_name: String,
}

impl Nominatim {
    pub(crate) fn new(endpoint: Option<String>) -> Result<Self, EngineError> {
        Ok(Self {
            endpoint: parse_endpoint(endpoint, DEFAULT_ENDPOINT)?,
        })
    }

    pub(crate) async fn lookup(
        &self,
        client: &Client,
        query: &str,
    ) -> Result<GeocodeResult, FetchError> {
        let response = client
            .get(self.endpoint.clone())
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(classify_send_error)?;

        let places: Vec<NominatimPlace> = read_json(response).await?;
        Ok(normalize(places))
    }
}

fn normalize(places: Vec<NominatimPlace>) -> GeocodeResult {
    let Some(place) = places.into_iter().next() else {
        return GeocodeResult::failed();
    };
    match (place.lat.parse::<f64>(), place.lon.parse::<f64>()) {
        (Ok(lat), Ok(lon)) => GeocodeResult::success(lat, lon, place.display_name),
        _ => GeocodeResult::failed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeocodeStatus;

    fn parse(body: &str) -> Vec<NominatimPlace> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_normalize_match() {
        let body = r#"[{
            "lat": "37.4223",
            "lon": "-122.0841",
            "display_name": "Googleplex, Mountain View, California, United States"
        }]"#;
        let result = normalize(parse(body));
        assert_eq!(result.status, GeocodeStatus::Success);
        assert_eq!(result.latitude, Some(37.4223));
        assert_eq!(result.longitude, Some(-122.0841));
        assert!(result
            .formatted_address
            .unwrap()
            .starts_with("Googleplex"));
    }

    #[test]
    fn test_normalize_no_match_is_failed_not_error() {
        let result = normalize(parse("[]"));
        assert_eq!(result.status, GeocodeStatus::Failed);
        assert_eq!(result.latitude, None);
        assert_eq!(result.longitude, None);
    }

    #[test]
    fn test_normalize_unparseable_coordinates() {
        let body = r#"[{"lat": "abc", "lon": "1.0", "display_name": "x"}]"#;
        assert_eq!(normalize(parse(body)).status, GeocodeStatus::Failed);
    }
}
