//! Result and record types shared across the engine.

use csv::StringRecord;
use serde::{Deserialize, Serialize};

/// Columns appended to every output row, in order.
pub const GEOCODE_COLUMNS: [&str; 4] =
    ["latitude", "longitude", "geocode_status", "geocode_address"];

/// Outcome classification for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeocodeStatus {
    /// Provider returned a best-match coordinate pair.
    Success,
    /// Provider had no match, or the lookup failed after retries.
    Failed,
    /// The row had no usable address data; no lookup was attempted.
    NoAddress,
}

impl GeocodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeocodeStatus::Success => "success",
            GeocodeStatus::Failed => "failed",
            GeocodeStatus::NoAddress => "no_address",
        }
    }

    /// Parse the output-column representation; unknown values are `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(GeocodeStatus::Success),
            "failed" => Some(GeocodeStatus::Failed),
            "no_address" => Some(GeocodeStatus::NoAddress),
            _ => None,
        }
    }
}

impl std::fmt::Display for GeocodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of one geocoding lookup.
///
/// Coordinates are present exactly when `status` is `Success`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub formatted_address: Option<String>,
    pub status: GeocodeStatus,
}

impl GeocodeResult {
    pub fn success(latitude: f64, longitude: f64, formatted_address: String) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            formatted_address: Some(formatted_address),
            status: GeocodeStatus::Success,
        }
    }

    pub fn failed() -> Self {
        Self {
            latitude: None,
            longitude: None,
            formatted_address: None,
            status: GeocodeStatus::Failed,
        }
    }

    pub fn no_address() -> Self {
        Self {
            latitude: None,
            longitude: None,
            formatted_address: None,
            status: GeocodeStatus::NoAddress,
        }
    }
}

/// Build an output row: the input fields followed by the four geocode
/// columns. Original columns are never mutated or reordered.
pub fn output_record(input: &StringRecord, result: &GeocodeResult) -> StringRecord {
    let mut out = input.clone();
    out.push_field(&result.latitude.map(|v| v.to_string()).unwrap_or_default());
    out.push_field(&result.longitude.map(|v| v.to_string()).unwrap_or_default());
    out.push_field(result.status.as_str());
    out.push_field(result.formatted_address.as_deref().unwrap_or_default());
    out
}

/// Build the output header: the input header plus the geocode columns.
pub fn output_header(input: &StringRecord) -> StringRecord {
    let mut out = input.clone();
    for col in GEOCODE_COLUMNS {
        out.push_field(col);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_record_appends_four_columns() {
        let input = StringRecord::from(vec!["1", "Acme Corp"]);
        let result = GeocodeResult::success(37.42, -122.08, "Mountain View, CA".into());
        let out = output_record(&input, &result);

        assert_eq!(out.len(), input.len() + 4);
        assert_eq!(&out[0], "1");
        assert_eq!(&out[2], "37.42");
        assert_eq!(&out[3], "-122.08");
        assert_eq!(&out[4], "success");
        assert_eq!(&out[5], "Mountain View, CA");
    }

    #[test]
    fn test_output_record_failed_has_empty_coordinates() {
        let input = StringRecord::from(vec!["1"]);
        let out = output_record(&input, &GeocodeResult::failed());

        assert_eq!(out.len(), 5);
        assert_eq!(&out[1], "");
        assert_eq!(&out[2], "");
        assert_eq!(&out[3], "failed");
        assert_eq!(&out[4], "");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            GeocodeStatus::Success,
            GeocodeStatus::Failed,
            GeocodeStatus::NoAddress,
        ] {
            assert_eq!(GeocodeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(GeocodeStatus::parse("bogus"), None);
    }
}
