//! Run configuration: provider selection, column mapping, chunking.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Supported geocoding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenStreetMap Nominatim. Free, no key, hard 1 req/s ceiling.
    Nominatim,
    /// Google Maps Geocoding API. Requires an API key.
    Google,
    /// Mapbox Geocoding API. Requires an access token.
    Mapbox,
}

impl ProviderKind {
    pub fn id(&self) -> &'static str {
        match self {
            ProviderKind::Nominatim => "nominatim",
            ProviderKind::Google => "google",
            ProviderKind::Mapbox => "mapbox",
        }
    }

    /// Whether this provider refuses requests without a key/token.
    pub fn requires_key(&self) -> bool {
        !matches!(self, ProviderKind::Nominatim)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nominatim" => Ok(ProviderKind::Nominatim),
            "google" => Ok(ProviderKind::Google),
            "mapbox" => Ok(ProviderKind::Mapbox),
            other => Err(EngineError::UnknownProvider(other.to_string())),
        }
    }
}

/// Which input column(s) supply the address for each row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMapping {
    /// One column already holding the full address.
    Single { address: String },
    /// Separate component columns, joined as "street, city, state zip".
    Components {
        street: Option<String>,
        city: Option<String>,
        state: Option<String>,
        zip: Option<String>,
    },
}

impl ColumnMapping {
    fn names_at_least_one_column(&self) -> bool {
        match self {
            ColumnMapping::Single { .. } => true,
            ColumnMapping::Components {
                street,
                city,
                state,
                zip,
            } => street.is_some() || city.is_some() || state.is_some() || zip.is_some(),
        }
    }
}

/// Everything a single batch run needs, supplied once at run start.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub provider: ProviderKind,
    pub api_key: Option<String>,
    /// Override the provider's default endpoint (e.g. a self-hosted
    /// Nominatim instance).
    pub endpoint: Option<String>,
    pub columns: ColumnMapping,
    pub resume: bool,
    pub chunk_size: usize,
}

impl RunConfig {
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;

    /// Fail-fast validation, run before any row is read.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.provider.requires_key() && self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(EngineError::MissingApiKey(self.provider));
        }
        if !self.columns.names_at_least_one_column() {
            return Err(EngineError::NoColumnsConfigured);
        }
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidChunkSize);
        }
        std::fs::File::open(&self.input).map_err(|source| EngineError::InputUnreadable {
            path: self.input.clone(),
            source,
        })?;
        Ok(())
    }
}
