//! Error taxonomy for the geocoding engine.
//!
//! Only configuration and persistence failures are surfaced as `Err`;
//! per-row conditions (no address, provider miss) are `GeocodeStatus`
//! outcomes and never abort a run.

use std::path::PathBuf;

use crate::config::ProviderKind;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // --- Configuration errors: fatal before any row is processed ---
    #[error("provider '{0}' requires an API key (pass --api-key)")]
    MissingApiKey(ProviderKind),

    #[error("unknown provider '{0}' (expected nominatim, google or mapbox)")]
    UnknownProvider(String),

    #[error("cannot read input file {}: {source}", path.display())]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no address columns configured: pass --address or at least one of --street/--city/--state/--zip")]
    NoColumnsConfigured,

    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("invalid provider endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    // --- Persistence errors: fatal mid-run, committed chunks stay valid ---
    #[error("failed reading input {}: {source}", path.display())]
    InputRead {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed writing output {}: {source}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed committing checkpoint {}: {source}", path.display())]
    CheckpointWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed inspecting existing output {}: {source}", path.display())]
    OutputInspect {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl EngineError {
    /// True for errors raised before the first row is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::MissingApiKey(_)
                | EngineError::UnknownProvider(_)
                | EngineError::InputUnreadable { .. }
                | EngineError::NoColumnsConfigured
                | EngineError::InvalidChunkSize
                | EngineError::InvalidEndpoint { .. }
        )
    }
}
