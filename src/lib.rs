//! Tamarack - bulk CSV geocoding with interchangeable providers
//!
//! This library turns postal addresses in a delimited file into
//! coordinates, one provider-rate-limited row at a time, with chunked
//! checkpoints so an interrupted run resumes where it left off.

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod extract;
pub mod limiter;
pub mod models;
pub mod providers;

pub use batch::{BatchProcessor, RunReport, RunState, RunStats};
pub use config::{ColumnMapping, ProviderKind, RunConfig};
pub use error::EngineError;
pub use models::{GeocodeResult, GeocodeStatus};
pub use providers::Provider;
