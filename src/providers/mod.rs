//! Geocoding provider clients.
//!
//! One `Provider` per run: a shared HTTP client, the provider's own rate
//! limiter, and a backend variant per supported service. Adding a provider
//! means adding a variant and its limiter policy; the batch loop never
//! changes.

mod google;
mod mapbox;
mod nominatim;

use std::time::Duration;

use reqwest::Client;
use tokio::time::sleep;
use tracing::warn;
use url::Url;

use crate::config::{ProviderKind, RunConfig};
use crate::error::EngineError;
use crate::limiter::RateLimiter;
use crate::models::GeocodeResult;

use google::Google;
use mapbox::Mapbox;
use nominatim::Nominatim;

// Nominatim's usage policy requires an identifying User-Agent; anonymous
// clients get blocked.
const USER_AGENT: &str = "Tamarack/0.1 (bulk geocoder; https://github.com/example/tamarack)";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// A single provider lookup failure, classified for the retry loop.
#[derive(Debug)]
pub(crate) enum FetchError {
    /// Timeout, connection error, 5xx, 429: worth retrying.
    Transient(String),
    /// Malformed request or provider-reported rejection: not retried.
    Permanent(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Transient(reason) => write!(f, "transient: {}", reason),
            FetchError::Permanent(reason) => write!(f, "permanent: {}", reason),
        }
    }
}

/// A geocoding client bound to one concrete service.
#[derive(Debug)]
pub struct Provider {
    client: Client,
    limiter: RateLimiter,
    backend: Backend,
}

#[derive(Debug)]
enum Backend {
    Nominatim(Nominatim),
    Google(Google),
    Mapbox(Mapbox),
    #[cfg(test)]
    Scripted(scripted::Scripted),
}

impl Provider {
    /// Build the provider named by the run configuration. Fails fast on a
    /// missing key or a malformed endpoint override; no request is sent.
    pub fn from_config(config: &RunConfig) -> Result<Self, EngineError> {
        Self::new(
            config.provider,
            config.api_key.clone(),
            config.endpoint.clone(),
        )
    }

    pub fn new(
        kind: ProviderKind,
        api_key: Option<String>,
        endpoint: Option<String>,
    ) -> Result<Self, EngineError> {
        let api_key = api_key.filter(|k| !k.is_empty());

        let (backend, limiter) = match kind {
            ProviderKind::Nominatim => (
                Backend::Nominatim(Nominatim::new(endpoint)?),
                // Nominatim's hard ceiling: 1 request per second.
                RateLimiter::fixed_interval(Duration::from_secs(1)),
            ),
            ProviderKind::Google => {
                let key = api_key.ok_or(EngineError::MissingApiKey(kind))?;
                (
                    Backend::Google(Google::new(endpoint, key)?),
                    // 50 requests per second.
                    RateLimiter::fixed_interval(Duration::from_millis(20)),
                )
            }
            ProviderKind::Mapbox => {
                let token = api_key.ok_or(EngineError::MissingApiKey(kind))?;
                (
                    Backend::Mapbox(Mapbox::new(endpoint, token)?),
                    // 600 requests per rolling minute.
                    RateLimiter::windowed(600, Duration::from_secs(60)),
                )
            }
        };

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            client,
            limiter,
            backend,
        })
    }

    /// Identifier recorded in checkpoints and logs.
    pub fn id(&self) -> &'static str {
        match &self.backend {
            Backend::Nominatim(_) => "nominatim",
            Backend::Google(_) => "google",
            Backend::Mapbox(_) => "mapbox",
            #[cfg(test)]
            Backend::Scripted(_) => "scripted",
        }
    }

    /// Resolve one query under the provider's rate ceiling.
    ///
    /// Transient failures are retried with exponential backoff, each
    /// attempt re-acquiring the limiter so retries also honor the ceiling.
    /// A row-level failure never escapes as an error.
    pub async fn geocode(&mut self, query: &str) -> GeocodeResult {
        let mut backoff = BACKOFF_BASE;
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.limiter.acquire().await;

            match self.backend.lookup(&self.client, query).await {
                Ok(result) => return result,
                Err(FetchError::Transient(reason)) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "geocode attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, MAX_ATTEMPTS, reason, backoff
                    );
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => {
                    warn!("geocode failed after {} attempt(s): {}", attempt, err);
                    return GeocodeResult::failed();
                }
            }
        }
    }
}

impl Backend {
    async fn lookup(&mut self, client: &Client, query: &str) -> Result<GeocodeResult, FetchError> {
        match self {
            Backend::Nominatim(p) => p.lookup(client, query).await,
            Backend::Google(p) => p.lookup(client, query).await,
            Backend::Mapbox(p) => p.lookup(client, query).await,
            #[cfg(test)]
            Backend::Scripted(p) => p.lookup(query),
        }
    }
}

/// Resolve the endpoint override against the provider default.
pub(crate) fn parse_endpoint(
    override_url: Option<String>,
    default: &str,
) -> Result<Url, EngineError> {
    let raw = override_url.unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(move |source| EngineError::InvalidEndpoint {
        endpoint: raw,
        source,
    })
}

/// Classify a request-level failure from `reqwest`.
pub(crate) fn classify_send_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Permanent(err.to_string())
    }
}

/// Gate on the HTTP status, then decode the JSON body.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, FetchError> {
    let status = response.status();
    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::Transient(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(FetchError::Permanent(format!("HTTP {}", status)));
    }
    response
        .json()
        .await
        .map_err(|e| FetchError::Permanent(format!("invalid response body: {}", e)))
}

#[cfg(test)]
pub(crate) mod scripted {
    //! Deterministic in-memory backend for orchestration tests.

    use std::collections::VecDeque;

    use super::FetchError;
    use crate::models::GeocodeResult;

    #[derive(Debug)]
    pub(crate) struct Scripted {
        results: VecDeque<GeocodeResult>,
        calls: usize,
    }

    impl Scripted {
        pub(crate) fn new(results: Vec<GeocodeResult>) -> Self {
            Self {
                results: results.into(),
                calls: 0,
            }
        }

        pub(crate) fn lookup(&mut self, query: &str) -> Result<GeocodeResult, FetchError> {
            self.calls += 1;
            match self.results.pop_front() {
                Some(result) => Ok(result),
                None => panic!("scripted provider exhausted on query '{}'", query),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls
        }
    }
}

#[cfg(test)]
impl Provider {
    /// Provider that replays the given results in order, one per call.
    pub(crate) fn scripted(results: Vec<GeocodeResult>) -> Self {
        Self {
            client: Client::new(),
            limiter: RateLimiter::fixed_interval(Duration::ZERO),
            backend: Backend::Scripted(scripted::Scripted::new(results)),
        }
    }

    /// Number of lookups issued against a scripted provider.
    pub(crate) fn scripted_calls(&self) -> usize {
        match &self.backend {
            Backend::Scripted(s) => s.calls(),
            _ => panic!("not a scripted provider"),
        }
    }
}
