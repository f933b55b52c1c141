//! Backend adapters.
//!
//! A [`Backend`] speaks one provider's wire protocol and nothing else. The
//! [`Adapter`] wraps it with the per-backend processor chains, timing, the
//! call timeout, and error absorption, so the orchestrator sees a uniform
//! `geocode` that cannot fail at runtime.

pub mod esri_wgs;
pub mod nominatim;
pub mod us_census;

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{Candidate, PlaceQuery};
use crate::processors::{Postprocessor, Preprocessor, QueryVerdict};

pub use esri_wgs::EsriWgs;
pub use nominatim::Nominatim;
pub use us_census::UsCensus;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Failure of one network round trip. Never crosses the adapter boundary;
/// rendered into [`CallMetadata::errors`] instead.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("{service} timed out after {after:?}")]
    Timeout { service: String, after: Duration },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{service} returned status {status}")]
    Status {
        service: String,
        status: reqwest::StatusCode,
    },

    #[error("{service} response could not be interpreted: {reason}")]
    Decode { service: String, reason: String },
}

/// Per-adapter configuration shared by every backend family: credentials,
/// an endpoint override for self-hosted or regional deployments, the call
/// timeout, extra request headers, and a free-form option map for
/// backend-specific switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_headers: BTreeMap<String, String>,
    #[serde(flatten)]
    pub options: BTreeMap<String, toml::Value>,
}

impl BackendSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// String-valued extra option, e.g. a Nominatim country list.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(|v| v.as_str())
    }
}

/// Record of one backend invocation, returned alongside its candidates and
/// forwarded to the statistics sink. Only exists when the adapter actually
/// reached the network step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallMetadata {
    /// Backend name, e.g. `nominatim`.
    pub geoservice: String,
    /// The query as sent, after adapter preprocessing.
    pub query: PlaceQuery,
    /// HTTP status, when one was observed.
    pub response_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub success: bool,
    pub errors: Vec<String>,
}

impl CallMetadata {
    fn new(geoservice: &str, query: PlaceQuery) -> Self {
        Self {
            geoservice: geoservice.to_string(),
            query,
            response_code: None,
            response_time_ms: None,
            success: false,
            errors: Vec::new(),
        }
    }
}

/// One external geocoding provider's request/response logic.
///
/// `fetch` is transport only: build the request from the query and settings,
/// decode the response into candidates. Chains, timing, and error handling
/// belong to the owning [`Adapter`]. The default chain hooks mint fresh
/// instances on every call so no two adapters ever share processor state.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch<'a>(
        &'a self,
        query: &'a PlaceQuery,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, BackendError>>;

    fn default_preprocessors(&self) -> Vec<Box<dyn Preprocessor>> {
        Vec::new()
    }

    fn default_postprocessors(&self) -> Vec<Box<dyn Postprocessor>> {
        Vec::new()
    }
}

/// A configured backend: the transport plus its processor chains and
/// settings, driven through the uniform `geocode` entry point.
pub struct Adapter {
    backend: Box<dyn Backend>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    postprocessors: Vec<Box<dyn Postprocessor>>,
    timeout: Duration,
}

impl Adapter {
    /// Wrap a backend with its own default processor chains.
    pub fn new(backend: impl Backend + 'static) -> Self {
        let preprocessors = backend.default_preprocessors();
        let postprocessors = backend.default_postprocessors();
        Self {
            backend: Box::new(backend),
            preprocessors,
            postprocessors,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Wrap a backend with explicit chains, replacing its defaults.
    pub fn with_processors(
        backend: impl Backend + 'static,
        preprocessors: Vec<Box<dyn Preprocessor>>,
        postprocessors: Vec<Box<dyn Postprocessor>>,
    ) -> Self {
        Self {
            backend: Box::new(backend),
            preprocessors,
            postprocessors,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &'static str {
        self.backend.name()
    }

    /// Run one provider call end to end.
    ///
    /// Rejection by a preprocessor returns `(empty, None)`: nothing reached
    /// the network, so there is no call to describe. Every network-step
    /// failure is absorbed into the metadata and never propagates.
    pub async fn geocode(&self, query: &PlaceQuery) -> (Vec<Candidate>, Option<CallMetadata>) {
        let mut processed = query.clone();
        for pre in &self.preprocessors {
            match pre.process(processed) {
                QueryVerdict::Accept(pq) => processed = pq,
                QueryVerdict::Reject => return (Vec::new(), None),
            }
        }

        let mut metadata = CallMetadata::new(self.backend.name(), processed.clone());
        let started = std::time::Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.backend.fetch(&processed)).await;
        metadata.response_time_ms = Some(started.elapsed().as_millis() as u64);

        let mut candidates = match outcome {
            Ok(Ok(candidates)) => {
                metadata.success = true;
                candidates
            }
            Ok(Err(err)) => {
                if let BackendError::Status { status, .. } = &err {
                    metadata.response_code = Some(status.as_u16());
                }
                warn!(service = self.backend.name(), error = %err, "geocode call failed");
                metadata.errors.push(err.to_string());
                Vec::new()
            }
            Err(_) => {
                let err = BackendError::Timeout {
                    service: self.backend.name().to_string(),
                    after: self.timeout,
                };
                warn!(service = self.backend.name(), error = %err, "geocode call failed");
                metadata.errors.push(err.to_string());
                Vec::new()
            }
        };

        if !candidates.is_empty() {
            for post in &self.postprocessors {
                candidates = post.process(candidates);
            }
        }
        (candidates, Some(metadata))
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("backend", &self.backend.name())
            .field("preprocessors", &self.preprocessors)
            .field("postprocessors", &self.postprocessors)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Backend double returning a canned result, for adapter and
    /// orchestrator tests.
    pub struct StubBackend {
        pub name: &'static str,
        pub result: Result<Vec<Candidate>, String>,
    }

    impl StubBackend {
        pub fn returning(name: &'static str, candidates: Vec<Candidate>) -> Self {
            Self {
                name,
                result: Ok(candidates),
            }
        }

        pub fn failing(name: &'static str, reason: &str) -> Self {
            Self {
                name,
                result: Err(reason.to_string()),
            }
        }
    }

    impl Backend for StubBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn fetch<'a>(
            &'a self,
            _query: &'a PlaceQuery,
        ) -> BoxFuture<'a, Result<Vec<Candidate>, BackendError>> {
            Box::pin(async move {
                match &self.result {
                    Ok(candidates) => Ok(candidates.clone()),
                    Err(reason) => Err(BackendError::Decode {
                        service: self.name.to_string(),
                        reason: reason.clone(),
                    }),
                }
            })
        }
    }
}
