//! Error types crossing the library boundary.
//!
//! Per-call backend failures never surface here; they are absorbed into
//! [`CallMetadata`](crate::services::CallMetadata) by the owning adapter.

use thiserror::Error;

/// Invalid construction input. Raised synchronously when building queries,
/// viewboxes, or the geocoder itself; fatal to the caller.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("must provide query or one or more of address, city, state, and postal")]
    EmptyPlaceQuery,

    #[error("invalid viewbox: {0}")]
    InvalidViewbox(String),

    #[error("must configure at least one adapter for a geocoder")]
    NoAdapters,

    #[error("invalid processor configuration: {0}")]
    InvalidProcessor(String),
}

/// Failure of a `geocode` call itself. Backend failures are reported as
/// data, so this only covers bad input coercion and, in strict-stats mode,
/// a statistics sink failure.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("stats sink failure: {0}")]
    Stats(#[source] anyhow::Error),
}
