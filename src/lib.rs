//! Banyan - a multi-backend geocoding pipeline
//!
//! Queries flow through universal preprocessors, an ordered list of backend
//! adapters, and universal postprocessors; candidates from every backend
//! share one data model so filters and sorters compose across providers.

pub mod config;
pub mod error;
pub mod geocoder;
pub mod models;
pub mod processors;
pub mod services;
pub mod stats;

pub use error::{ConfigError, GeocodeError};
pub use geocoder::{GeocodeResult, Geocoder, GeocoderBuilder, QueryInput};
pub use models::{AttrValue, Candidate, PlaceQuery, Viewbox};
