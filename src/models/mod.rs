//! Core data models for the geocoding system.

pub mod candidate;
pub mod place;

pub use candidate::{AttrValue, Candidate};
pub use place::{PlaceQuery, Viewbox};
