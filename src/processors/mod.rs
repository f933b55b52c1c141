//! Query and candidate processing stages.
//!
//! A preprocessor reshapes or screens one [`PlaceQuery`] before any network
//! call; a postprocessor transforms the candidate list a backend returned.
//! Both the orchestrator and each adapter own ordered chains of these.

pub mod postprocessors;
pub mod preprocessors;

use std::fmt;

use crate::models::{Candidate, PlaceQuery};

/// Outcome of one preprocessing stage.
///
/// `Reject` is a normal empty-result outcome (unprocessable query), not an
/// error; it is distinct from an accepted query that happens to produce no
/// candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryVerdict {
    Accept(PlaceQuery),
    Reject,
}

impl QueryVerdict {
    pub fn is_rejected(&self) -> bool {
        matches!(self, QueryVerdict::Reject)
    }
}

/// Transforms or rejects a place query. Implementations take the query by
/// value and return a new one; a caller keeping the original must clone
/// before processing.
pub trait Preprocessor: fmt::Debug + Send + Sync {
    fn process(&self, pq: PlaceQuery) -> QueryVerdict;
}

/// Transforms a candidate sequence. Empty input must be a no-op.
///
/// Candidates not selected by a primitive keep their relative order unless
/// the primitive's contract says otherwise.
pub trait Postprocessor: fmt::Debug + Send + Sync {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate>;
}
