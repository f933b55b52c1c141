//! The orchestrator: universal processor chains, the ordered adapter list,
//! and the waterfall query strategy.

use std::time::Instant;

use tracing::{debug, warn};

use crate::error::{ConfigError, GeocodeError};
use crate::models::{Candidate, PlaceQuery};
use crate::processors::postprocessors::{DupePicker, SnapPoints};
use crate::processors::{Postprocessor, Preprocessor, QueryVerdict};
use crate::services::{Adapter, CallMetadata};
use crate::stats::{StatsRecord, StatsSink};

/// Caller-facing query input: either a bare single-line string or an
/// already-built [`PlaceQuery`].
#[derive(Debug, Clone)]
pub enum QueryInput {
    Text(String),
    Place(PlaceQuery),
}

impl From<&str> for QueryInput {
    fn from(s: &str) -> Self {
        QueryInput::Text(s.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(s: String) -> Self {
        QueryInput::Text(s)
    }
}

impl From<PlaceQuery> for QueryInput {
    fn from(pq: PlaceQuery) -> Self {
        QueryInput::Place(pq)
    }
}

/// Candidates in final order plus one metadata record per backend call
/// that reached the network step.
#[derive(Debug, Clone, Default)]
pub struct GeocodeResult {
    pub candidates: Vec<Candidate>,
    pub upstream_responses: Vec<CallMetadata>,
}

pub struct Geocoder {
    adapters: Vec<Adapter>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    postprocessors: Vec<Box<dyn Postprocessor>>,
    waterfall: bool,
    stats_sink: Option<Box<dyn StatsSink>>,
    strict_stats: bool,
}

impl Geocoder {
    pub fn builder() -> GeocoderBuilder {
        GeocoderBuilder::default()
    }

    /// Run one query through the full pipeline.
    ///
    /// `waterfall_override` replaces the configured waterfall flag for this
    /// call only. Backend failures never surface here; inspect
    /// [`GeocodeResult::upstream_responses`] for per-call outcomes.
    pub async fn geocode(
        &self,
        input: impl Into<QueryInput>,
        waterfall_override: Option<bool>,
    ) -> Result<GeocodeResult, GeocodeError> {
        let original = match input.into() {
            QueryInput::Text(text) => PlaceQuery::new(text)?,
            QueryInput::Place(pq) => pq,
        };
        let started = Instant::now();

        let mut processed = original.clone();
        for pre in &self.preprocessors {
            match pre.process(processed) {
                QueryVerdict::Accept(pq) => processed = pq,
                QueryVerdict::Reject => {
                    debug!("query rejected during universal preprocessing");
                    return Ok(GeocodeResult::default());
                }
            }
        }

        let waterfall = waterfall_override.unwrap_or(self.waterfall);
        let mut candidates: Vec<Candidate> = Vec::new();
        let mut upstream_responses: Vec<CallMetadata> = Vec::new();
        for adapter in &self.adapters {
            let (batch, metadata) = adapter.geocode(&processed).await;
            if let Some(metadata) = metadata {
                upstream_responses.push(metadata);
            }
            // Concatenation order decides which candidate wins later
            // grouping ties, so earlier adapters take precedence.
            candidates.extend(batch);
            if !waterfall && !candidates.is_empty() {
                break;
            }
        }

        // Several primitives assume non-empty input.
        if !candidates.is_empty() {
            for post in &self.postprocessors {
                candidates = post.process(candidates);
            }
        }

        let result = GeocodeResult {
            candidates,
            upstream_responses,
        };
        if let Some(sink) = &self.stats_sink {
            let record = StatsRecord {
                original_query: original,
                candidates: result.candidates.clone(),
                upstream_responses: result.upstream_responses.clone(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                total_time_ms: started.elapsed().as_millis() as u64,
            };
            if let Err(err) = sink.emit(&record).await {
                if self.strict_stats {
                    return Err(GeocodeError::Stats(err));
                }
                warn!("stats emission failed: {:#}", err);
            }
        }
        Ok(result)
    }

    /// Convenience wrapper returning just the candidate list.
    pub async fn get_candidates(
        &self,
        input: impl Into<QueryInput>,
    ) -> Result<Vec<Candidate>, GeocodeError> {
        Ok(self.geocode(input, None).await?.candidates)
    }
}

impl std::fmt::Debug for Geocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geocoder")
            .field("adapters", &self.adapters)
            .field("preprocessors", &self.preprocessors)
            .field("postprocessors", &self.postprocessors)
            .field("waterfall", &self.waterfall)
            .field("strict_stats", &self.strict_stats)
            .finish()
    }
}

#[derive(Default)]
pub struct GeocoderBuilder {
    adapters: Vec<Adapter>,
    preprocessors: Vec<Box<dyn Preprocessor>>,
    postprocessors: Option<Vec<Box<dyn Postprocessor>>>,
    waterfall: bool,
    stats_sink: Option<Box<dyn StatsSink>>,
    strict_stats: bool,
}

impl GeocoderBuilder {
    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn preprocessor(mut self, pre: Box<dyn Preprocessor>) -> Self {
        self.preprocessors.push(pre);
        self
    }

    /// Replace the universal postprocessor chain. Without this, the default
    /// chain snaps points within 50 m and resolves duplicate addresses by
    /// locator precision.
    pub fn postprocessors(mut self, post: Vec<Box<dyn Postprocessor>>) -> Self {
        self.postprocessors = Some(post);
        self
    }

    pub fn waterfall(mut self, waterfall: bool) -> Self {
        self.waterfall = waterfall;
        self
    }

    pub fn stats_sink(mut self, sink: impl StatsSink + 'static) -> Self {
        self.stats_sink = Some(Box::new(sink));
        self
    }

    /// Escalate stats sink failures into `geocode` errors.
    pub fn strict_stats(mut self, strict: bool) -> Self {
        self.strict_stats = strict;
        self
    }

    pub fn build(self) -> Result<Geocoder, ConfigError> {
        if self.adapters.is_empty() {
            return Err(ConfigError::NoAdapters);
        }
        let postprocessors = self.postprocessors.unwrap_or_else(default_postprocessors);
        Ok(Geocoder {
            adapters: self.adapters,
            preprocessors: self.preprocessors,
            postprocessors,
            waterfall: self.waterfall,
            stats_sink: self.stats_sink,
            strict_stats: self.strict_stats,
        })
    }
}

fn default_postprocessors() -> Vec<Box<dyn Postprocessor>> {
    vec![
        Box::new(SnapPoints::new(50.0)),
        Box::new(DupePicker::new(
            "match_addr",
            "locator",
            ["rooftop", "parcel", "interpolation_offset", "interpolation"],
        )),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::processors::preprocessors::CancelIfPoBox;
    use crate::services::testing::StubBackend;
    use crate::stats::testing::RecordingSink;

    fn candidate(match_addr: &str, locator: &str, score: f64) -> Candidate {
        Candidate {
            match_addr: match_addr.to_string(),
            locator: locator.to_string(),
            score,
            ..Default::default()
        }
    }

    #[derive(Debug, Default)]
    struct CountingPost {
        calls: Arc<AtomicUsize>,
    }

    impl Postprocessor for CountingPost {
        fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            candidates
        }
    }

    fn two_adapter_geocoder(waterfall: bool) -> Geocoder {
        // Distinct addresses and coordinates, equal scores: the default
        // universal chain runs in these tests, and co-located candidates
        // would be snapped into one, while a lower-scoring candidate would
        // fall outside every DupePicker high-score group.
        let from_first = Candidate {
            x: -75.158433,
            y: 39.958728,
            ..candidate("340 N 12th St", "rooftop", 95.0)
        };
        let from_second = Candidate {
            x: -75.163621,
            y: 39.959926,
            ..candidate("1200 Callowhill St", "parcel", 95.0)
        };
        Geocoder::builder()
            .adapter(Adapter::new(StubBackend::returning("first", vec![from_first])))
            .adapter(Adapter::new(StubBackend::returning(
                "second",
                vec![from_second],
            )))
            .waterfall(waterfall)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_non_waterfall_stops_after_first_hit() {
        let geocoder = two_adapter_geocoder(false);
        let result = geocoder.geocode("340 N 12th St", None).await.unwrap();

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.upstream_responses.len(), 1);
        assert_eq!(result.upstream_responses[0].geoservice, "first");
    }

    #[tokio::test]
    async fn test_waterfall_consults_every_adapter() {
        let geocoder = two_adapter_geocoder(true);
        let result = geocoder.geocode("340 N 12th St", None).await.unwrap();

        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.upstream_responses.len(), 2);
        assert_eq!(result.candidates[0].match_addr, "340 N 12th St");
    }

    #[tokio::test]
    async fn test_waterfall_override_beats_configured_flag() {
        let geocoder = two_adapter_geocoder(false);
        let result = geocoder.geocode("340 N 12th St", Some(true)).await.unwrap();
        assert_eq!(result.upstream_responses.len(), 2);
    }

    #[tokio::test]
    async fn test_universal_rejection_returns_empty_without_adapters() {
        let calls = Arc::new(AtomicUsize::new(0));
        let geocoder = Geocoder::builder()
            .adapter(Adapter::new(StubBackend::returning(
                "stub",
                vec![candidate("should not appear", "rooftop", 95.0)],
            )))
            .preprocessor(Box::new(CancelIfPoBox::new()))
            .postprocessors(vec![Box::new(CountingPost {
                calls: calls.clone(),
            })])
            .build()
            .unwrap();

        let result = geocoder.geocode("PO Box 123", None).await.unwrap();
        assert!(result.candidates.is_empty());
        assert!(result.upstream_responses.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_accumulation_skips_postprocessors() {
        let calls = Arc::new(AtomicUsize::new(0));
        let geocoder = Geocoder::builder()
            .adapter(Adapter::new(StubBackend::returning("stub", Vec::new())))
            .postprocessors(vec![Box::new(CountingPost {
                calls: calls.clone(),
            })])
            .build()
            .unwrap();

        let result = geocoder.geocode("340 N 12th St", None).await.unwrap();
        assert!(result.candidates.is_empty());
        assert_eq!(result.upstream_responses.len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_default_chain_dedupes_across_adapters() {
        // Same address from two providers, far enough apart that point
        // snapping leaves both for the duplicate picker.
        let from_first = Candidate {
            x: -75.158433,
            y: 39.958728,
            ..candidate("340 N 12th St", "parcel", 90.0)
        };
        let from_second = Candidate {
            x: -75.163000,
            y: 39.952000,
            ..candidate("340 N 12TH ST", "rooftop", 90.0)
        };
        let geocoder = Geocoder::builder()
            .adapter(Adapter::new(StubBackend::returning("first", vec![from_first])))
            .adapter(Adapter::new(StubBackend::returning(
                "second",
                vec![from_second],
            )))
            .waterfall(true)
            .build()
            .unwrap();

        let candidates = geocoder.get_candidates("340 N 12th St").await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].locator, "rooftop");
    }

    #[tokio::test]
    async fn test_empty_text_input_is_config_error() {
        let geocoder = two_adapter_geocoder(false);
        let err = geocoder.geocode("", None).await.unwrap_err();
        assert!(matches!(
            err,
            GeocodeError::Config(ConfigError::EmptyPlaceQuery)
        ));
    }

    #[test]
    fn test_builder_requires_an_adapter() {
        assert!(matches!(
            Geocoder::builder().build(),
            Err(ConfigError::NoAdapters)
        ));
    }

    #[tokio::test]
    async fn test_stats_failure_swallowed_by_default() {
        let geocoder = Geocoder::builder()
            .adapter(Adapter::new(StubBackend::returning(
                "stub",
                vec![candidate("340 N 12th St", "rooftop", 95.0)],
            )))
            .stats_sink(RecordingSink::failing())
            .build()
            .unwrap();

        let result = geocoder.geocode("340 N 12th St", None).await.unwrap();
        assert_eq!(result.candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_failure_raised_in_strict_mode() {
        let geocoder = Geocoder::builder()
            .adapter(Adapter::new(StubBackend::returning(
                "stub",
                vec![candidate("340 N 12th St", "rooftop", 95.0)],
            )))
            .stats_sink(RecordingSink::failing())
            .strict_stats(true)
            .build()
            .unwrap();

        let err = geocoder.geocode("340 N 12th St", None).await.unwrap_err();
        assert!(matches!(err, GeocodeError::Stats(_)));
    }
}
