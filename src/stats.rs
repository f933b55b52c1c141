//! Per-call statistics emission.
//!
//! One [`StatsRecord`] is produced per `geocode` call and handed to the
//! configured sink. Emission is best effort; a sink failure is logged and
//! swallowed unless the geocoder was built in strict-stats mode.

use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::models::{Candidate, PlaceQuery};
use crate::services::CallMetadata;

/// Everything worth knowing about one geocode call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRecord {
    /// The query as the caller provided it, before any preprocessing.
    pub original_query: PlaceQuery,
    pub candidates: Vec<Candidate>,
    /// One entry per adapter that reached its network step; each carries
    /// the processed query that adapter actually sent.
    pub upstream_responses: Vec<CallMetadata>,
    pub timestamp: String,
    pub total_time_ms: u64,
}

/// Destination for geocode statistics.
pub trait StatsSink: Send + Sync {
    fn emit<'a>(&'a self, record: &'a StatsRecord) -> BoxFuture<'a, Result<()>>;
}

/// Writes each record as one JSON line through `tracing`, on the
/// `geocode_stats` target so deployments can route or silence it.
#[derive(Debug, Default)]
pub struct LogStatsSink;

impl StatsSink for LogStatsSink {
    fn emit<'a>(&'a self, record: &'a StatsRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let line = serde_json::to_string(record)?;
            tracing::info!(target: "geocode_stats", "{}", line);
            Ok(())
        })
    }
}

/// POSTs each record as JSON to a collector endpoint.
pub struct WebhookStatsSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookStatsSink {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

impl StatsSink for WebhookStatsSink {
    fn emit<'a>(&'a self, record: &'a StatsRecord) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let response = self.client.post(&self.url).json(record).send().await?;

            if !response.status().is_success() {
                let error_text = response.text().await?;
                error!("Failed to deliver stats record: {}", error_text);
                anyhow::bail!("stats webhook failed: {}", error_text);
            }

            debug!("Delivered stats record to {}", self.url);
            Ok(())
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Sink double that records or fails on demand.
    #[derive(Default)]
    pub struct RecordingSink {
        pub records: Mutex<Vec<StatsRecord>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl StatsSink for RecordingSink {
        fn emit<'a>(&'a self, record: &'a StatsRecord) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.fail {
                    anyhow::bail!("sink unavailable");
                }
                self.records.lock().unwrap().push(record.clone());
                Ok(())
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record_serializes_flat() {
        let record = StatsRecord {
            original_query: PlaceQuery::new("340 N 12th St").unwrap(),
            candidates: vec![Candidate {
                match_addr: "340 N 12th St, Philadelphia, PA, 19107".to_string(),
                ..Default::default()
            }],
            upstream_responses: Vec::new(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            total_time_ms: 42,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["original_query"]["query"], "340 N 12th St");
        assert_eq!(json["total_time_ms"], 42);
    }
}
