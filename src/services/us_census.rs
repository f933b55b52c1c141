//! US Census Bureau geocoder backend. US-only results.

use futures::future::BoxFuture;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{Backend, BackendError, BackendSettings};
use crate::models::{AttrValue, Candidate, PlaceQuery};

const DEFAULT_ENDPOINT: &str = "https://geocoding.geo.census.gov/geocoder/locations";
const DEFAULT_BENCHMARK: &str = "Public_AR_Current";

pub struct UsCensus {
    client: reqwest::Client,
    settings: BackendSettings,
    endpoint: String,
    benchmark: String,
    re_addr_num: Regex,
}

#[derive(Debug, Deserialize)]
struct CensusResponse {
    result: CensusResult,
}

#[derive(Debug, Deserialize)]
struct CensusResult {
    #[serde(rename = "addressMatches", default)]
    address_matches: Vec<CensusMatch>,
}

#[derive(Debug, Deserialize)]
struct CensusMatch {
    #[serde(rename = "matchedAddress")]
    matched_address: String,
    coordinates: CensusCoordinates,
    #[serde(rename = "addressComponents", default)]
    components: CensusComponents,
}

#[derive(Debug, Deserialize)]
struct CensusCoordinates {
    x: f64,
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
struct CensusComponents {
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    zip: String,
    #[serde(rename = "preQualifier", default)]
    pre_qualifier: String,
    #[serde(rename = "preDirection", default)]
    pre_direction: String,
    #[serde(rename = "preType", default)]
    pre_type: String,
    #[serde(rename = "streetName", default)]
    street_name: String,
    #[serde(rename = "suffixType", default)]
    suffix_type: String,
    #[serde(rename = "suffixDirection", default)]
    suffix_direction: String,
    #[serde(rename = "suffixQualifier", default)]
    suffix_qualifier: String,
}

impl UsCensus {
    pub fn new(settings: BackendSettings) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let benchmark = settings
            .option_str("benchmark")
            .unwrap_or(DEFAULT_BENCHMARK)
            .to_string();
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("Failed to create HTTP client"),
            settings,
            endpoint,
            benchmark,
            re_addr_num: Regex::new(r"^[0-9]+").expect("invalid address number regex"),
        }
    }

    /// Street address only, reconstructed from the response components. The
    /// components carry a from/to range rather than the matched house
    /// number, so the number is lifted off the front of the matched address
    /// string instead.
    fn street_addr(&self, m: &CensusMatch) -> String {
        let Some(num) = self.re_addr_num.find(&m.matched_address) else {
            return String::new();
        };
        let c = &m.components;
        let parts = [
            num.as_str(),
            &c.pre_qualifier,
            &c.pre_direction,
            &c.pre_type,
            &c.street_name,
            &c.suffix_type,
            &c.suffix_direction,
            &c.suffix_qualifier,
        ];
        parts
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_candidate(&self, m: CensusMatch) -> Candidate {
        let street_addr = self.street_addr(&m);
        let mut c = Candidate {
            match_addr: m.matched_address.clone(),
            x: m.coordinates.x,
            y: m.coordinates.y,
            geoservice: self.name().to_string(),
            ..Default::default()
        };
        c.set_attr("match_city", AttrValue::Text(m.components.city.clone()));
        c.set_attr("match_region", AttrValue::Text(m.components.state.clone()));
        c.set_attr("match_postal", AttrValue::Text(m.components.zip.clone()));
        // No county from this geocoder, and only US results.
        c.set_attr("match_subregion", AttrValue::Text(String::new()));
        c.set_attr("match_country", AttrValue::Text("USA".to_string()));
        c.set_attr("match_streetaddr", AttrValue::Text(street_addr));
        c
    }

    async fn fetch_inner(&self, query: &PlaceQuery) -> Result<Vec<Candidate>, BackendError> {
        let mut params: Vec<(String, String)> = vec![
            ("format".to_string(), "json".to_string()),
            ("benchmark".to_string(), self.benchmark.clone()),
        ];
        let url = if !query.query.is_empty() {
            params.push(("address".to_string(), query.query.clone()));
            format!("{}/onelineaddress", self.endpoint)
        } else {
            params.extend([
                ("street".to_string(), query.address.clone()),
                ("city".to_string(), query.city.clone()),
                ("state".to_string(), query.state.clone()),
                ("zip".to_string(), query.postal.clone()),
            ]);
            format!("{}/address", self.endpoint)
        };

        debug!(url, "census request");
        let mut request = self.client.get(&url).query(&params);
        for (name, value) in &self.settings.request_headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(BackendError::Status {
                service: self.name().to_string(),
                status: response.status(),
            });
        }
        let body = response.text().await?;
        let parsed: CensusResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode {
                service: self.name().to_string(),
                reason: e.to_string(),
            })?;

        Ok(parsed
            .result
            .address_matches
            .into_iter()
            .map(|m| self.to_candidate(m))
            .collect())
    }
}

impl Backend for UsCensus {
    fn name(&self) -> &'static str {
        "us_census"
    }

    fn fetch<'a>(
        &'a self,
        query: &'a PlaceQuery,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, BackendError>> {
        Box::pin(self.fetch_inner(query))
    }
}
