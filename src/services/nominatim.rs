//! OpenStreetMap Nominatim backend.
//!
//! Nominatim has no precision tag comparable to the other providers, so
//! every candidate is tagged `parcel` (the closest match) and carries an
//! `entity` attribute of the form `class.type` (for example `place.house`)
//! that the default postprocessors filter on.

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use super::{Backend, BackendError, BackendSettings};
use crate::models::{AttrValue, Candidate, PlaceQuery};
use crate::processors::postprocessors::{AttrExclude, AttrFilter};
use crate::processors::preprocessors::ReplaceRangeWithNumber;
use crate::processors::{Postprocessor, Preprocessor};

const DEFAULT_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

/// Entity prefixes and values considered addressable. A trailing dot means
/// the whole class is accepted (matched as a substring).
const ACCEPTED_ENTITIES: [&str; 19] = [
    "building.",
    "historic.castle",
    "leisure.ice_rink",
    "leisure.miniature_golf",
    "leisure.sports_centre",
    "leisure.stadium",
    "leisure.track",
    "leisure.water_park",
    "man_made.lighthouse",
    "man_made.works",
    "military.barracks",
    "military.bunker",
    "office.",
    "place.house",
    "amenity.",
    "power.generator",
    "railway.station",
    "shop.",
    "tourism.",
];

/// Amenities that are street furniture rather than destinations.
const REJECTED_ENTITIES: [&str; 7] = [
    "amenity.drinking_water",
    "amenity.bicycle_parking",
    "amenity.ev_charging",
    "amenity.grit_bin",
    "amenity.atm",
    "amenity.hunting_stand",
    "amenity.post_box",
];

pub struct Nominatim {
    client: reqwest::Client,
    settings: BackendSettings,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    class: String,
    #[serde(rename = "type")]
    kind: String,
    display_name: String,
    // Coordinates arrive as strings.
    lon: String,
    lat: String,
}

impl Nominatim {
    pub fn new(settings: BackendSettings) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            client: reqwest::Client::builder()
                .user_agent("banyan/0.1 (geocoder)")
                .build()
                .expect("Failed to create HTTP client"),
            settings,
            endpoint,
        }
    }

    fn to_candidate(&self, place: NominatimPlace) -> Result<Candidate, BackendError> {
        let parse = |field: &str, raw: &str| {
            raw.parse::<f64>().map_err(|_| BackendError::Decode {
                service: self.name().to_string(),
                reason: format!("non-numeric {field}: {raw}"),
            })
        };
        let mut c = Candidate {
            locator: "parcel".to_string(),
            match_addr: place.display_name.clone(),
            x: parse("lon", &place.lon)?,
            y: parse("lat", &place.lat)?,
            geoservice: self.name().to_string(),
            ..Default::default()
        };
        c.set_attr(
            "entity",
            AttrValue::Text(format!("{}.{}", place.class, place.kind)),
        );
        Ok(c)
    }

    async fn fetch_inner(&self, query: &PlaceQuery) -> Result<Vec<Candidate>, BackendError> {
        let mut params: Vec<(String, String)> = vec![
            ("q".to_string(), query.query.clone()),
            // countrycodes only accepts ISO-2
            ("countrycodes".to_string(), query.country.clone()),
            ("format".to_string(), "json".to_string()),
        ];
        if let Some(vb) = &query.viewbox {
            params.push(("viewbox".to_string(), vb.to_nominatim_str()));
            params.push((
                "bounded".to_string(),
                if query.bounded { "1" } else { "0" }.to_string(),
            ));
        }

        debug!(endpoint = %self.endpoint, q = %query.query, "nominatim request");
        let mut request = self.client.get(&self.endpoint).query(&params);
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
        let places: Vec<NominatimPlace> =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode {
                service: self.name().to_string(),
                reason: e.to_string(),
            })?;

        places.into_iter().map(|p| self.to_candidate(p)).collect()
    }
}

impl Backend for Nominatim {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    fn fetch<'a>(
        &'a self,
        query: &'a PlaceQuery,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, BackendError>> {
        Box::pin(self.fetch_inner(query))
    }

    // 766-68 Any St -> 766 Any St
    fn default_preprocessors(&self) -> Vec<Box<dyn Preprocessor>> {
        vec![Box::new(ReplaceRangeWithNumber::new())]
    }

    fn default_postprocessors(&self) -> Vec<Box<dyn Postprocessor>> {
        vec![
            Box::new(AttrFilter::new(ACCEPTED_ENTITIES, "entity").inexact()),
            Box::new(AttrExclude::new(REJECTED_ENTITIES, "entity")),
        ]
    }
}
