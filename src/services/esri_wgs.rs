//! Esri World Geocoding service backend.
//!
//! Uses two endpoints: `find` for single-line queries and
//! `findAddressCandidates` for multipart ones. A `key` query hint is
//! forwarded as a magicKey so suggest-endpoint lookups resolve to the
//! suggested feature; combining a magicKey with a viewbox is not
//! recommended by the provider.

use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use super::{Backend, BackendError, BackendSettings};
use crate::models::{AttrValue, Candidate, PlaceQuery};
use crate::processors::postprocessors::{
    AttrFilter, AttrRename, AttrSorter, GroupBy, GroupByMultiple, ScoreSorter,
    UseHighScoreIfAtLeast,
};
use crate::processors::preprocessors::CancelIfPoBox;
use crate::processors::{Postprocessor, Preprocessor};

const DEFAULT_ENDPOINT: &str =
    "https://geocode.arcgis.com/arcgis/rest/services/World/GeocodeServer";

/// Provider precision tags mapped onto the normalized locator vocabulary.
const LOCATOR_MAP: [(&str, &str); 4] = [
    ("PointAddress", "rooftop"),
    ("StreetAddress", "interpolation"),
    ("PostalExt", "postal_specific"),
    ("Postal", "postal"),
];

const OUT_FIELDS: &str = "Loc_name,Score,Match_Addr,Addr_Type,AddNum,StPreDir,StPreType,StName,StType,StDir,City,Subregion,Region,Postal,Country,DisplayX,DisplayY";

pub struct EsriWgs {
    client: reqwest::Client,
    settings: BackendSettings,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct FindResponse {
    #[serde(rename = "spatialReference")]
    spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    locations: Vec<FindLocation>,
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    #[serde(rename = "spatialReference")]
    spatial_reference: Option<SpatialReference>,
    #[serde(default)]
    candidates: Vec<AddressCandidate>,
}

#[derive(Debug, Deserialize)]
struct SpatialReference {
    wkid: i32,
}

#[derive(Debug, Deserialize)]
struct FindLocation {
    feature: FindFeature,
}

#[derive(Debug, Deserialize)]
struct FindFeature {
    attributes: LocationAttributes,
}

#[derive(Debug, Deserialize)]
struct AddressCandidate {
    attributes: LocationAttributes,
}

#[derive(Debug, Default, Clone, Deserialize)]
struct LocationAttributes {
    #[serde(rename = "Loc_name", default)]
    loc_name: String,
    #[serde(rename = "Score", default)]
    score: f64,
    #[serde(rename = "Match_Addr", default)]
    match_addr: String,
    #[serde(rename = "Addr_Type", default)]
    addr_type: String,
    #[serde(rename = "AddNum", default)]
    add_num: String,
    #[serde(rename = "StPreDir", default)]
    st_pre_dir: String,
    #[serde(rename = "StPreType", default)]
    st_pre_type: String,
    #[serde(rename = "StName", default)]
    st_name: String,
    #[serde(rename = "StType", default)]
    st_type: String,
    #[serde(rename = "StDir", default)]
    st_dir: String,
    #[serde(rename = "City", default)]
    city: String,
    #[serde(rename = "Subregion", default)]
    subregion: String,
    #[serde(rename = "Region", default)]
    region: String,
    #[serde(rename = "Postal", default)]
    postal: String,
    #[serde(rename = "Country", default)]
    country: String,
    #[serde(rename = "DisplayX", default)]
    display_x: f64,
    #[serde(rename = "DisplayY", default)]
    display_y: f64,
}

impl LocationAttributes {
    /// Street address only (no city or region), reconstructed from the
    /// response components in the ordering the provider's examples imply.
    fn street_addr(&self) -> String {
        let parts = [
            &self.add_num,
            &self.st_pre_dir,
            &self.st_pre_type,
            &self.st_name,
            &self.st_type,
            &self.st_dir,
        ];
        parts
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn into_candidate(self, wkid: i32, geoservice: &str) -> Candidate {
        let mut c = Candidate {
            locator: self.loc_name.clone(),
            score: self.score,
            match_addr: self.match_addr.clone(),
            x: self.display_x,
            y: self.display_y,
            wkid,
            geoservice: geoservice.to_string(),
            ..Default::default()
        };
        c.set_attr("locator_type", AttrValue::Text(self.addr_type.clone()));
        c.set_attr("match_city", AttrValue::Text(self.city.clone()));
        c.set_attr("match_subregion", AttrValue::Text(self.subregion.clone()));
        c.set_attr("match_region", AttrValue::Text(self.region.clone()));
        c.set_attr("match_postal", AttrValue::Text(self.postal.clone()));
        c.set_attr("match_country", AttrValue::Text(self.country.clone()));
        c.set_attr("match_streetaddr", AttrValue::Text(self.street_addr()));
        c
    }
}

impl EsriWgs {
    pub fn new(settings: BackendSettings) -> Self {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("Failed to create HTTP client"),
            settings,
            endpoint,
        }
    }

    async fn fetch_inner(&self, query: &PlaceQuery) -> Result<Vec<Candidate>, BackendError> {
        let mut pq = query.clone();
        // Postal-only searches work on the single-line endpoint but not the
        // multipart one.
        if pq.query.is_empty() && pq.address.is_empty() && !pq.postal.is_empty() {
            pq.query = pq.postal.clone();
        }

        let mut params: Vec<(String, String)> = vec![
            ("f".to_string(), "json".to_string()),
            ("outFields".to_string(), OUT_FIELDS.to_string()),
            ("maxLocations".to_string(), "20".to_string()),
        ];
        if let Some(key) = &self.settings.api_key {
            params.push(("token".to_string(), key.clone()));
        }

        let viewbox_json = match (&pq.viewbox, pq.bounded) {
            (Some(vb), true) => Some(vb.to_esri_json()),
            _ => None,
        };

        let multipart = pq.query.is_empty();
        let url = if multipart {
            params.extend([
                ("Address".to_string(), pq.address.clone()),
                ("Neighborhood".to_string(), pq.neighborhood.clone()),
                ("City".to_string(), pq.city.clone()),
                ("Subregion".to_string(), pq.subregion.clone()),
                ("Region".to_string(), pq.state.clone()),
                ("Postal".to_string(), pq.postal.clone()),
                ("CountryCode".to_string(), pq.country.clone()),
            ]);
            if let Some(extent) = viewbox_json {
                params.push(("searchExtent".to_string(), extent));
            }
            format!("{}/findAddressCandidates", self.endpoint)
        } else {
            params.extend([
                ("text".to_string(), pq.query.clone()),
                ("sourceCountry".to_string(), pq.country.clone()),
            ]);
            if let Some(AttrValue::Text(magic_key)) = pq.hint("key") {
                params.push(("magicKey".to_string(), magic_key.clone()));
            }
            if let Some(bbox) = viewbox_json {
                params.push(("bbox".to_string(), bbox));
            }
            format!("{}/find", self.endpoint)
        };

        debug!(url, multipart, "esri request");
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

        let decode_err = |e: serde_json::Error| BackendError::Decode {
            service: self.name().to_string(),
            reason: e.to_string(),
        };
        let (wkid, attributes) = if multipart {
            let parsed: CandidatesResponse = serde_json::from_str(&body).map_err(decode_err)?;
            let wkid = parsed.spatial_reference.map(|sr| sr.wkid).unwrap_or(4326);
            (
                wkid,
                parsed
                    .candidates
                    .into_iter()
                    .map(|c| c.attributes)
                    .collect::<Vec<_>>(),
            )
        } else {
            let parsed: FindResponse = serde_json::from_str(&body).map_err(decode_err)?;
            let wkid = parsed.spatial_reference.map(|sr| sr.wkid).unwrap_or(4326);
            (
                wkid,
                parsed
                    .locations
                    .into_iter()
                    .map(|l| l.feature.attributes)
                    .collect::<Vec<_>>(),
            )
        };

        Ok(attributes
            .into_iter()
            .map(|a| a.into_candidate(wkid, self.name()))
            .collect())
    }
}

impl Backend for EsriWgs {
    fn name(&self) -> &'static str {
        "esri_wgs"
    }

    fn fetch<'a>(
        &'a self,
        query: &'a PlaceQuery,
    ) -> BoxFuture<'a, Result<Vec<Candidate>, BackendError>> {
        Box::pin(self.fetch_inner(query))
    }

    fn default_preprocessors(&self) -> Vec<Box<dyn Preprocessor>> {
        vec![Box::new(CancelIfPoBox::new())]
    }

    // Postal-level results are filtered out here on purpose; a deployment
    // wanting them configures its own chain without the locator_type filter.
    fn default_postprocessors(&self) -> Vec<Box<dyn Postprocessor>> {
        vec![
            Box::new(AttrFilter::new(
                ["PointAddress", "StreetAddress"],
                "locator_type",
            )),
            Box::new(AttrSorter::new(
                ["PointAddress", "StreetAddress"],
                "locator_type",
            )),
            // Rename after the filter so discarded tags are never searched.
            Box::new(AttrRename::new("locator", LOCATOR_MAP)),
            Box::new(UseHighScoreIfAtLeast::new(99.8)),
            Box::new(ScoreSorter::new()),
            Box::new(GroupBy::new("match_addr")),
            Box::new(GroupByMultiple::new(["x", "y"])),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::Postprocessor;

    const MULTIPART_BODY: &str = r#"{
        "spatialReference": {"wkid": 4326, "latestWkid": 4326},
        "candidates": [
            {
                "address": "340 N 12th St, Philadelphia, Pennsylvania, 19107",
                "location": {"x": -75.158433, "y": 39.958728},
                "score": 100,
                "attributes": {
                    "Loc_name": "World",
                    "Score": 100,
                    "Match_Addr": "340 N 12th St, Philadelphia, Pennsylvania, 19107",
                    "Addr_Type": "PointAddress",
                    "AddNum": "340",
                    "StPreDir": "N",
                    "StPreType": "",
                    "StName": "12th",
                    "StType": "St",
                    "StDir": "",
                    "City": "Philadelphia",
                    "Subregion": "Philadelphia County",
                    "Region": "Pennsylvania",
                    "Postal": "19107",
                    "Country": "USA",
                    "DisplayX": -75.158433,
                    "DisplayY": 39.958728
                }
            }
        ]
    }"#;

    #[test]
    fn test_multipart_response_decodes_into_candidate() {
        let parsed: CandidatesResponse = serde_json::from_str(MULTIPART_BODY).unwrap();
        let wkid = parsed.spatial_reference.map(|sr| sr.wkid).unwrap_or(4326);
        let c = parsed.candidates[0]
            .attributes
            .clone()
            .into_candidate(wkid, "esri_wgs");

        assert_eq!(c.locator, "World");
        assert_eq!(c.score, 100.0);
        assert_eq!(c.wkid, 4326);
        assert_eq!(c.x, -75.158433);
        assert_eq!(
            c.attr("locator_type"),
            Some(AttrValue::from("PointAddress"))
        );
        assert_eq!(c.attr("match_city"), Some(AttrValue::from("Philadelphia")));
        assert_eq!(
            c.attr("match_streetaddr"),
            Some(AttrValue::from("340 N 12th St"))
        );
    }

    #[test]
    fn test_street_addr_skips_empty_components() {
        let attrs = LocationAttributes {
            add_num: "340".to_string(),
            st_pre_dir: "N".to_string(),
            st_name: "12th".to_string(),
            st_type: "St".to_string(),
            ..Default::default()
        };
        assert_eq!(attrs.street_addr(), "340 N 12th St");
        assert_eq!(LocationAttributes::default().street_addr(), "");
    }

    #[test]
    fn test_default_chain_normalizes_locators() {
        let backend = EsriWgs::new(BackendSettings::default());
        let mut point = Candidate {
            locator: "USA.PointAddress".to_string(),
            match_addr: "340 N 12th St".to_string(),
            score: 100.0,
            x: -75.158433,
            y: 39.958728,
            ..Default::default()
        };
        point.set_attr("locator_type", AttrValue::from("PointAddress"));
        let mut postal = Candidate {
            locator: "World".to_string(),
            match_addr: "19107".to_string(),
            score: 100.0,
            ..Default::default()
        };
        postal.set_attr("locator_type", AttrValue::from("Postal"));

        let mut candidates = vec![postal, point];
        for post in backend.default_postprocessors() {
            candidates = post.process(candidates);
        }
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].locator, "rooftop");
    }
}
