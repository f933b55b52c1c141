//! Place queries and bounding viewboxes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::AttrValue;
use crate::error::ConfigError;

/// Axis-aligned bounding rectangle used to bias or constrain a query.
///
/// Bounds are in the coordinate order of the spatial reference identified by
/// `wkid` (x increases left to right, y bottom to top). Defaults to the
/// maximum WGS84 extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewbox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub wkid: i32,
}

impl Viewbox {
    /// Create a viewbox in WGS84 (WKID 4326), validating the bounds.
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Result<Self, ConfigError> {
        Self::with_wkid(left, top, right, bottom, 4326)
    }

    pub fn with_wkid(
        left: f64,
        top: f64,
        right: f64,
        bottom: f64,
        wkid: i32,
    ) -> Result<Self, ConfigError> {
        if ![left, top, right, bottom].iter().all(|b| b.is_finite()) {
            return Err(ConfigError::InvalidViewbox(
                "one or more bounds is not a finite number".into(),
            ));
        }
        if left > right {
            return Err(ConfigError::InvalidViewbox(
                "left x-coord must be less than right x-coord".into(),
            ));
        }
        if bottom > top {
            return Err(ConfigError::InvalidViewbox(
                "bottom y-coord must be less than top y-coord".into(),
            ));
        }
        Ok(Self {
            left,
            top,
            right,
            bottom,
            wkid,
        })
    }

    /// Spatial-reference conversion. Identity for now; only WGS84 viewboxes
    /// are produced by callers in practice.
    pub fn convert_srs(&self, _new_wkid: i32) -> Viewbox {
        *self
    }

    /// Encode as the `left,top,right,bottom` string Nominatim-style services
    /// take as a `viewbox` parameter.
    pub fn to_nominatim_str(&self) -> String {
        let vb = self.convert_srs(4326);
        format!("{},{},{},{}", vb.left, vb.top, vb.right, vb.bottom)
    }

    /// Encode as the JSON extent object the Esri World Geocoding service
    /// takes as a `searchExtent`/`bbox` parameter.
    pub fn to_esri_json(&self) -> String {
        serde_json::json!({
            "xmin": self.left,
            "ymin": self.bottom,
            "xmax": self.right,
            "ymax": self.top,
            "spatialReference": { "wkid": self.wkid },
        })
        .to_string()
    }
}

impl Default for Viewbox {
    fn default() -> Self {
        Self {
            left: -180.0,
            top: 90.0,
            right: 180.0,
            bottom: -90.0,
            wkid: 4326,
        }
    }
}

/// One geocoding request: a free-text query, structured address parts, or
/// both, plus optional bounding and backend-specific hints.
///
/// At least one of `query`, `address`, `city`, `state`, `postal` must be
/// non-empty. The pipeline clones a query before each preprocessing stage so
/// the caller's original survives for audit logging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaceQuery {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub neighborhood: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub subregion: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal: String,
    #[serde(default)]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewbox: Option<Viewbox>,
    #[serde(default)]
    pub bounded: bool,
    /// Backend-specific hints (user location, locale, magic keys, ...).
    #[serde(flatten)]
    pub hints: BTreeMap<String, AttrValue>,
}

impl PlaceQuery {
    /// Create a query from a single line of text,
    /// e.g. `340 N 12th St Philadelphia PA 19107`.
    pub fn new(query: impl Into<String>) -> Result<Self, ConfigError> {
        Self {
            query: query.into(),
            ..Default::default()
        }
        .validated()
    }

    /// Validate the required-field invariant, consuming and returning the
    /// query so it composes with struct-literal construction.
    pub fn validated(self) -> Result<Self, ConfigError> {
        if self.query.is_empty()
            && self.address.is_empty()
            && self.city.is_empty()
            && self.state.is_empty()
            && self.postal.is_empty()
        {
            return Err(ConfigError::EmptyPlaceQuery);
        }
        Ok(self)
    }

    /// Look up a backend-specific hint by name.
    pub fn hint(&self, name: &str) -> Option<&AttrValue> {
        self.hints.get(name)
    }

    pub fn set_hint(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.hints.insert(name.into(), value.into());
    }

    /// Named attribute access over the textual query parts, used by
    /// preprocessors configured with attribute names.
    pub fn text_attr(&self, name: &str) -> Option<&str> {
        match name {
            "query" => Some(&self.query),
            "address" => Some(&self.address),
            "neighborhood" => Some(&self.neighborhood),
            "city" => Some(&self.city),
            "subregion" => Some(&self.subregion),
            "state" => Some(&self.state),
            "postal" => Some(&self.postal),
            "country" => Some(&self.country),
            _ => None,
        }
    }
}
