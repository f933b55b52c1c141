//! Candidate results and dynamic attribute access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A dynamically-typed attribute value on a [`Candidate`] or query hint.
///
/// Postprocessors are configured with attribute *names*, so they need one
/// value type covering both the textual fields (locator, match_addr, ...)
/// and the numeric ones (score, coordinates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            AttrValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(_) => None,
        }
    }

    /// Equality or substring match against `value`.
    ///
    /// Exact matching compares values of the same variant. Inexact matching
    /// is only meaningful for text and asks whether `value` occurs within
    /// this attribute (so a `US_Rooftop` locator matches a `Rooftop` filter
    /// value); numbers always compare exactly.
    pub fn matches(&self, value: &AttrValue, exact: bool) -> bool {
        match (self, value) {
            (AttrValue::Text(a), AttrValue::Text(v)) => {
                if exact {
                    a == v
                } else {
                    a.contains(v.as_str())
                }
            }
            (AttrValue::Number(a), AttrValue::Number(v)) => a == v,
            _ => false,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

/// One geocoder result.
///
/// Created exclusively by a backend from one provider response and then
/// owned by whichever pipeline stage is currently processing it. `locator`
/// is the normalized precision tag (`rooftop`, `interpolation`,
/// `postal_specific`, `postal`); `score` is conventionally 0-100 with
/// higher better, on the contributing backend's scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub locator: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub match_addr: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_wkid")]
    pub wkid: i32,
    /// Name of the backend that produced this candidate.
    #[serde(default)]
    pub geoservice: String,
    /// Backend-specific fields (`entity`, `locator_type`, `match_city`,
    /// `match_region`, ...), reachable through [`Candidate::attr`] just like
    /// the declared fields.
    #[serde(flatten)]
    pub extras: BTreeMap<String, AttrValue>,
}

fn default_wkid() -> i32 {
    4326
}

impl Default for Candidate {
    fn default() -> Self {
        Self {
            locator: String::new(),
            score: 0.0,
            match_addr: String::new(),
            x: 0.0,
            y: 0.0,
            wkid: 4326,
            geoservice: String::new(),
            extras: BTreeMap::new(),
        }
    }
}

impl Candidate {
    /// Read an attribute by name, covering declared fields and extras.
    pub fn attr(&self, name: &str) -> Option<AttrValue> {
        match name {
            "locator" => Some(AttrValue::Text(self.locator.clone())),
            "score" => Some(AttrValue::Number(self.score)),
            "match_addr" => Some(AttrValue::Text(self.match_addr.clone())),
            "x" => Some(AttrValue::Number(self.x)),
            "y" => Some(AttrValue::Number(self.y)),
            "wkid" => Some(AttrValue::Number(f64::from(self.wkid))),
            "geoservice" => Some(AttrValue::Text(self.geoservice.clone())),
            other => self.extras.get(other).cloned(),
        }
    }

    /// Write an attribute by name. Writes to a declared field with a value
    /// of the wrong variant are ignored rather than corrupting the field.
    pub fn set_attr(&mut self, name: &str, value: AttrValue) {
        match (name, value) {
            ("locator", AttrValue::Text(s)) => self.locator = s,
            ("score", AttrValue::Number(n)) => self.score = n,
            ("match_addr", AttrValue::Text(s)) => self.match_addr = s,
            ("x", AttrValue::Number(n)) => self.x = n,
            ("y", AttrValue::Number(n)) => self.y = n,
            ("wkid", AttrValue::Number(n)) => self.wkid = n as i32,
            ("geoservice", AttrValue::Text(s)) => self.geoservice = s,
            ("locator" | "score" | "match_addr" | "x" | "y" | "wkid" | "geoservice", _) => {}
            (other, value) => {
                self.extras.insert(other.to_string(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attr_access_declared_and_extras() {
        let mut c = Candidate {
            locator: "rooftop".to_string(),
            score: 91.5,
            match_addr: "340 N 12th St, Philadelphia, PA, 19107".to_string(),
            x: -75.16,
            y: 39.95,
            ..Default::default()
        };
        c.set_attr("entity", AttrValue::from("place.house"));

        assert_eq!(c.attr("locator"), Some(AttrValue::from("rooftop")));
        assert_eq!(c.attr("score"), Some(AttrValue::Number(91.5)));
        assert_eq!(c.attr("entity"), Some(AttrValue::from("place.house")));
        assert_eq!(c.attr("match_city"), None);
    }

    #[test]
    fn test_set_attr_wrong_variant_ignored() {
        let mut c = Candidate {
            score: 85.0,
            ..Default::default()
        };
        c.set_attr("score", AttrValue::from("not a number"));
        assert_eq!(c.score, 85.0);
    }

    #[test]
    fn test_attr_value_matching() {
        let locator = AttrValue::from("US_Rooftop");
        assert!(locator.matches(&AttrValue::from("Rooftop"), false));
        assert!(!locator.matches(&AttrValue::from("Rooftop"), true));
        assert!(AttrValue::Number(90.0).matches(&AttrValue::Number(90.0), true));
        assert!(!locator.matches(&AttrValue::Number(90.0), false));
    }
}
