//! Query preprocessors: address shaping and screening rules applied before
//! a query reaches any backend.

use regex::Regex;

use super::{Preprocessor, QueryVerdict};
use crate::error::ConfigError;
use crate::models::PlaceQuery;

/// Keep only the first part of an address range or hyphenated house number.
///
/// `4109-4113 Main St` and `4109-13 Main St` both become `4109 Main St`;
/// a bare ZIP+4 like `19127-1112` is untouched. Affects `query` and
/// `address`. Hyphenated Queens-style house numbers lose their cross-street
/// part, which is a known limitation.
#[derive(Debug)]
pub struct ReplaceRangeWithNumber {
    re_street_number: Regex,
}

impl ReplaceRangeWithNumber {
    pub fn new() -> Self {
        Self {
            // Ranges like 789-791, 789-91, 201A-201B, 201A-B
            re_street_number: Regex::new(r"(?i)^(\d+\w*-\d*\w*)\s").expect("valid regex"),
        }
    }

    fn replace_range(&self, addr_str: &str) -> String {
        if let Some(caps) = self.re_street_number.captures(addr_str) {
            let old = caps.get(1).expect("group 1 exists").as_str();
            let new = old.split('-').next().unwrap_or(old);
            return addr_str.replacen(old, new, 1);
        }
        addr_str.to_string()
    }
}

impl Default for ReplaceRangeWithNumber {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for ReplaceRangeWithNumber {
    fn process(&self, mut pq: PlaceQuery) -> QueryVerdict {
        pq.query = self.replace_range(&pq.query);
        pq.address = self.replace_range(&pq.address);
        QueryVerdict::Accept(pq)
    }
}

/// Split a single-line `query` into `address`, `city`, and `postal`.
///
/// Explicitly provided parts are never overwritten. Comma-separated parts
/// that look like secondary units ("Ste 402", "Basement") stay with the
/// address; the rest accumulate into the city.
#[derive(Debug)]
pub struct ParseSingleLine {
    re_unit_numbered: Regex,
    re_unit_not_numbered: Regex,
    re_uk_postcode: Regex,
}

impl ParseSingleLine {
    pub fn new() -> Self {
        Self {
            re_unit_numbered: Regex::new(
                r"(?i)(su?i?te|p\W*[om]\W*b(?:ox)?|(?:ap|dep)(?:ar)?t(?:me?nt)?|ro*m|flo*r?|uni?t|bu?i?ldi?n?g|ha?nga?r|lo?t|pier|slip|spa?ce?|stop|tra?i?le?r|bo?x|no\.?)\s+|#",
            )
            .expect("valid regex"),
            re_unit_not_numbered: Regex::new(
                r"(?i)ba?se?me?n?t|fro?nt|lo?bby|lowe?r|off?i?ce?|pe?n?t?ho?u?s?e?|rear|side|uppe?r",
            )
            .expect("valid regex"),
            re_uk_postcode: Regex::new(r"(?i)[A-Z]{1,2}[0-9R][0-9A-Z]? *[0-9][A-Z]{0,2}")
                .expect("valid regex"),
        }
    }

    fn comma_join(left: &str, right: &str) -> String {
        if left.is_empty() {
            right.to_string()
        } else {
            format!("{}, {}", left, right)
        }
    }
}

impl Default for ParseSingleLine {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for ParseSingleLine {
    fn process(&self, mut pq: PlaceQuery) -> QueryVerdict {
        if pq.query.is_empty() {
            return QueryVerdict::Accept(pq);
        }

        // Take the last postcode-looking token in the line, if any.
        let postcode = self
            .re_uk_postcode
            .find_iter(&pq.query)
            .last()
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        let query_parts: Vec<String> = pq.query.split(',').map(|p| p.trim().to_string()).collect();

        let mut address;
        let mut city = String::new();

        if !postcode.is_empty() && query_parts[0].contains(&postcode) {
            // Postcode inside the first part: probably no commas at all.
            // Use just the piece before it, unless that piece is multi-word
            // (then the "postcode" may really be an apartment number, etc.).
            let part_before_postcode = query_parts[0]
                .split(&postcode)
                .next()
                .unwrap_or("")
                .trim()
                .to_string();
            if !part_before_postcode.contains(char::is_whitespace) {
                address = part_before_postcode;
            } else {
                address = query_parts[0].clone();
            }
        } else {
            address = query_parts[0].clone();
        }

        for part in query_parts.iter().skip(1) {
            let mut part = part.trim().to_string();
            if !postcode.is_empty() && part.contains(&postcode) {
                part = part.replace(&postcode, "").trim().to_string();
            }

            if self.re_unit_numbered.is_match(&part) || self.re_unit_not_numbered.is_match(&part) {
                // Secondary address like "Ste 402" or "Basement".
                address = Self::comma_join(&address, &part);
            } else {
                // Probably a city (or "City, County").
                city = Self::comma_join(&city, &part);
            }
        }

        // Fill in parts only if they weren't already set explicitly.
        if pq.postal.is_empty() {
            pq.postal = postcode;
        }
        if pq.address.is_empty() {
            pq.address = address;
        }
        if pq.city.is_empty() {
            pq.city = city;
        }
        QueryVerdict::Accept(pq)
    }
}

/// Compose address components into a single-line `query` if none is set.
#[derive(Debug, Default)]
pub struct ComposeSingleLine;

impl ComposeSingleLine {
    pub fn new() -> Self {
        Self
    }
}

impl Preprocessor for ComposeSingleLine {
    fn process(&self, mut pq: PlaceQuery) -> QueryVerdict {
        if pq.query.is_empty() {
            let state_postal = [pq.state.as_str(), pq.postal.as_str()]
                .iter()
                .filter(|p| !p.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            let mut parts = vec![
                pq.address.as_str(),
                pq.city.as_str(),
                pq.subregion.as_str(),
                state_postal.as_str(),
            ];
            if !pq.country.is_empty() {
                parts.push(pq.country.as_str());
            }
            pq.query = parts
                .into_iter()
                .filter(|p| !p.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
        }
        QueryVerdict::Accept(pq)
    }
}

/// Standardize country codes and reject countries a backend cannot serve.
///
/// An empty accept list means every country is acceptable; an empty country
/// is always acceptable (use [`RequireCountry`] to demand one).
#[derive(Debug, Default)]
pub struct CountryNormalizer {
    acceptable_countries: Vec<String>,
    country_map: Vec<(String, String)>,
}

impl CountryNormalizer {
    pub fn new(
        acceptable_countries: impl IntoIterator<Item = impl Into<String>>,
        country_map: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            acceptable_countries: acceptable_countries.into_iter().map(Into::into).collect(),
            country_map: country_map
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn accepting(acceptable_countries: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::new(acceptable_countries, Vec::<(String, String)>::new())
    }
}

impl Preprocessor for CountryNormalizer {
    fn process(&self, mut pq: PlaceQuery) -> QueryVerdict {
        // Map the country, but never let the map overwrite an accepted one.
        if !self.acceptable_countries.contains(&pq.country) {
            if let Some((_, mapped)) = self.country_map.iter().find(|(from, _)| *from == pq.country)
            {
                pq.country = mapped.clone();
            }
        }
        if !pq.country.is_empty()
            && !self.acceptable_countries.is_empty()
            && !self.acceptable_countries.contains(&pq.country)
        {
            return QueryVerdict::Reject;
        }
        QueryVerdict::Accept(pq)
    }
}

/// Reject queries without a country, or fill in a configured default.
#[derive(Debug, Default)]
pub struct RequireCountry {
    default_country: String,
}

impl RequireCountry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(default_country: impl Into<String>) -> Self {
        Self {
            default_country: default_country.into(),
        }
    }
}

impl Preprocessor for RequireCountry {
    fn process(&self, mut pq: PlaceQuery) -> QueryVerdict {
        if pq.country.trim().is_empty() {
            if self.default_country.is_empty() {
                return QueryVerdict::Reject;
            }
            pq.country = self.default_country.clone();
        }
        QueryVerdict::Accept(pq)
    }
}

/// Reject a query when a regex matches at the start of any of the named
/// query attributes. Attributes missing from the query are skipped.
#[derive(Debug)]
pub struct CancelIfRegexInAttr {
    regex: Regex,
    attrs: Vec<String>,
}

impl CancelIfRegexInAttr {
    pub fn new(
        pattern: &str,
        attrs: impl IntoIterator<Item = impl Into<String>>,
        ignorecase: bool,
    ) -> Result<Self, ConfigError> {
        let flags = if ignorecase { "(?i)" } else { "" };
        // Anchored: the unwanted pattern must appear at the attribute start.
        let regex = Regex::new(&format!("{}^(?:{})", flags, pattern))
            .map_err(|e| ConfigError::InvalidProcessor(e.to_string()))?;
        Ok(Self {
            regex,
            attrs: attrs.into_iter().map(Into::into).collect(),
        })
    }
}

impl Preprocessor for CancelIfRegexInAttr {
    fn process(&self, pq: PlaceQuery) -> QueryVerdict {
        for attr in &self.attrs {
            if let Some(value) = pq.text_attr(attr) {
                if self.regex.is_match(value) {
                    return QueryVerdict::Reject;
                }
            }
        }
        QueryVerdict::Accept(pq)
    }
}

/// Reject addresses that start with any variation of "PO Box".
#[derive(Debug)]
pub struct CancelIfPoBox {
    inner: CancelIfRegexInAttr,
}

impl CancelIfPoBox {
    pub fn new() -> Self {
        let regex = r"\s*P\.?\s*O\.?\s*B\.?O?X?[\s\d]";
        Self {
            inner: CancelIfRegexInAttr::new(regex, ["address", "query"], true)
                .expect("valid regex"),
        }
    }
}

impl Default for CancelIfPoBox {
    fn default() -> Self {
        Self::new()
    }
}

impl Preprocessor for CancelIfPoBox {
    fn process(&self, pq: PlaceQuery) -> QueryVerdict {
        self.inner.process(pq)
    }
}
