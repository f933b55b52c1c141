//! Candidate postprocessors: the reusable primitives that filter, rename,
//! sort, group, and deduplicate candidates returned by backends.
//!
//! Several primitives carry deliberately preserved quirks of the system's
//! long-standing behavior; see [`SnapPoints`] and [`DupePicker`] in
//! particular before "fixing" anything here.

use std::cmp::Ordering;

use super::Postprocessor;
use crate::models::{AttrValue, Candidate};

/// Keep only candidates whose attribute matches one of the good values.
///
/// With `exact_match` unset, the attribute matches when a good value occurs
/// within it (so a `US_Rooftop` locator passes a `Rooftop` filter).
#[derive(Debug)]
pub struct AttrFilter {
    good_values: Vec<AttrValue>,
    attr: String,
    exact_match: bool,
}

impl AttrFilter {
    pub fn new(
        good_values: impl IntoIterator<Item = impl Into<AttrValue>>,
        attr: impl Into<String>,
    ) -> Self {
        Self {
            good_values: good_values.into_iter().map(Into::into).collect(),
            attr: attr.into(),
            exact_match: true,
        }
    }

    pub fn inexact(mut self) -> Self {
        self.exact_match = false;
        self
    }
}

impl Postprocessor for AttrFilter {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| match c.attr(&self.attr) {
                Some(value) => self
                    .good_values
                    .iter()
                    .any(|gv| value.matches(gv, self.exact_match)),
                None => false,
            })
            .collect()
    }
}

/// Drop candidates whose attribute matches one of the bad values.
#[derive(Debug)]
pub struct AttrExclude {
    bad_values: Vec<AttrValue>,
    attr: String,
    exact_match: bool,
}

impl AttrExclude {
    pub fn new(
        bad_values: impl IntoIterator<Item = impl Into<AttrValue>>,
        attr: impl Into<String>,
    ) -> Self {
        Self {
            bad_values: bad_values.into_iter().map(Into::into).collect(),
            attr: attr.into(),
            exact_match: true,
        }
    }

    pub fn inexact(mut self) -> Self {
        self.exact_match = false;
        self
    }
}

impl Postprocessor for AttrExclude {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .filter(|c| match c.attr(&self.attr) {
                Some(value) => !self
                    .bad_values
                    .iter()
                    .any(|bv| value.matches(bv, self.exact_match)),
                None => true,
            })
            .collect()
    }
}

/// Rename an attribute's value through an ordered map of old to new values.
///
/// The first map key that equals the attribute value (or, with
/// `exact_match` unset, occurs within it) wins; candidates with no matching
/// key pass through unmodified.
#[derive(Debug)]
pub struct AttrRename {
    attr: String,
    attr_map: Vec<(String, String)>,
    exact_match: bool,
    case_sensitive: bool,
}

impl AttrRename {
    pub fn new(
        attr: impl Into<String>,
        attr_map: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            attr: attr.into(),
            attr_map: attr_map
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            exact_match: false,
            case_sensitive: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact_match = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

fn map_value(
    current: &str,
    attr_map: &[(String, String)],
    exact_match: bool,
    case_sensitive: bool,
) -> Option<String> {
    let cc = |s: &str| {
        if case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    };
    let current = cc(current);
    attr_map
        .iter()
        .find(|(k, _)| {
            let k = cc(k);
            if exact_match {
                current == k
            } else {
                current.contains(&k)
            }
        })
        .map(|(_, v)| v.clone())
}

impl Postprocessor for AttrRename {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .map(|mut c| {
                if let Some(AttrValue::Text(current)) = c.attr(&self.attr) {
                    if let Some(new) =
                        map_value(&current, &self.attr_map, self.exact_match, self.case_sensitive)
                    {
                        c.set_attr(&self.attr, AttrValue::Text(new));
                    }
                }
                c
            })
            .collect()
    }
}

/// Like [`AttrRename`], but reads one attribute and writes another.
#[derive(Debug)]
pub struct AttrMigrator {
    attr_from: String,
    attr_to: String,
    attr_map: Vec<(String, String)>,
    exact_match: bool,
    case_sensitive: bool,
}

impl AttrMigrator {
    pub fn new(
        attr_from: impl Into<String>,
        attr_to: impl Into<String>,
        attr_map: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        Self {
            attr_from: attr_from.into(),
            attr_to: attr_to.into(),
            attr_map: attr_map
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            exact_match: false,
            case_sensitive: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact_match = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.case_sensitive = true;
        self
    }
}

impl Postprocessor for AttrMigrator {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates
            .into_iter()
            .map(|mut c| {
                if let Some(AttrValue::Text(from)) = c.attr(&self.attr_from) {
                    if let Some(new) =
                        map_value(&from, &self.attr_map, self.exact_match, self.case_sensitive)
                    {
                        c.set_attr(&self.attr_to, AttrValue::Text(new));
                    }
                }
                c
            })
            .collect()
    }
}

/// Stably partition candidates into the order given by `ordered_values`.
///
/// Each value's bucket preserves input order; candidates whose attribute is
/// absent from the list trail at the end in their original relative order.
#[derive(Debug)]
pub struct AttrSorter {
    ordered_values: Vec<AttrValue>,
    attr: String,
}

impl AttrSorter {
    pub fn new(
        ordered_values: impl IntoIterator<Item = impl Into<AttrValue>>,
        attr: impl Into<String>,
    ) -> Self {
        Self {
            ordered_values: ordered_values.into_iter().map(Into::into).collect(),
            attr: attr.into(),
        }
    }
}

impl Postprocessor for AttrSorter {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut remaining = candidates;
        let mut ordered = Vec::with_capacity(remaining.len());
        for value in &self.ordered_values {
            let mut i = 0;
            while i < remaining.len() {
                if remaining[i].attr(&self.attr).as_ref() == Some(value) {
                    ordered.push(remaining.remove(i));
                } else {
                    i += 1;
                }
            }
        }
        ordered.extend(remaining);
        ordered
    }
}

/// [`AttrSorter`] over the reverse of the given list, for callers that
/// already hold a worst-to-best ordering.
#[derive(Debug)]
pub struct AttrReverseSorter {
    ordered_values: Vec<AttrValue>,
    attr: String,
}

impl AttrReverseSorter {
    pub fn new(
        ordered_values: impl IntoIterator<Item = impl Into<AttrValue>>,
        attr: impl Into<String>,
    ) -> Self {
        Self {
            ordered_values: ordered_values.into_iter().map(Into::into).collect(),
            attr: attr.into(),
        }
    }
}

impl Postprocessor for AttrReverseSorter {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let reversed: Vec<AttrValue> = self.ordered_values.iter().rev().cloned().collect();
        AttrSorter::new(reversed, self.attr.clone()).process(candidates)
    }
}

/// Stable sort by score, descending by default.
#[derive(Debug)]
pub struct ScoreSorter {
    descending: bool,
}

impl ScoreSorter {
    pub fn new() -> Self {
        Self { descending: true }
    }

    pub fn ascending() -> Self {
        Self { descending: false }
    }
}

impl Default for ScoreSorter {
    fn default() -> Self {
        Self::new()
    }
}

impl Postprocessor for ScoreSorter {
    fn process(&self, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| {
            let ord = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });
        candidates
    }
}

/// Keep only candidates scoring at least `min_score`, if and only if at
/// least one does; otherwise the input passes through unchanged. This
/// filter never empties a non-empty result.
#[derive(Debug)]
pub struct UseHighScoreIfAtLeast {
    min_score: f64,
}

impl UseHighScoreIfAtLeast {
    pub fn new(min_score: f64) -> Self {
        Self { min_score }
    }
}

impl Postprocessor for UseHighScoreIfAtLeast {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let high: Vec<Candidate> = candidates
            .iter()
            .filter(|c| c.score >= self.min_score)
            .cloned()
            .collect();
        if high.is_empty() {
            candidates
        } else {
            high
        }
    }
}

/// Keep the first candidate of each equivalence class under equality of the
/// given attribute. Sort meaningfully first: "first" decides the survivor.
#[derive(Debug)]
pub struct GroupBy {
    attr: String,
}

impl GroupBy {
    pub fn new(attr: impl Into<String>) -> Self {
        Self { attr: attr.into() }
    }
}

impl Postprocessor for GroupBy {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        GroupByMultiple::new([self.attr.clone()]).process(candidates)
    }
}

/// [`GroupBy`] over a tuple of attributes: all must match for two
/// candidates to share a class.
#[derive(Debug)]
pub struct GroupByMultiple {
    attrs: Vec<String>,
}

impl GroupByMultiple {
    pub fn new(attrs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            attrs: attrs.into_iter().map(Into::into).collect(),
        }
    }
}

impl Postprocessor for GroupByMultiple {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut keepers = Vec::new();
        let mut remaining = candidates;
        while !remaining.is_empty() {
            let anchor = remaining[0].clone();
            let (matches, rest): (Vec<Candidate>, Vec<Candidate>) =
                remaining.into_iter().partition(|c| {
                    self.attrs
                        .iter()
                        .all(|attr| c.attr(attr) == anchor.attr(attr))
                });
            if let Some(first) = matches.into_iter().next() {
                keepers.push(first);
            }
            remaining = rest;
        }
        keepers
    }
}

/// Sphere radius used for great-circle distances, in meters.
const EARTH_RADIUS_M: f64 = 6_356_752.0;

/// Collapse candidates that sit within `distance` meters of each other,
/// keeping the first of each cluster.
///
/// Greedy: each pass anchors on the first remaining candidate and removes
/// everything within range of that anchor. This is direct-neighbor
/// clustering, not transitive closure; two candidates both near a third but
/// not near each other can land in different clusters depending on
/// iteration order. Downstream behavior depends on exactly this, so keep it.
#[derive(Debug)]
pub struct SnapPoints {
    distance: f64,
}

impl SnapPoints {
    pub fn new(distance: f64) -> Self {
        Self { distance }
    }

    /// Great-circle distance in meters between two candidates, reading
    /// `x` as longitude and `y` as latitude.
    fn distance_m(a: &Candidate, b: &Candidate) -> f64 {
        let lat1 = a.y.to_radians();
        let lat2 = b.y.to_radians();
        let dlat = (b.y - a.y).to_radians();
        let dlon = (b.x - a.x).to_radians();
        let h = (dlat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
        EARTH_RADIUS_M * c
    }
}

impl Default for SnapPoints {
    fn default() -> Self {
        Self { distance: 50.0 }
    }
}

impl Postprocessor for SnapPoints {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut keepers = Vec::new();
        let mut remaining = candidates;
        while !remaining.is_empty() {
            let anchor = remaining[0].clone();
            let (matches, rest): (Vec<Candidate>, Vec<Candidate>) = remaining
                .into_iter()
                .partition(|c| Self::distance_m(&anchor, c) <= self.distance);
            if let Some(first) = matches.into_iter().next() {
                keepers.push(first);
            }
            remaining = rest;
        }
        keepers
    }
}

/// Resolve near-duplicates among the highest-scoring candidates.
///
/// Two candidates count as duplicates when their `attr_dupes` values match
/// after case folding and comma stripping. For every candidate carrying the
/// maximum score, its duplicate group (drawn from the *whole* input) is
/// sorted by `attr_sort` against `ordered_list`, and the members sharing
/// the top sortee's `attr_dupes` value survive.
///
/// Worked example, with `attr_dupes="match_addr"`, `attr_sort="locator"`,
/// `ordered_list=["roof", "address_point", "address_range"]`:
///
/// ```text
/// match_addr       score locator        match_addr       score locator
/// --------------   ----- -------        --------------   ----- -------
/// 123 N Wood St    90    roof       =>  123 N Wood St    90    roof
/// 123 S Wood St    90    address        123, S Wood ST   85    roof
/// 123 N WOOD ST    77    address
/// 123, S Wood ST   85    roof
/// ```
///
/// The first two score highest, but the second's location is less precise
/// than the fourth's, and the two share an address; the fourth wins the
/// group despite its lower score.
///
/// The outer loop may revisit a duplicate group once per high-scoring
/// member in it; the already-present check makes the revisit harmless, and
/// the emitted output is what matters.
#[derive(Debug)]
pub struct DupePicker {
    attr_dupes: String,
    attr_sort: String,
    ordered_list: Vec<AttrValue>,
    return_clean: bool,
}

impl DupePicker {
    pub fn new(
        attr_dupes: impl Into<String>,
        attr_sort: impl Into<String>,
        ordered_list: impl IntoIterator<Item = impl Into<AttrValue>>,
    ) -> Self {
        Self {
            attr_dupes: attr_dupes.into(),
            attr_sort: attr_sort.into(),
            ordered_list: ordered_list.into_iter().map(Into::into).collect(),
            return_clean: false,
        }
    }

    /// Homogenize the dedup attribute of emitted candidates into uppercase
    /// without commas.
    pub fn return_clean(mut self) -> Self {
        self.return_clean = true;
        self
    }

    /// Dedup key: uppercase, commas stripped. Numbers pass through.
    fn cleanup(value: &AttrValue) -> AttrValue {
        match value {
            AttrValue::Text(s) => AttrValue::Text(s.replace(',', "").to_uppercase()),
            AttrValue::Number(n) => AttrValue::Number(*n),
        }
    }
}

impl Postprocessor for DupePicker {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if candidates.is_empty() {
            return candidates;
        }
        let hi_score = candidates
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        let hi_score_candidates = AttrFilter::new([hi_score], "score").process(candidates.clone());

        let mut new_candidates: Vec<Candidate> = Vec::new();
        for hsc in &hi_score_candidates {
            let Some(test_val) = hsc.attr(&self.attr_dupes).map(|v| Self::cleanup(&v)) else {
                continue;
            };
            // Everything in the original input with essentially the same
            // value (123 Main and 123, MAIN match).
            let matching: Vec<Candidate> = candidates
                .iter()
                .filter(|mc| {
                    mc.attr(&self.attr_dupes)
                        .map(|v| Self::cleanup(&v) == test_val)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            // Sort so the first has the most desirable sort attribute, then
            // keep every member sharing the top value (ties included).
            let matching = AttrSorter::new(self.ordered_list.clone(), self.attr_sort.clone())
                .process(matching);
            let Some(best_value) = matching.first().and_then(|m| m.attr(&self.attr_dupes)) else {
                continue;
            };
            let queue = AttrFilter::new([best_value], self.attr_dupes.clone()).process(matching);
            for mut nc in queue {
                if self.return_clean {
                    if let Some(v) = nc.attr(&self.attr_dupes) {
                        nc.set_attr(&self.attr_dupes, Self::cleanup(&v));
                    }
                }
                if !new_candidates.contains(&nc) {
                    new_candidates.push(nc);
                }
            }
        }
        new_candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(match_addr: &str, locator: &str, score: f64) -> Candidate {
        Candidate {
            match_addr: match_addr.to_string(),
            locator: locator.to_string(),
            score,
            ..Default::default()
        }
    }

    /// Fixtures shared across tests: three results for one address at
    /// varying precision, two for another.
    fn fixtures() -> (Candidate, Candidate, Candidate, Candidate, Candidate) {
        let good = candidate("123 Any St", "address", 85.3);
        let better = candidate("123 Any St", "parcel", 92.0);
        let best = candidate("123 Any St", "rooftop", 100.0);
        let wolf_good = candidate("1200 Callowhill St", "address", 76.0);
        let wolf_best = candidate("1200 Callowhill St", "rooftop", 90.0);
        (good, better, best, wolf_good, wolf_best)
    }

    #[test]
    fn test_attr_filter_exact() {
        let (good, better, best, _, _) = fixtures();
        let out = AttrFilter::new(["roof", "parcel"], "locator").process(vec![
            best.clone(),
            good.clone(),
            better.clone(),
        ]);
        assert_eq!(out, vec![better]);
    }

    #[test]
    fn test_attr_filter_inexact() {
        let (good, better, best, _, _) = fixtures();
        // roof is a substring of rooftop
        let out = AttrFilter::new(["roof", "parcel"], "locator")
            .inexact()
            .process(vec![best.clone(), good.clone(), better.clone()]);
        assert_eq!(out, vec![best, better]);
    }

    #[test]
    fn test_attr_exclude_exact() {
        let (good, better, best, _, _) = fixtures();
        // parcel survives: "parc" is not an exact match for it
        let out = AttrExclude::new(["address", "parc"], "locator").process(vec![
            best.clone(),
            good.clone(),
            better.clone(),
        ]);
        assert_eq!(out, vec![best, better]);
    }

    #[test]
    fn test_attr_exclude_inexact() {
        let (good, better, best, _, _) = fixtures();
        let out = AttrExclude::new(["address", "parc"], "locator")
            .inexact()
            .process(vec![best.clone(), good.clone(), better.clone()]);
        assert_eq!(out, vec![best]);
    }

    #[test]
    fn test_attr_rename_inexact() {
        let (_, _, best, _, _) = fixtures();
        let out = AttrRename::new("locator", [("oofto", "el_techo")]).process(vec![best]);
        assert_eq!(out[0].locator, "el_techo");
    }

    #[test]
    fn test_attr_rename_exact() {
        let (_, _, best, _, _) = fixtures();
        let out = AttrRename::new("locator", [("rooftop", "el_techo")])
            .exact()
            .process(vec![best]);
        assert_eq!(out[0].locator, "el_techo");
    }

    #[test]
    fn test_attr_rename_no_match_passthrough() {
        let (good, _, _, _, _) = fixtures();
        let out = AttrRename::new("locator", [("rooftop", "el_techo")])
            .exact()
            .process(vec![good.clone()]);
        assert_eq!(out, vec![good]);
    }

    #[test]
    fn test_attr_migrator() {
        let (_, _, best, _, _) = fixtures();
        let out = AttrMigrator::new("locator", "precision", [("rooftop", "high")])
            .process(vec![best]);
        assert_eq!(out[0].attr("precision"), Some(AttrValue::from("high")));
        assert_eq!(out[0].locator, "rooftop");
    }

    #[test]
    fn test_attr_migrator_exact() {
        let (_, _, best, _, _) = fixtures();
        // "oofto" is only a substring of rooftop, so no migration.
        let out = AttrMigrator::new("locator", "precision", [("oofto", "high")])
            .exact()
            .process(vec![best.clone()]);
        assert_eq!(out[0].attr("precision"), None);

        let out = AttrMigrator::new("locator", "precision", [("rooftop", "high")])
            .exact()
            .process(vec![best]);
        assert_eq!(out[0].attr("precision"), Some(AttrValue::from("high")));
    }

    #[test]
    fn test_attr_migrator_case_sensitive() {
        let (_, _, best, _, _) = fixtures();
        let out = AttrMigrator::new("locator", "precision", [("ROOFTOP", "high")])
            .case_sensitive()
            .process(vec![best.clone()]);
        assert_eq!(out[0].attr("precision"), None);

        let out = AttrMigrator::new("locator", "precision", [("ROOFTOP", "high")])
            .process(vec![best]);
        assert_eq!(out[0].attr("precision"), Some(AttrValue::from("high")));
    }

    #[test]
    fn test_attr_sorter() {
        let (good, better, best, _, _) = fixtures();
        let out = AttrSorter::new(["address", "parcel", "rooftop"], "locator").process(vec![
            better.clone(),
            best.clone(),
            good.clone(),
        ]);
        assert_eq!(out, vec![good, better, best]);
    }

    #[test]
    fn test_attr_sorter_unlisted_values_trail() {
        let (good, better, best, _, _) = fixtures();
        let out = AttrSorter::new(["rooftop"], "locator").process(vec![
            better.clone(),
            best.clone(),
            good.clone(),
        ]);
        assert_eq!(out, vec![best, better, good]);
    }

    #[test]
    fn test_attr_reverse_sorter() {
        let (good, better, best, _, _) = fixtures();
        let out = AttrReverseSorter::new(["address", "parcel", "rooftop"], "locator").process(
            vec![better.clone(), best.clone(), good.clone()],
        );
        assert_eq!(out, vec![best, better, good]);
    }

    #[test]
    fn test_score_sorter() {
        let (good, better, best, _, _) = fixtures();
        let out = ScoreSorter::new().process(vec![best.clone(), good.clone(), better.clone()]);
        assert_eq!(out, vec![best, better, good]);
    }

    #[test]
    fn test_score_sorter_ascending() {
        let (good, better, best, _, _) = fixtures();
        let out =
            ScoreSorter::ascending().process(vec![best.clone(), good.clone(), better.clone()]);
        assert_eq!(out, vec![good, better, best]);
    }

    #[test]
    fn test_use_high_score_if_at_least() {
        let (good, better, best, _, _) = fixtures();
        let out = UseHighScoreIfAtLeast::new(90.0).process(vec![
            best.clone(),
            good.clone(),
            better.clone(),
        ]);
        assert_eq!(out, vec![best, better]);
    }

    #[test]
    fn test_use_high_score_identity_fallback() {
        let (good, better, best, _, _) = fixtures();
        let input = vec![best, good, better];
        let out = UseHighScoreIfAtLeast::new(101.0).process(input.clone());
        assert_eq!(out, input);
    }

    #[test]
    fn test_group_by() {
        let (good, better, best, wolf_good, wolf_best) = fixtures();
        let out = GroupBy::new("match_addr").process(vec![
            best.clone(),
            good,
            better,
            wolf_best.clone(),
            wolf_good,
        ]);
        assert_eq!(out, vec![best, wolf_best]);
    }

    #[test]
    fn test_group_by_multiple_xy() {
        let a = Candidate {
            x: -75.16,
            y: 39.95,
            locator: "rooftop".to_string(),
            ..Default::default()
        };
        let b = Candidate {
            x: -75.16,
            y: 39.95,
            locator: "parcel".to_string(),
            ..Default::default()
        };
        let out = GroupByMultiple::new(["x", "y"]).process(vec![a.clone(), b]);
        assert_eq!(out, vec![a]);
    }

    #[test]
    fn test_snap_points_within_50m() {
        let first = Candidate {
            match_addr: "340 N 12th St, Philadelphia, PA, 19107".to_string(),
            x: -75.158433167,
            y: 39.958727992,
            ..Default::default()
        };
        // about 40m away
        let second = Candidate {
            match_addr: "1200 Callowhill St, Philadelphia, PA, 19123".to_string(),
            x: -75.158303781,
            y: 39.959040684,
            ..Default::default()
        };
        let out = SnapPoints::default().process(vec![first.clone(), second]);
        assert_eq!(out, vec![first]);
    }

    #[test]
    fn test_snap_points_keeps_distant_points() {
        let phl = Candidate {
            x: -75.16,
            y: 39.95,
            ..Default::default()
        };
        let nyc = Candidate {
            x: -74.00,
            y: 40.71,
            ..Default::default()
        };
        let out = SnapPoints::default().process(vec![phl.clone(), nyc.clone()]);
        assert_eq!(out, vec![phl, nyc]);
    }

    #[test]
    fn test_snap_points_is_not_transitive() {
        // b is within range of both a and c, but a and c are ~80m apart.
        // The greedy pass anchored on a must leave c in its own cluster.
        let a = Candidate {
            x: -75.1600,
            y: 39.9500,
            ..Default::default()
        };
        let b = Candidate {
            x: -75.1600,
            y: 39.95036,
            ..Default::default()
        };
        let c = Candidate {
            x: -75.1600,
            y: 39.95072,
            ..Default::default()
        };
        let out = SnapPoints::default().process(vec![a.clone(), b, c.clone()]);
        assert_eq!(out, vec![a, c]);
    }

    #[test]
    fn test_dupe_picker_worked_example() {
        let input = vec![
            candidate("123 N Wood St", "roof", 90.0),
            candidate("123 S Wood St", "address", 90.0),
            candidate("123 N WOOD ST", "address", 77.0),
            candidate("123, S Wood ST", "roof", 85.0),
        ];
        let dp = DupePicker::new(
            "match_addr",
            "locator",
            ["roof", "rooftop", "address_point", "address_range"],
        );
        let out = dp.process(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].match_addr, "123 N Wood St");
        assert_eq!(out[0].locator, "roof");
        assert_eq!(out[0].score, 90.0);
        assert_eq!(out[1].match_addr, "123, S Wood ST");
        assert_eq!(out[1].locator, "roof");
        assert_eq!(out[1].score, 85.0);
    }

    #[test]
    fn test_dupe_picker_return_clean() {
        let input = vec![
            candidate("123 N Wood St", "roof", 90.0),
            candidate("123 S Wood St", "address", 90.0),
            candidate("123 N WOOD ST", "address", 77.0),
            candidate("123, S Wood ST", "roof", 85.0),
        ];
        let dp = DupePicker::new(
            "match_addr",
            "locator",
            ["roof", "rooftop", "address_point", "address_range"],
        )
        .return_clean();
        let out = dp.process(input);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].match_addr, "123 N WOOD ST");
        assert_eq!(out[1].match_addr, "123 S WOOD ST");
    }

    #[test]
    fn test_dupe_picker_empty_input() {
        let dp = DupePicker::new("match_addr", "locator", ["rooftop"]);
        assert!(dp.process(Vec::new()).is_empty());
    }

    #[test]
    fn test_dupe_picker_ties_kept() {
        // Two identical addresses both carrying the preferred locator and
        // the same raw value survive as one; distinct raw spellings with
        // the same dedup key keep only the sorted group's top spelling.
        let input = vec![
            candidate("500 Pine St", "rooftop", 95.0),
            candidate("500 PINE ST", "address", 95.0),
        ];
        let dp = DupePicker::new("match_addr", "locator", ["rooftop", "address"]);
        let out = dp.process(input);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].locator, "rooftop");
    }
}
