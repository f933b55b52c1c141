//! TOML configuration for assembling a [`Geocoder`].
//!
//! Processor specs are `{ kind = "...", ...options }` tables. Options a
//! processor does not consume are kept on a wrapper rather than rejected,
//! so deployment-specific annotations survive a round trip through the
//! builder.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::geocoder::Geocoder;
use crate::models::{Candidate, PlaceQuery};
use crate::processors::postprocessors::{
    AttrExclude, AttrFilter, AttrMigrator, AttrRename, AttrReverseSorter, AttrSorter, DupePicker,
    GroupBy, GroupByMultiple, ScoreSorter, SnapPoints, UseHighScoreIfAtLeast,
};
use crate::processors::preprocessors::{
    CancelIfPoBox, CancelIfRegexInAttr, ComposeSingleLine, CountryNormalizer, ParseSingleLine,
    ReplaceRangeWithNumber, RequireCountry,
};
use crate::processors::{Postprocessor, Preprocessor, QueryVerdict};
use crate::services::{Adapter, Backend, BackendSettings, EsriWgs, Nominatim, UsCensus};
use crate::stats::{LogStatsSink, WebhookStatsSink};

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
    #[serde(default)]
    pub waterfall: bool,
    #[serde(default)]
    pub strict_stats: bool,
    /// Universal chains, applied before and after all adapters.
    #[serde(default)]
    pub preprocessors: Vec<ProcessorSpec>,
    pub postprocessors: Option<Vec<ProcessorSpec>>,
    pub adapters: Vec<AdapterConfig>,
    pub stats: Option<StatsConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AdapterConfig {
    /// One of `esri_wgs`, `nominatim`, `us_census`.
    pub backend: String,
    /// Chain overrides; omitting one keeps the backend's defaults.
    pub preprocessors: Option<Vec<ProcessorSpec>>,
    pub postprocessors: Option<Vec<ProcessorSpec>>,
    #[serde(flatten)]
    pub settings: BackendSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsConfig {
    /// POST records here; without it, records go to the log.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessorSpec {
    pub kind: String,
    #[serde(flatten)]
    pub options: BTreeMap<String, toml::Value>,
}

/// A preprocessor built from configuration, carrying the options its kind
/// did not consume.
#[derive(Debug)]
pub struct ConfiguredPreprocessor {
    inner: Box<dyn Preprocessor>,
    extras: BTreeMap<String, toml::Value>,
}

impl ConfiguredPreprocessor {
    pub fn extras(&self) -> &BTreeMap<String, toml::Value> {
        &self.extras
    }
}

impl Preprocessor for ConfiguredPreprocessor {
    fn process(&self, pq: PlaceQuery) -> QueryVerdict {
        self.inner.process(pq)
    }
}

/// Postprocessor counterpart of [`ConfiguredPreprocessor`].
#[derive(Debug)]
pub struct ConfiguredPostprocessor {
    inner: Box<dyn Postprocessor>,
    extras: BTreeMap<String, toml::Value>,
}

impl ConfiguredPostprocessor {
    pub fn extras(&self) -> &BTreeMap<String, toml::Value> {
        &self.extras
    }
}

impl Postprocessor for ConfiguredPostprocessor {
    fn process(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        self.inner.process(candidates)
    }
}

/// Typed option extraction from a processor spec's flattened table.
/// Consumed keys are removed; whatever remains becomes the wrapper extras.
struct Options {
    kind: String,
    table: BTreeMap<String, toml::Value>,
}

impl Options {
    fn new(spec: &ProcessorSpec) -> Self {
        Self {
            kind: spec.kind.clone(),
            table: spec.options.clone(),
        }
    }

    fn invalid(&self, key: &str, expected: &str) -> ConfigError {
        ConfigError::InvalidProcessor(format!(
            "{}: option `{}` must be {}",
            self.kind, key, expected
        ))
    }

    fn missing(&self, key: &str) -> ConfigError {
        ConfigError::InvalidProcessor(format!("{}: missing required option `{}`", self.kind, key))
    }

    fn take_str(&mut self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.table.remove(key) {
            None => Ok(None),
            Some(toml::Value::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.invalid(key, "a string")),
        }
    }

    fn require_str(&mut self, key: &str) -> Result<String, ConfigError> {
        self.take_str(key)?.ok_or_else(|| self.missing(key))
    }

    fn take_bool(&mut self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.table.remove(key) {
            None => Ok(default),
            Some(toml::Value::Boolean(b)) => Ok(b),
            Some(_) => Err(self.invalid(key, "a boolean")),
        }
    }

    fn take_f64(&mut self, key: &str) -> Result<Option<f64>, ConfigError> {
        match self.table.remove(key) {
            None => Ok(None),
            Some(toml::Value::Float(f)) => Ok(Some(f)),
            Some(toml::Value::Integer(i)) => Ok(Some(i as f64)),
            Some(_) => Err(self.invalid(key, "a number")),
        }
    }

    fn require_f64(&mut self, key: &str) -> Result<f64, ConfigError> {
        self.take_f64(key)?.ok_or_else(|| self.missing(key))
    }

    fn take_str_list(&mut self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.table.remove(key) {
            None => Ok(None),
            Some(toml::Value::Array(values)) => values
                .into_iter()
                .map(|v| match v {
                    toml::Value::String(s) => Ok(s),
                    _ => Err(self.invalid(key, "an array of strings")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.invalid(key, "an array of strings")),
        }
    }

    fn require_str_list(&mut self, key: &str) -> Result<Vec<String>, ConfigError> {
        self.take_str_list(key)?.ok_or_else(|| self.missing(key))
    }

    /// Ordered key/value pairs, as an array of one-entry tables so the
    /// configured order is preserved.
    fn require_str_pairs(&mut self, key: &str) -> Result<Vec<(String, String)>, ConfigError> {
        match self.table.remove(key) {
            Some(toml::Value::Array(entries)) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for entry in entries {
                    let toml::Value::Table(table) = entry else {
                        return Err(self.invalid(key, "an array of `{ from = to }` tables"));
                    };
                    for (k, v) in table {
                        let toml::Value::String(v) = v else {
                            return Err(self.invalid(key, "an array of `{ from = to }` tables"));
                        };
                        pairs.push((k, v));
                    }
                }
                Ok(pairs)
            }
            Some(_) => Err(self.invalid(key, "an array of `{ from = to }` tables")),
            None => Err(self.missing(key)),
        }
    }
}

fn build_preprocessor(spec: &ProcessorSpec) -> Result<Box<dyn Preprocessor>, ConfigError> {
    let mut opts = Options::new(spec);
    let inner: Box<dyn Preprocessor> = match spec.kind.as_str() {
        "replace_range_with_number" => Box::new(ReplaceRangeWithNumber::new()),
        "parse_single_line" => Box::new(ParseSingleLine::new()),
        "compose_single_line" => Box::new(ComposeSingleLine::new()),
        "country_normalizer" => {
            let acceptable = opts.take_str_list("acceptable_countries")?.unwrap_or_default();
            let map = match opts.table.contains_key("country_map") {
                true => opts.require_str_pairs("country_map")?,
                false => Vec::new(),
            };
            Box::new(CountryNormalizer::new(acceptable, map))
        }
        "require_country" => match opts.take_str("default_country")? {
            Some(country) => Box::new(RequireCountry::with_default(country)),
            None => Box::new(RequireCountry::new()),
        },
        "cancel_if_regex_in_attr" => {
            let pattern = opts.require_str("regex")?;
            let attrs = opts.require_str_list("attrs")?;
            let ignorecase = opts.take_bool("ignorecase", false)?;
            Box::new(CancelIfRegexInAttr::new(&pattern, attrs, ignorecase)?)
        }
        "cancel_if_po_box" => Box::new(CancelIfPoBox::new()),
        other => {
            return Err(ConfigError::InvalidProcessor(format!(
                "unknown preprocessor kind `{other}`"
            )))
        }
    };
    if opts.table.is_empty() {
        Ok(inner)
    } else {
        Ok(Box::new(ConfiguredPreprocessor {
            inner,
            extras: opts.table,
        }))
    }
}

fn build_postprocessor(spec: &ProcessorSpec) -> Result<Box<dyn Postprocessor>, ConfigError> {
    let mut opts = Options::new(spec);
    let inner: Box<dyn Postprocessor> = match spec.kind.as_str() {
        "attr_filter" => {
            let values = opts.require_str_list("good_values")?;
            let attr = opts.require_str("attr")?;
            let filter = AttrFilter::new(values, attr);
            if opts.take_bool("exact_match", true)? {
                Box::new(filter)
            } else {
                Box::new(filter.inexact())
            }
        }
        "attr_exclude" => {
            let values = opts.require_str_list("bad_values")?;
            let attr = opts.require_str("attr")?;
            let exclude = AttrExclude::new(values, attr);
            if opts.take_bool("exact_match", true)? {
                Box::new(exclude)
            } else {
                Box::new(exclude.inexact())
            }
        }
        "attr_sorter" => Box::new(AttrSorter::new(
            opts.require_str_list("ordered_values")?,
            opts.require_str("attr")?,
        )),
        "attr_reverse_sorter" => Box::new(AttrReverseSorter::new(
            opts.require_str_list("ordered_values")?,
            opts.require_str("attr")?,
        )),
        "attr_rename" => {
            let attr = opts.require_str("attr")?;
            let map = opts.require_str_pairs("attr_map")?;
            let mut rename = AttrRename::new(attr, map);
            if opts.take_bool("exact_match", false)? {
                rename = rename.exact();
            }
            if opts.take_bool("case_sensitive", false)? {
                rename = rename.case_sensitive();
            }
            Box::new(rename)
        }
        "attr_migrator" => {
            let mut migrator = AttrMigrator::new(
                opts.require_str("attr_from")?,
                opts.require_str("attr_to")?,
                opts.require_str_pairs("attr_map")?,
            );
            if opts.take_bool("exact_match", false)? {
                migrator = migrator.exact();
            }
            if opts.take_bool("case_sensitive", false)? {
                migrator = migrator.case_sensitive();
            }
            Box::new(migrator)
        }
        "score_sorter" => {
            if opts.take_bool("ascending", false)? {
                Box::new(ScoreSorter::ascending())
            } else {
                Box::new(ScoreSorter::new())
            }
        }
        "use_high_score_if_at_least" => {
            Box::new(UseHighScoreIfAtLeast::new(opts.require_f64("min_score")?))
        }
        "group_by" => Box::new(GroupBy::new(opts.require_str("attr")?)),
        "group_by_multiple" => Box::new(GroupByMultiple::new(opts.require_str_list("attrs")?)),
        "snap_points" => match opts.take_f64("distance")? {
            Some(distance) => Box::new(SnapPoints::new(distance)),
            None => Box::new(SnapPoints::default()),
        },
        "dupe_picker" => {
            let picker = DupePicker::new(
                opts.require_str("attr_dupes")?,
                opts.require_str("attr_sort")?,
                opts.require_str_list("ordered_list")?,
            );
            if opts.take_bool("return_clean", false)? {
                Box::new(picker.return_clean())
            } else {
                Box::new(picker)
            }
        }
        other => {
            return Err(ConfigError::InvalidProcessor(format!(
                "unknown postprocessor kind `{other}`"
            )))
        }
    };
    if opts.table.is_empty() {
        Ok(inner)
    } else {
        Ok(Box::new(ConfiguredPostprocessor {
            inner,
            extras: opts.table,
        }))
    }
}

fn build_chains(
    pre: Option<&[ProcessorSpec]>,
    post: Option<&[ProcessorSpec]>,
) -> Result<
    (
        Option<Vec<Box<dyn Preprocessor>>>,
        Option<Vec<Box<dyn Postprocessor>>>,
    ),
    ConfigError,
> {
    let pre = pre
        .map(|specs| specs.iter().map(build_preprocessor).collect::<Result<_, _>>())
        .transpose()?;
    let post = post
        .map(|specs| specs.iter().map(build_postprocessor).collect::<Result<_, _>>())
        .transpose()?;
    Ok((pre, post))
}

fn build_adapter(config: &AdapterConfig) -> Result<Adapter, ConfigError> {
    let settings = config.settings.clone();
    let timeout = settings.timeout();
    let (pre, post) = build_chains(
        config.preprocessors.as_deref(),
        config.postprocessors.as_deref(),
    )?;

    fn assemble(
        backend: impl Backend + 'static,
        pre: Option<Vec<Box<dyn Preprocessor>>>,
        post: Option<Vec<Box<dyn Postprocessor>>>,
    ) -> Adapter {
        let pre = pre.unwrap_or_else(|| backend.default_preprocessors());
        let post = post.unwrap_or_else(|| backend.default_postprocessors());
        Adapter::with_processors(backend, pre, post)
    }

    let adapter = match config.backend.as_str() {
        "esri_wgs" => assemble(EsriWgs::new(settings), pre, post),
        "nominatim" => assemble(Nominatim::new(settings), pre, post),
        "us_census" => assemble(UsCensus::new(settings), pre, post),
        other => {
            return Err(ConfigError::InvalidProcessor(format!(
                "unknown backend `{other}`"
            )))
        }
    };
    Ok(adapter.timeout(timeout))
}

impl GeocoderConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: GeocoderConfig =
            toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Assemble a geocoder from this configuration.
    pub fn build(&self) -> Result<Geocoder> {
        let mut builder = Geocoder::builder()
            .waterfall(self.waterfall)
            .strict_stats(self.strict_stats);

        for spec in &self.preprocessors {
            builder = builder.preprocessor(build_preprocessor(spec)?);
        }
        if let Some(specs) = &self.postprocessors {
            let chain = specs
                .iter()
                .map(build_postprocessor)
                .collect::<Result<Vec<_>, _>>()?;
            builder = builder.postprocessors(chain);
        }
        for adapter_config in &self.adapters {
            builder = builder.adapter(build_adapter(adapter_config)?);
        }
        if let Some(stats) = &self.stats {
            builder = match &stats.webhook_url {
                Some(url) => builder.stats_sink(WebhookStatsSink::new(url.clone())),
                None => builder.stats_sink(LogStatsSink),
            };
        }

        builder.build().context("Failed to assemble geocoder")
    }
}
