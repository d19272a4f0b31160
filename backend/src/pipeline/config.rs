//! Pipeline configuration and argument parsing.
//!
//! [`PipelineConfig`] is the raw option set as written by a caller (JSON or
//! CLI flags). [`parse_arguments`] validates it once into typed
//! [`PipelineOptions`] that every stage reads.

use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::transform::{TransformChain, TransformRegistry, TransformStep};

/// Labels reserved for embedded text; levels made of them are never pruned.
pub const DEFAULT_IGNORE: [&str; 3] = ["text", "rst", "markdown"];

/// Which dimension becomes the outermost level before rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    Track,
    Slice,
    All,
    None,
}

impl FromStr for GroupBy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "track" => Ok(GroupBy::Track),
            "slice" => Ok(GroupBy::Slice),
            "all" => Ok(GroupBy::All),
            "none" => Ok(GroupBy::None),
            other => Err(ConfigError::InvalidGroupBy(other.to_string())),
        }
    }
}

/// Raw pipeline options.
///
/// ```json
/// {
///   "groupby": "slice",
///   "tracks": "wt,r(ko.*)",
///   "exclude": "r(^tmp)",
///   "transforms": [{"type": "filter", "fields": ["mean"]}]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub groupby: Option<String>,
    /// Tracks to collect (comma-separated, literal or `r(regex)`)
    #[serde(default)]
    pub tracks: Option<String>,
    /// Slices to collect
    #[serde(default)]
    pub slices: Option<String>,
    /// Keep only paths with a matching label
    #[serde(default)]
    pub restrict: Option<String>,
    /// Drop paths with a matching label
    #[serde(default)]
    pub exclude: Option<String>,
    /// Bypass the cache for reads and writes
    #[serde(default)]
    pub nocache: bool,
    /// Per-call options handed to the data source (bypass the cache)
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default)]
    pub transforms: Vec<TransformStep>,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
}

fn default_ignore() -> Vec<String> {
    DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            groupby: None,
            tracks: None,
            slices: None,
            restrict: None,
            exclude: None,
            nocache: false,
            options: None,
            transforms: Vec::new(),
            ignore: default_ignore(),
        }
    }
}

impl PipelineConfig {
    /// Load from JSON string
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidOption {
            option: "config".to_string(),
            message: e.to_string(),
        })
    }

    /// Per-call source options; an empty string counts as none.
    pub fn call_options(&self) -> Option<&str> {
        self.options.as_deref().filter(|o| !o.is_empty())
    }

    /// True when a run with this configuration may read and write the cache
    /// of a cacheable source.
    pub fn uses_cache(&self) -> bool {
        !self.nocache && self.call_options().is_none()
    }
}

// =============================================================================
// Label filters
// =============================================================================

/// A literal label or an `r(...)` regular expression.
#[derive(Debug, Clone)]
pub enum LabelPattern {
    Literal(String),
    Regex(Regex),
}

impl LabelPattern {
    pub fn parse(term: &str) -> ConfigResult<Self> {
        let term = term.trim();
        match term.strip_prefix("r(").and_then(|t| t.strip_suffix(')')) {
            Some(pattern) => Regex::new(pattern)
                .map(LabelPattern::Regex)
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: term.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(LabelPattern::Literal(term.to_string())),
        }
    }

    /// Literals match exactly; regexes match anywhere in the label.
    pub fn matches(&self, label: &str) -> bool {
        match self {
            LabelPattern::Literal(literal) => literal == label,
            LabelPattern::Regex(re) => re.is_match(label),
        }
    }
}

/// A comma-separated list of label patterns. Empty filters match nothing
/// and are skipped by the stages that use them.
#[derive(Debug, Clone, Default)]
pub struct LabelFilter {
    patterns: Vec<LabelPattern>,
}

impl LabelFilter {
    /// Parse `a,b,r(c.*)`. Commas inside `r(...)` do not split.
    pub fn parse(list: &str) -> ConfigResult<Self> {
        let patterns = split_terms(list)
            .into_iter()
            .map(LabelPattern::parse)
            .collect::<ConfigResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    fn parse_option(list: Option<&str>) -> ConfigResult<Self> {
        list.map(Self::parse).transpose().map(Option::unwrap_or_default)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, label: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(label))
    }

    /// True if any label of `path` matches.
    pub fn matches_path(&self, path: &[String]) -> bool {
        path.iter().any(|label| self.matches(label))
    }

    /// Labels kept by the filter, in order. An empty filter keeps all.
    pub fn select(&self, labels: &[String]) -> Vec<String> {
        if self.is_empty() {
            return labels.to_vec();
        }
        labels.iter().filter(|l| self.matches(l)).cloned().collect()
    }
}

fn split_terms(list: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&list[start..]);
    terms.into_iter().map(str::trim).filter(|t| !t.is_empty()).collect()
}

// =============================================================================
// Parsed options
// =============================================================================

/// Validated options threaded through every stage of one invocation.
pub struct PipelineOptions {
    pub groupby: GroupBy,
    pub tracks: LabelFilter,
    pub slices: LabelFilter,
    pub restrict: LabelFilter,
    pub exclude: LabelFilter,
    pub nocache: bool,
    pub options: Option<String>,
    pub transforms: TransformChain,
    pub ignore: Vec<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            groupby: GroupBy::default(),
            tracks: LabelFilter::default(),
            slices: LabelFilter::default(),
            restrict: LabelFilter::default(),
            exclude: LabelFilter::default(),
            nocache: false,
            options: None,
            transforms: TransformChain::new(),
            ignore: default_ignore(),
        }
    }
}

/// Validate a raw configuration.
pub fn parse_arguments(config: &PipelineConfig, registry: &TransformRegistry) -> ConfigResult<PipelineOptions> {
    let groupby = match config.groupby.as_deref() {
        Some(g) => g.parse()?,
        None => GroupBy::default(),
    };

    Ok(PipelineOptions {
        groupby,
        tracks: LabelFilter::parse_option(config.tracks.as_deref())?,
        slices: LabelFilter::parse_option(config.slices.as_deref())?,
        restrict: LabelFilter::parse_option(config.restrict.as_deref())?,
        exclude: LabelFilter::parse_option(config.exclude.as_deref())?,
        nocache: config.nocache,
        options: config.call_options().map(str::to_string),
        transforms: TransformChain::from_steps(&config.transforms, registry)?,
        ignore: config.ignore.clone(),
    })
}
