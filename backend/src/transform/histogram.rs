//! Histogram transformer
//!
//! Bins a numeric series into `{"bins": left edges, "frequency": counts}`.
//! Bins are linear (a bin count or an explicit bin size), logarithmic, or
//! one bin per distinct value. Frequencies can be post-processed by
//! aggregates applied in declared order.

use serde::{Deserialize, Serialize};

use crate::api::logs::{log_debug, log_info, log_warning};
use crate::error::{ConfigError, ConfigResult, TransformResult};
use crate::models::{path_to_string, Node};

use super::Transformer;

const DEFAULT_BINS: usize = 10;

/// Upper bound on the number of bins, whether counted or derived from a bin size.
pub const MAX_BINS: usize = 100_000;

/// How bin edges are laid out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinMode {
    /// `n` equal-width bins
    Linear(usize),
    /// `n` bins equal-width in log10 space
    Log(usize),
    /// One bin per distinct value
    Discrete,
}

impl std::str::FromStr for BinMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "discrete" || s == "dict" {
            return Ok(BinMode::Discrete);
        }
        if let Some(n) = s.strip_prefix("log-") {
            return n
                .parse()
                .map(BinMode::Log)
                .map_err(|_| format!("invalid log bin count '{}'", n));
        }
        s.parse()
            .map(BinMode::Linear)
            .map_err(|_| format!("invalid bins '{}'", s))
    }
}

/// Post-processing of frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregate {
    NormalizedTotal,
    NormalizedMax,
    Cumulative,
    ReverseCumulative,
}

impl Aggregate {
    pub fn apply(&self, frequencies: &mut [f64]) {
        match self {
            Aggregate::NormalizedTotal => {
                let total: f64 = frequencies.iter().sum();
                if total > 0.0 {
                    frequencies.iter_mut().for_each(|f| *f /= total);
                }
            }
            Aggregate::NormalizedMax => {
                let max = frequencies.iter().copied().fold(f64::MIN, f64::max);
                if max > 0.0 {
                    frequencies.iter_mut().for_each(|f| *f /= max);
                }
            }
            Aggregate::Cumulative => {
                let mut running = 0.0;
                for f in frequencies.iter_mut() {
                    running += *f;
                    *f = running;
                }
            }
            Aggregate::ReverseCumulative => {
                let mut running = 0.0;
                for f in frequencies.iter_mut().rev() {
                    running += *f;
                    *f = running;
                }
            }
        }
    }
}

/// `bins` accepts a count or a keyword such as `"log-20"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BinsOption {
    Count(usize),
    Keyword(String),
}

/// Raw histogram options as written in a pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistogramOptions {
    #[serde(default)]
    pub bins: Option<BinsOption>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub binsize: Option<f64>,
    #[serde(default)]
    pub aggregate: Vec<Aggregate>,
}

/// Validated histogram transformer.
#[derive(Debug, Clone)]
pub struct Histogram {
    pub mode: BinMode,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub binsize: Option<f64>,
    pub aggregate: Vec<Aggregate>,
}

impl TryFrom<HistogramOptions> for Histogram {
    type Error = ConfigError;

    fn try_from(options: HistogramOptions) -> ConfigResult<Self> {
        let invalid = |message: String| ConfigError::InvalidTransformOptions {
            name: "histogram".to_string(),
            message,
        };

        let mode = match options.bins {
            None => BinMode::Linear(DEFAULT_BINS),
            Some(BinsOption::Count(n)) => BinMode::Linear(n),
            Some(BinsOption::Keyword(keyword)) => keyword.parse().map_err(invalid)?,
        };
        if matches!(mode, BinMode::Linear(0) | BinMode::Log(0)) {
            return Err(invalid("bin count must be positive".to_string()));
        }
        if let BinMode::Linear(n) | BinMode::Log(n) = mode {
            if n > MAX_BINS {
                return Err(invalid(format!("bin count {} exceeds {}", n, MAX_BINS)));
            }
        }
        if let Some(binsize) = options.binsize {
            if binsize <= 0.0 || !binsize.is_finite() {
                return Err(invalid(format!("binsize must be positive, got {}", binsize)));
            }
            if let (Some(min), Some(max)) = (options.min, options.max) {
                let nbins = ((max - min) / binsize).ceil();
                if nbins > MAX_BINS as f64 {
                    return Err(invalid(format!(
                        "binsize {} over [{}, {}] gives {} bins, more than {}",
                        binsize, min, max, nbins, MAX_BINS
                    )));
                }
            }
        }

        Ok(Self {
            mode,
            min: options.min,
            max: options.max,
            binsize: options.binsize,
            aggregate: options.aggregate,
        })
    }
}

impl Histogram {
    pub fn new(mode: BinMode) -> Self {
        Self {
            mode,
            min: None,
            max: None,
            binsize: None,
            aggregate: Vec::new(),
        }
    }

    /// Bin edges for `values`. Fewer than two edges means no histogram.
    fn edges(&self, values: &[f64]) -> Vec<f64> {
        let data_min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let data_max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut lo = self.min.unwrap_or(data_min);
        let mut hi = self.max.unwrap_or(data_max);

        match self.mode {
            BinMode::Linear(n) => {
                if let Some(binsize) = self.binsize {
                    let nbins = ((hi - lo) / binsize).ceil().max(0.0);
                    if !nbins.is_finite() || nbins > MAX_BINS as f64 {
                        log_warning(format!(
                            "histogram: binsize {} over [{}, {}] needs {} bins, more than {}",
                            binsize, lo, hi, nbins, MAX_BINS
                        ));
                        return Vec::new();
                    }
                    let nbins = nbins as usize;
                    return (0..=nbins).map(|i| lo + i as f64 * binsize).collect();
                }
                if lo == hi {
                    lo -= 0.5;
                    hi += 0.5;
                }
                if hi < lo {
                    return Vec::new();
                }
                linspace(lo, hi, n)
            }
            BinMode::Log(n) => {
                if lo <= 0.0 || hi <= lo {
                    return Vec::new();
                }
                linspace(lo.log10(), hi.log10(), n)
                    .into_iter()
                    .map(|e| 10f64.powf(e))
                    .collect()
            }
            BinMode::Discrete => Vec::new(),
        }
    }

    /// Compute `(left edges, frequencies)`, or `None` when there is nothing to bin.
    ///
    /// Non-finite values are ignored.
    pub fn compute(&self, values: &[f64]) -> Option<(Vec<f64>, Vec<f64>)> {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let values = finite.as_slice();
        if values.is_empty() {
            return None;
        }

        let (x, mut frequencies) = if self.mode == BinMode::Discrete {
            let mut distinct = values.to_vec();
            distinct.sort_by(f64::total_cmp);
            distinct.dedup();
            let counts = distinct
                .iter()
                .map(|d| values.iter().filter(|v| *v == d).count() as f64)
                .collect();
            (distinct, counts)
        } else {
            let edges = self.edges(values);
            if edges.len() < 2 {
                return None;
            }
            let nbins = edges.len() - 1;
            let first = edges[0];
            let last = edges[nbins];

            let mut counts = vec![0.0; nbins];
            for &v in values {
                if v < first || v > last {
                    continue;
                }
                // right edge of the last bin is inclusive
                let bin = edges.partition_point(|e| *e <= v).saturating_sub(1).min(nbins - 1);
                counts[bin] += 1.0;
            }
            (edges[..nbins].to_vec(), counts)
        };

        for aggregate in &self.aggregate {
            aggregate.apply(&mut frequencies);
        }
        Some((x, frequencies))
    }
}

/// Drop nulls, NaN and infinities.
pub(crate) fn finite_values(values: Vec<Option<f64>>) -> Vec<f64> {
    values.into_iter().flatten().filter(|v| v.is_finite()).collect()
}

fn linspace(lo: f64, hi: f64, nbins: usize) -> Vec<f64> {
    let step = (hi - lo) / nbins as f64;
    (0..=nbins)
        .map(|i| if i == nbins { hi } else { lo + i as f64 * step })
        .collect()
}

impl Transformer for Histogram {
    fn name(&self) -> &str {
        "histogram"
    }

    fn levels(&self) -> usize {
        0
    }

    fn apply(&self, subtree: Node, path: &[String]) -> TransformResult<Option<Node>> {
        let Some(values) = subtree.numeric_series() else {
            log_debug(format!("histogram: '{}' is not a series, kept", path_to_string(path)));
            return Ok(Some(subtree));
        };

        let total = values.len();
        let mut values = finite_values(values);
        if values.len() < total {
            log_info(format!(
                "histogram: removed {} null or non-finite values from '{}'",
                total - values.len(),
                path_to_string(path)
            ));
        }

        if matches!(self.mode, BinMode::Log(_)) {
            let before = values.len();
            values.retain(|v| *v > 0.0);
            if values.len() < before {
                log_info(format!(
                    "histogram: removed {} non-positive values from '{}' for log bins",
                    before - values.len(),
                    path_to_string(path)
                ));
            }
        }

        Ok(self.compute(&values).map(|(x, frequencies)| {
            Node::from_pairs([
                ("bins", Node::series(x)),
                ("frequency", Node::series(frequencies)),
            ])
        }))
    }
}
