//! Pipeline dispatcher
//!
//! Sequences one invocation through its stages:
//!
//! ```text
//! parse-arguments → collect → transform → restrict → exclude → prune → group → render
//! ```
//!
//! Every stage runs on its own: a failing stage becomes an error block
//! carrying the stage name, and a stage that finds nothing to work on ends
//! the run with a no-data outcome. Nothing raised by a stage escapes
//! [`Dispatcher::run`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::api::logs::{log_debug, log_error, log_info, log_success, log_warning};
use crate::cache::{PathCache, DIMENSIONLESS_KEY};
use crate::error::{ConfigError, PipelineError, PipelineResult, Stage};
use crate::models::path_to_string;
use crate::render::{Block, RenderSink};
use crate::source::{declared_levels, DataSource};
use crate::transform::TransformRegistry;
use crate::tree::{cartesian_product, DataTree};

use super::config::{parse_arguments, GroupBy, LabelFilter, PipelineConfig, PipelineOptions};

/// Maximum number of dimension levels a source may declare.
pub const MAX_PATH_NESTING: usize = 5;

/// Label of synthetic wrapper levels.
pub const WRAPPER_LABEL: &str = "all";

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RunStatus {
    /// All stages ran; blocks may still contain per-path errors.
    Rendered,
    /// A stage legitimately found nothing to work on.
    NoData { stage: Stage, reason: String },
    /// A stage failed as a whole.
    Failed { stage: Stage },
}

/// Result of one invocation: the status plus every rendered or error block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    #[serde(flatten)]
    pub status: RunStatus,
    pub blocks: Vec<Block>,
}

impl RunOutcome {
    pub fn is_no_data(&self) -> bool {
        matches!(self.status, RunStatus::NoData { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, RunStatus::Failed { .. })
    }

    pub fn errors(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter().filter(|b| b.is_error())
    }
}

/// Outcome of a single stage that did not fail.
enum Step<T> {
    Next(T),
    NoData(String),
}

/// Tree split for rendering.
struct Grouped {
    tree: DataTree,
    split: usize,
}

/// Runs the pipeline for one data source.
pub struct Dispatcher {
    source: Box<dyn DataSource>,
    cache: PathCache,
}

impl Dispatcher {
    /// Use the persistent cache under `cache_dir`.
    pub fn new(source: Box<dyn DataSource>, cache_dir: impl AsRef<Path>) -> Self {
        let cache = if source.cacheable() {
            PathCache::open(cache_dir, &source.identity())
        } else {
            PathCache::disabled(&source.identity())
        };
        Self { source, cache }
    }

    pub fn with_cache(source: Box<dyn DataSource>, cache: PathCache) -> Self {
        Self { source, cache }
    }

    /// Never read or write a cache.
    pub fn uncached(source: Box<dyn DataSource>) -> Self {
        let cache = PathCache::disabled(&source.identity());
        Self { source, cache }
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    /// Parse `config` and run every stage.
    pub fn run(&self, config: &PipelineConfig, registry: &TransformRegistry, sink: &dyn RenderSink) -> RunOutcome {
        match parse_arguments(config, registry) {
            Ok(options) => self.run_with_options(&options, sink),
            Err(e) => failed(Stage::ParseArguments, e.into(), Vec::new()),
        }
    }

    /// Run every stage with already parsed options.
    pub fn run_with_options(&self, options: &PipelineOptions, sink: &dyn RenderSink) -> RunOutcome {
        log_info(format!("📖 Collecting data from '{}'", self.source.identity()));
        let mut blocks = Vec::new();

        let tree = match self.collect(options, &mut blocks) {
            Ok(Step::Next(tree)) => tree,
            Ok(Step::NoData(reason)) => return no_data(Stage::Collect, reason, blocks),
            Err(e) => return failed(Stage::Collect, e, blocks),
        };
        log_success(format!("Collected {} leaves", tree.leaf_count()));

        let tree = match self.transform(options, tree, &mut blocks) {
            Ok(Step::Next(tree)) => tree,
            Ok(Step::NoData(reason)) => return no_data(Stage::Transform, reason, blocks),
            Err(e) => return failed(Stage::Transform, e, blocks),
        };

        let stages: [(Stage, &dyn Fn(DataTree) -> PipelineResult<Step<DataTree>>); 3] = [
            (Stage::Restrict, &|tree: DataTree| Ok(restrict(tree, &options.restrict))),
            (Stage::Exclude, &|tree: DataTree| Ok(exclude(tree, &options.exclude))),
            (Stage::Prune, &|tree: DataTree| Ok(prune(tree, &options.ignore))),
        ];

        let mut tree = tree;
        for (stage, run) in stages {
            tree = match run(tree) {
                Ok(Step::Next(tree)) => tree,
                Ok(Step::NoData(reason)) => return no_data(stage, reason, blocks),
                Err(e) => return failed(stage, e, blocks),
            };
        }

        log_info(format!("📦 Grouping by {:?}", options.groupby));
        let grouped = group(tree, options.groupby, sink.required_depth());

        log_info(format!("⚙️  Rendering with '{}'", sink.name()));
        let rendered = render(&grouped, sink);
        if rendered.is_empty() {
            return no_data(Stage::Render, "nothing rendered".to_string(), blocks);
        }
        let errors = rendered.iter().filter(|b| b.is_error()).count();
        blocks.extend(rendered);

        if errors > 0 {
            log_warning(format!("{} paths failed to render", errors));
        }
        log_success(format!("Rendered {} blocks", blocks.len()));
        RunOutcome {
            status: RunStatus::Rendered,
            blocks,
        }
    }

    /// Label sets to collect, after the track and slice filters.
    fn collection_levels(&self, options: &PipelineOptions) -> PipelineResult<Step<Vec<Vec<String>>>> {
        if self.source.dimensionless() {
            return Ok(Step::Next(Vec::new()));
        }

        let mut levels = declared_levels(self.source.as_ref());
        if levels.len() > MAX_PATH_NESTING {
            return Err(ConfigError::TooManyLevels {
                found: levels.len(),
                max: MAX_PATH_NESTING,
            }
            .into());
        }
        if levels.first().map_or(true, |tracks| tracks.is_empty()) {
            return Ok(Step::NoData("no tracks".to_string()));
        }

        let filters: [&LabelFilter; 2] = [&options.tracks, &options.slices];
        for (labels, filter) in levels.iter_mut().zip(filters) {
            *labels = filter.select(labels);
        }
        if levels[0].is_empty() {
            return Ok(Step::NoData("no tracks after filtering".to_string()));
        }
        Ok(Step::Next(levels))
    }

    /// Fetch every declared path through the cache into a fresh tree.
    ///
    /// A source failure for one path becomes an error block for that path;
    /// the remaining paths are still collected.
    fn collect(&self, options: &PipelineOptions, blocks: &mut Vec<Block>) -> PipelineResult<Step<DataTree>> {
        let levels = match self.collection_levels(options)? {
            Step::Next(levels) => levels,
            Step::NoData(reason) => return Ok(Step::NoData(reason)),
        };
        let paths = cartesian_product(&levels);
        let use_cache = self.source.cacheable() && !options.nocache && options.options.is_none();
        if !use_cache {
            log_debug("Cache bypassed for this invocation");
        }

        let mut tree = DataTree::new();
        for path in paths {
            let cached = if use_cache { self.cache.get(&path) } else { None };
            let value = match cached {
                Some(value) => {
                    log_debug(format!("Cache hit for '{}'", self.cache.key_for(&path)));
                    Some(value)
                }
                None => match self.source.call(&path, options.options.as_deref()) {
                    Ok(Some(value)) => {
                        if use_cache {
                            self.cache.put(&path, &value);
                        }
                        Some(value)
                    }
                    Ok(None) => {
                        log_debug(format!("No data for '{}'", path_to_string(&path)));
                        None
                    }
                    Err(e) => {
                        log_error(format!("Collecting '{}' failed: {}", path_to_string(&path), e));
                        blocks.push(Block::error(Stage::Collect, &path, e.to_string()));
                        None
                    }
                },
            };

            if let Some(value) = value {
                if path.is_empty() {
                    tree.set_leaf(&[DIMENSIONLESS_KEY], value);
                } else {
                    tree.set_leaf(&path, value);
                }
            }
        }

        if tree.is_empty() {
            return Ok(Step::NoData("no data collected".to_string()));
        }
        Ok(Step::Next(tree))
    }

    /// Run the transform chain. Subtrees dropped on a shape error become
    /// error blocks; other transform errors fail the stage.
    fn transform(
        &self,
        options: &PipelineOptions,
        tree: DataTree,
        blocks: &mut Vec<Block>,
    ) -> PipelineResult<Step<DataTree>> {
        if options.transforms.is_empty() {
            return Ok(Step::Next(tree));
        }
        let transformed = options.transforms.apply(tree)?;
        for failure in &transformed.failures {
            blocks.push(Block::error(Stage::Transform, &failure.path, failure.message()));
        }
        let tree = transformed.tree;
        if tree.is_empty() {
            return Ok(Step::NoData("all data removed by transforms".to_string()));
        }
        Ok(Step::Next(tree))
    }
}

/// Remove every leaf whose path satisfies `discard`, then compact.
///
/// Walks the leaves that exist, so branches ending above the deepest level
/// are filtered too.
fn filter_paths(mut tree: DataTree, discard: impl Fn(&[String]) -> bool) -> Step<DataTree> {
    let mut removed = 0;
    for path in tree.leaf_paths() {
        if discard(&path) && tree.remove_leaf(&path).is_some() {
            removed += 1;
        }
    }
    tree.remove_empty_branches();
    log_debug(format!("{} paths removed", removed));

    if tree.is_empty() {
        Step::NoData("no paths left after filtering".to_string())
    } else {
        Step::Next(tree)
    }
}

fn restrict(tree: DataTree, filter: &LabelFilter) -> Step<DataTree> {
    if filter.is_empty() {
        return Step::Next(tree);
    }
    filter_paths(tree, |path| !filter.matches_path(path))
}

fn exclude(tree: DataTree, filter: &LabelFilter) -> Step<DataTree> {
    if filter.is_empty() {
        return Step::Next(tree);
    }
    filter_paths(tree, |path| filter.matches_path(path))
}

fn prune(mut tree: DataTree, ignore: &[String]) -> Step<DataTree> {
    let removed = tree.prune(ignore);
    if removed > 0 {
        log_debug(format!("Pruned {} levels", removed));
    }
    if tree.is_empty() {
        return Step::NoData("empty tree after pruning".to_string());
    }
    Step::Next(tree)
}

fn wrap_to_depth(mut tree: DataTree, depth: usize) -> DataTree {
    while tree.depth() < depth {
        tree = tree.wrap(WRAPPER_LABEL);
    }
    tree
}

/// Make the grouping dimension outermost and decide how many levels are
/// split off into separate render calls.
fn group(tree: DataTree, groupby: GroupBy, required_depth: usize) -> Grouped {
    let depth = tree.depth();
    let (tree, groupby) = match groupby {
        GroupBy::Slice if depth > 2 => (tree.swap(0, 1), GroupBy::Track),
        GroupBy::Slice => {
            log_warning("Grouping by slice needs more than two levels, grouping by all");
            (tree, GroupBy::All)
        }
        other => (tree, other),
    };

    let tree = wrap_to_depth(tree, required_depth);
    let depth = tree.depth();
    let split = match groupby {
        GroupBy::Track | GroupBy::Slice => depth.saturating_sub(required_depth),
        GroupBy::All => 0,
        GroupBy::None => depth.saturating_sub(1),
    };
    Grouped { tree, split }
}

/// One render call per path of the split levels. A failing path becomes
/// an error block; its siblings still render.
fn render(grouped: &Grouped, sink: &dyn RenderSink) -> Vec<Block> {
    let levels = grouped.tree.get_paths();
    let split = grouped.split.min(levels.len());

    let mut blocks = Vec::new();
    for path in cartesian_product(&levels[..split]) {
        let Some(node) = grouped.tree.get_leaf(&path) else {
            log_debug(format!("Nothing to render at '{}'", path_to_string(&path)));
            continue;
        };
        if node.is_empty() {
            continue;
        }

        let subtree = wrap_to_depth(DataTree::from_node(node.clone()), sink.required_depth());
        match sink.render(&subtree, &path) {
            Ok(rendered) => blocks.extend(rendered),
            Err(e) => {
                log_error(format!("Rendering '{}' failed: {}", path_to_string(&path), e));
                blocks.push(Block::error(Stage::Render, &path, e.to_string()));
            }
        }
    }
    blocks
}

fn failed(stage: Stage, error: PipelineError, mut blocks: Vec<Block>) -> RunOutcome {
    log_error(format!("Stage '{}' failed: {}", stage, error));
    blocks.push(Block::error(stage, &[], error.to_string()));
    RunOutcome {
        status: RunStatus::Failed { stage },
        blocks,
    }
}

fn no_data(stage: Stage, reason: String, blocks: Vec<Block>) -> RunOutcome {
    log_warning(format!("No data at stage '{}': {}", stage, reason));
    RunOutcome {
        status: RunStatus::NoData { stage, reason },
        blocks,
    }
}
