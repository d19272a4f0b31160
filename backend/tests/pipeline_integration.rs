//! End-to-end runs of the dispatcher against closure and document sources.

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use trackreport::{
    Block, DataSource, Dispatcher, DocumentSource, FnSource, MatrixOperator, MatrixRenderer, Node, PathCache,
    PipelineConfig, RunStatus, SourceError, Stage, TableRenderer, TransformRegistry,
};

// ============================================================================
// HELPERS
// ============================================================================

fn two_tracks() -> FnSource {
    FnSource::new("two-tracks", |path, _| {
        let v = match path[0].as_str() {
            "t1" => 10,
            _ => 20,
        };
        Ok(Some(Node::from(json!({ "v": v }))))
    })
    .with_tracks(["t1", "t2"])
}

/// Source over two tracks that counts its calls.
fn counting(calls: &Arc<AtomicUsize>) -> FnSource {
    let calls = Arc::clone(calls);
    FnSource::new("counting", move |path, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(Node::from(json!({"v": path[0].len()}))))
    })
    .with_tracks(["t1", "t2"])
}

fn matrix_of(block: &Block) -> &trackreport::Matrix {
    match block {
        Block::Matrix { matrix, .. } => matrix,
        other => panic!("expected a matrix block, got {:?}", other),
    }
}

fn config(value: serde_json::Value) -> PipelineConfig {
    serde_json::from_value(value).unwrap()
}

fn document() -> DocumentSource {
    DocumentSource::from_value(json!({
        "name": "expression",
        "data": {
            "wt": {"liver": {"mean": 1.0, "n": 3}, "brain": {"mean": 2.0, "n": 4}},
            "ko": {"liver": {"mean": 3.0, "n": 5}, "brain": {"mean": 4.0, "n": 6}}
        }
    }))
    .unwrap()
}

// ============================================================================
// MATRIX RUNS
// ============================================================================

#[test]
fn track_matrix_end_to_end() {
    let dispatcher = Dispatcher::uncached(Box::new(two_tracks()));
    let outcome = dispatcher.run(
        &config(json!({"groupby": "track"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new().with_field("v"),
    );

    assert_eq!(outcome.status, RunStatus::Rendered);
    assert_eq!(outcome.blocks.len(), 1);
    let matrix = matrix_of(&outcome.blocks[0]);
    let rows: Vec<String> = matrix.row_headers.iter().map(|h| h.to_string()).collect();
    assert_eq!(rows, vec!["t1", "t2"]);
    assert_eq!(matrix.ncols(), 1);
    assert_eq!(matrix.data, vec![vec![10.0], vec![20.0]]);
}

#[test]
fn failing_track_still_renders_siblings() {
    let source = FnSource::new("flaky", |path, _| match path[0].as_str() {
        "t1" => Ok(Some(Node::from(json!({"v": 10})))),
        _ => Err(SourceError::failed("connection refused")),
    })
    .with_tracks(["t1", "t2"]);

    let outcome = Dispatcher::uncached(Box::new(source)).run(
        &PipelineConfig::default(),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new().with_field("v"),
    );

    assert_eq!(outcome.status, RunStatus::Rendered);
    let error = outcome.blocks.iter().find(|b| b.is_error()).unwrap();
    match error {
        Block::Error { stage, path, message } => {
            assert_eq!(*stage, Stage::Collect);
            assert_eq!(path, "t2");
            assert!(message.contains("connection refused"));
        }
        _ => unreachable!(),
    }

    let matrix = matrix_of(outcome.blocks.iter().find(|b| !b.is_error()).unwrap());
    assert_eq!(matrix.data, vec![vec![10.0]]);
}

#[test]
fn slices_group_into_one_block_per_track() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &PipelineConfig::default(),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new(),
    );

    assert_eq!(outcome.status, RunStatus::Rendered);
    let titles: Vec<&str> = outcome.blocks.iter().map(|b| b.title()).collect();
    assert_eq!(titles, vec!["wt", "ko"]);

    let matrix = matrix_of(&outcome.blocks[0]);
    assert_eq!(matrix.data, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
}

#[test]
fn groupby_slice_swaps_the_outer_levels() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({"groupby": "slice"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new().with_field("mean"),
    );

    let titles: Vec<&str> = outcome.blocks.iter().map(|b| b.title()).collect();
    assert_eq!(titles, vec!["liver", "brain"]);
    assert_eq!(matrix_of(&outcome.blocks[0]).data, vec![vec![1.0], vec![3.0]]);
}

#[test]
fn groupby_all_renders_a_single_block() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({"groupby": "all"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new()
            .with_field("mean")
            .with_operators(vec![MatrixOperator::NormalizedRowTotal]),
    );

    assert_eq!(outcome.blocks.len(), 1);
    let matrix = matrix_of(&outcome.blocks[0]);
    let rows: Vec<String> = matrix.row_headers.iter().map(|h| h.to_string()).collect();
    assert_eq!(rows, vec!["wt", "ko"]);
    assert!((matrix.data[0][0] - 1.0 / 3.0).abs() < 1e-12);
    assert!((matrix.data[1][1] - 4.0 / 7.0).abs() < 1e-12);
}

// ============================================================================
// FILTERING AND TRANSFORMS
// ============================================================================

#[test]
fn restrict_and_exclude_filter_paths() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({"groupby": "all", "restrict": "liver", "exclude": "ko"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new().with_field("n"),
    );

    let matrix = matrix_of(&outcome.blocks[0]);
    assert_eq!(matrix.data, vec![vec![3.0]]);
}

#[test]
fn exclude_everything_is_no_data() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({"exclude": "r(.)"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new(),
    );

    assert!(matches!(outcome.status, RunStatus::NoData { stage: Stage::Exclude, .. }));
    assert!(outcome.blocks.is_empty());
}

#[test]
fn track_filter_limits_collection() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({"tracks": "r(^k)"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new().with_field("mean"),
    );
    let titles: Vec<&str> = outcome.blocks.iter().map(|b| b.title()).collect();
    assert_eq!(titles, vec!["ko"]);

    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({"tracks": "het"})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new(),
    );
    assert!(matches!(outcome.status, RunStatus::NoData { stage: Stage::Collect, .. }));
}

#[test]
fn transforms_run_before_rendering() {
    let outcome = Dispatcher::uncached(Box::new(document())).run(
        &config(json!({
            "groupby": "all",
            "transforms": [{"type": "filter", "fields": ["n"]}]
        })),
        &TransformRegistry::builtin(),
        &TableRenderer::default(),
    );

    let Block::Table { table, .. } = &outcome.blocks[0] else {
        panic!("expected a table block");
    };
    assert_eq!(table.col_headers.last().map(String::as_str), Some("n"));
}

#[test]
fn unknown_transform_fails_before_collecting() {
    let outcome = Dispatcher::uncached(Box::new(two_tracks())).run(
        &config(json!({"transforms": [{"type": "smooth"}]})),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new(),
    );

    assert_eq!(outcome.status, RunStatus::Failed { stage: Stage::ParseArguments });
    assert!(matches!(&outcome.blocks[0], Block::Error { stage: Stage::ParseArguments, .. }));
}

#[test]
fn transform_shape_errors_are_per_path() {
    let source = FnSource::new("pairs", |path, _| {
        let v = match (path[0].as_str(), path[1].as_str()) {
            ("t2", "b") => json!([3]),
            (_, "a") => json!([1, 2]),
            _ => json!([3, 4]),
        };
        Ok(Some(Node::from(json!({ "v": v }))))
    })
    .with_tracks(["t1", "t2"])
    .with_slices(["a", "b"]);

    let outcome = Dispatcher::uncached(Box::new(source)).run(
        &config(json!({"transforms": [{"type": "combine", "fields": ["v"]}]})),
        &TransformRegistry::builtin(),
        &TableRenderer::default(),
    );

    assert_eq!(outcome.status, RunStatus::Rendered);
    let errors: Vec<&Block> = outcome.blocks.iter().filter(|b| b.is_error()).collect();
    assert_eq!(errors.len(), 1);
    match errors[0] {
        Block::Error { stage, path, message } => {
            assert_eq!(*stage, Stage::Transform);
            assert_eq!(path, "t2");
            assert!(message.contains("not equal"));
        }
        _ => unreachable!(),
    }
    assert!(outcome.blocks.iter().any(|b| !b.is_error()));
}

#[test]
fn render_errors_are_per_path() {
    let source = FnSource::new("mixed", |path, _| match path[0].as_str() {
        "good" => Ok(Some(Node::from(json!({"a": {"v": 1}, "b": {"v": 2}})))),
        _ => Ok(Some(Node::from(json!({"a": {"v": [1, 2]}, "b": {"v": 3}})))),
    })
    .with_tracks(["good", "bad"]);

    let outcome = Dispatcher::uncached(Box::new(source)).run(
        &PipelineConfig::default(),
        &TransformRegistry::builtin(),
        &MatrixRenderer::new(),
    );

    assert_eq!(outcome.status, RunStatus::Rendered);
    assert_eq!(outcome.blocks.len(), 2);
    assert!(!outcome.blocks[0].is_error());
    assert!(matches!(
        &outcome.blocks[1],
        Block::Error { stage: Stage::Render, path, .. } if path == "bad"
    ));
}

// ============================================================================
// CACHE
// ============================================================================

#[test]
fn cache_round_trips_across_reopen() {
    let dir = TempDir::new().unwrap();
    let path = vec!["t1".to_string(), "s1".to_string()];
    let value = Node::from(json!({"mean": 1.5, "values": [1, 2, null]}));

    {
        let cache = PathCache::open(dir.path(), "document:expression");
        assert!(cache.is_enabled());
        cache.put(&path, &value);
    }

    let reopened = PathCache::open(dir.path(), "document:expression");
    assert_eq!(reopened.get(&path), Some(value));

    let other = PathCache::open(dir.path(), "document:other");
    assert_eq!(other.get(&path), None);
}

#[test]
fn dispatcher_serves_repeat_runs_from_disk() {
    let dir = TempDir::new().unwrap();
    let registry = TransformRegistry::builtin();
    let sink = MatrixRenderer::new().with_field("v");

    let first = Dispatcher::new(Box::new(two_tracks()), dir.path());
    let identity = first.source().identity();
    let outcome = first.run(&PipelineConfig::default(), &registry, &sink);
    assert_eq!(outcome.status, RunStatus::Rendered);
    assert_eq!(first.cache().entries().len(), 2);

    // same identity, different answers: cached values win
    let changed = FnSource::new("two-tracks", |_, _| Ok(Some(Node::from(json!({"v": 99})))))
        .with_tracks(["t1", "t2"]);
    assert_eq!(changed.identity(), identity);
    let outcome = Dispatcher::new(Box::new(changed), dir.path()).run(&PipelineConfig::default(), &registry, &sink);
    assert_eq!(matrix_of(&outcome.blocks[0]).data, vec![vec![10.0], vec![20.0]]);

    let changed = FnSource::new("two-tracks", |_, _| Ok(Some(Node::from(json!({"v": 99})))))
        .with_tracks(["t1", "t2"]);
    let outcome = Dispatcher::new(Box::new(changed), dir.path()).run(
        &config(json!({"nocache": true})),
        &registry,
        &sink,
    );
    assert_eq!(matrix_of(&outcome.blocks[0]).data, vec![vec![99.0], vec![99.0]]);
}

#[test]
fn uncacheable_source_is_called_every_run() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = TransformRegistry::builtin();
    let sink = MatrixRenderer::new().with_field("v");

    let dispatcher = Dispatcher::new(Box::new(counting(&calls).uncached()), dir.path());
    for _ in 0..2 {
        let outcome = dispatcher.run(&PipelineConfig::default(), &registry, &sink);
        assert_eq!(outcome.status, RunStatus::Rendered);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(dispatcher.cache().entries().is_empty());
    let identity = dispatcher.source().identity();
    assert!(PathCache::open(dir.path(), &identity).entries().is_empty());
}

#[test]
fn call_options_bypass_the_cache() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = TransformRegistry::builtin();
    let sink = MatrixRenderer::new().with_field("v");

    let dispatcher = Dispatcher::new(Box::new(counting(&calls)), dir.path());
    assert!(dispatcher.cache().is_enabled());
    for _ in 0..2 {
        dispatcher.run(&config(json!({"options": "-x"})), &registry, &sink);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert!(dispatcher.cache().entries().is_empty());

    // empty options count as none
    dispatcher.run(&config(json!({"options": ""})), &registry, &sink);
    dispatcher.run(&PipelineConfig::default(), &registry, &sink);
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert_eq!(dispatcher.cache().entries().len(), 2);
}

#[test]
fn unnamed_documents_do_not_share_cache_entries() {
    let dir = TempDir::new().unwrap();
    let registry = TransformRegistry::builtin();
    let sink = MatrixRenderer::new().with_field("v");

    let first = DocumentSource::from_value(json!({"data": {"t1": {"v": 1}, "t2": {"v": 2}}})).unwrap();
    let second = DocumentSource::from_value(json!({"data": {"t1": {"v": 5}, "t2": {"v": 6}}})).unwrap();
    assert_eq!(first.name(), second.name());

    let outcome = Dispatcher::new(Box::new(first), dir.path()).run(&PipelineConfig::default(), &registry, &sink);
    assert_eq!(matrix_of(&outcome.blocks[0]).data, vec![vec![1.0], vec![2.0]]);

    let outcome = Dispatcher::new(Box::new(second), dir.path()).run(&PipelineConfig::default(), &registry, &sink);
    assert_eq!(matrix_of(&outcome.blocks[0]).data, vec![vec![5.0], vec![6.0]]);
}
