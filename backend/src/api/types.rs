//! REST API types.
//!
//! A run request carries the source document inline, so the server stays
//! stateless apart from the path cache.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::pipeline::{PipelineConfig, RunOutcome, RunStatus};
use crate::render::{MatrixRenderer, RenderSink, TableRenderer};

/// Renderer selection, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RendererConfig {
    Matrix(MatrixRenderer),
    Table(TableRenderer),
}

impl Default for RendererConfig {
    fn default() -> Self {
        RendererConfig::Matrix(MatrixRenderer::default())
    }
}

impl RendererConfig {
    pub fn sink(&self) -> &dyn RenderSink {
        match self {
            RendererConfig::Matrix(renderer) => renderer,
            RendererConfig::Table(renderer) => renderer,
        }
    }
}

/// Body of `POST /api/run`.
///
/// ```json
/// {
///   "document": {"name": "expression", "data": {"wt": {"v": 1}}},
///   "config": {"groupby": "all"},
///   "renderer": {"type": "matrix", "field": "v", "operators": ["normalized-row-total"]}
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RunRequest {
    /// Source document (see [`crate::source::SourceDocument`])
    pub document: Value,
    #[serde(default)]
    pub config: PipelineConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
}

/// Response sent after one pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// Unique run identifier
    pub run_id: String,
    /// Identity of the data source (cache scope)
    pub source: String,
    #[serde(flatten)]
    pub outcome: RunOutcome,
    pub metadata: RunMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub total_blocks: usize,
    pub error_blocks: usize,
    pub cached: bool,
}

impl RunResponse {
    pub fn new(source: String, cached: bool, outcome: RunOutcome) -> Self {
        let metadata = RunMetadata {
            total_blocks: outcome.blocks.len(),
            error_blocks: outcome.errors().count(),
            cached,
        };
        Self {
            run_id: Uuid::new_v4().to_string(),
            source,
            outcome,
            metadata,
        }
    }

    /// HTTP-ish status word: `ready`, `warning` (some error blocks),
    /// `empty` or `error`.
    pub fn summary(&self) -> &'static str {
        match &self.outcome.status {
            RunStatus::Failed { .. } => "error",
            RunStatus::NoData { .. } => "empty",
            RunStatus::Rendered if self.metadata.error_blocks > 0 => "warning",
            RunStatus::Rendered => "ready",
        }
    }
}

/// Error body for requests that never reached the pipeline.
pub fn error_response(error: &str) -> Value {
    json!({
        "runId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "blocks": [],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::render::Block;

    #[test]
    fn test_request_defaults() {
        let request: RunRequest = serde_json::from_value(json!({
            "document": {"data": {"t1": 1}}
        }))
        .unwrap();
        assert!(matches!(request.renderer, RendererConfig::Matrix(_)));
        assert_eq!(request.renderer.sink().name(), "matrix");
        assert!(request.config.groupby.is_none());
    }

    #[test]
    fn test_table_renderer_request() {
        let request: RunRequest = serde_json::from_value(json!({
            "document": {"data": {}},
            "renderer": {"type": "table", "missing": "-"}
        }))
        .unwrap();
        assert_eq!(request.renderer.sink().name(), "table");
    }

    #[test]
    fn test_response_shape() {
        let outcome = RunOutcome {
            status: RunStatus::Rendered,
            blocks: vec![Block::error(Stage::Collect, &["t2".to_string()], "down")],
        };
        let response = RunResponse::new("document:x".into(), true, outcome);
        assert_eq!(response.summary(), "warning");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "rendered");
        assert_eq!(json["source"], "document:x");
        assert_eq!(json["metadata"]["errorBlocks"], 1);
        assert_eq!(json["blocks"][0]["stage"], "collect");
        assert!(json["runId"].is_string());
    }
}
