//! Trackreport CLI - Build report matrices and tables from nested results
//!
//! # Main Commands
//!
//! ```bash
//! trackreport run results.json --field mean       # Run the pipeline, print blocks as JSON
//! trackreport run results.json --table -f csv     # Render a table as CSV
//! trackreport serve                               # Start HTTP server (port 3000)
//! ```
//!
//! # Inspection Commands
//!
//! ```bash
//! trackreport paths results.json     # Show the label sets of a document
//! trackreport operators              # Show matrix operators and transforms
//! trackreport cache list <identity>  # List cached entries of a source
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use trackreport::{
    api::init_tracing, blocks_to_csv, operators_description, parse_operators, transforms_description, DataSource,
    Dispatcher, DocumentSource, MatrixRenderer, PathCache, PipelineConfig, RenderSink, RunStatus, TableRenderer,
    TransformRegistry, TransformStep, DEFAULT_CACHE_DIR,
};

#[derive(Parser)]
#[command(name = "trackreport")]
#[command(about = "Collect nested results and project them into report matrices and tables", long_about = None)]
struct Cli {
    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Cache directory (default: $TRACKREPORT_CACHE_DIR or .trackreport/cache)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on a source document
    Run {
        /// Source document (JSON)
        input: PathBuf,

        /// Pipeline configuration file (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Grouping: track, slice, all or none
        #[arg(long)]
        groupby: Option<String>,

        /// Tracks to collect (comma-separated, r(regex) allowed)
        #[arg(long)]
        tracks: Option<String>,

        /// Slices to collect
        #[arg(long)]
        slices: Option<String>,

        /// Keep only paths with a matching label
        #[arg(long)]
        restrict: Option<String>,

        /// Drop paths with a matching label
        #[arg(long)]
        exclude: Option<String>,

        /// Transform step as JSON, e.g. '{"type":"stats"}' (repeatable)
        #[arg(long = "transform")]
        transforms: Vec<String>,

        /// Bypass the cache
        #[arg(long)]
        nocache: bool,

        /// Field picked from the deepest level (matrix output)
        #[arg(long)]
        field: Option<String>,

        /// Matrix operators (comma-separated)
        #[arg(long)]
        operators: Option<String>,

        /// Render a display table instead of a matrix
        #[arg(long)]
        table: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the label sets of a source document
    Paths {
        /// Source document (JSON)
        input: PathBuf,
    },

    /// Show available matrix operators and transforms
    Operators,

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },

    /// Manage the path cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached entries of a source
    List {
        /// Source identity, as printed by `trackreport paths`
        identity: String,
    },

    /// Remove all cached entries of a source
    Clear {
        /// Source identity
        identity: String,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    let cache_dir = resolve_cache_dir(cli.cache_dir);

    let result = match cli.command {
        Commands::Run {
            input,
            config,
            groupby,
            tracks,
            slices,
            restrict,
            exclude,
            transforms,
            nocache,
            field,
            operators,
            table,
            format,
            output,
        } => {
            let overrides = PipelineConfig {
                groupby,
                tracks,
                slices,
                restrict,
                exclude,
                nocache,
                ..Default::default()
            };
            cmd_run(
                &input,
                config.as_deref(),
                overrides,
                &transforms,
                RendererArgs { field, operators, table },
                format,
                output.as_deref(),
                &cache_dir,
            )
        }

        Commands::Paths { input } => cmd_paths(&input),

        Commands::Operators => cmd_operators(),

        Commands::Serve { port } => cmd_serve(port, cache_dir).await,

        Commands::Cache { action } => cmd_cache(action, &cache_dir),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn resolve_cache_dir(arg: Option<PathBuf>) -> PathBuf {
    arg.or_else(|| std::env::var_os("TRACKREPORT_CACHE_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR))
}

struct RendererArgs {
    field: Option<String>,
    operators: Option<String>,
    table: bool,
}

impl RendererArgs {
    fn build(self) -> Result<Box<dyn RenderSink>, Box<dyn std::error::Error>> {
        if self.table {
            return Ok(Box::new(TableRenderer::default()));
        }
        let mut renderer = MatrixRenderer::new();
        if let Some(field) = self.field.as_deref() {
            renderer = renderer.with_field(field);
        }
        if let Some(list) = self.operators.as_deref() {
            renderer = renderer.with_operators(parse_operators(list)?);
        }
        Ok(Box::new(renderer))
    }
}

/// Flags win over the configuration file when given.
fn merge_config(base: PipelineConfig, overrides: PipelineConfig, transforms: Vec<TransformStep>) -> PipelineConfig {
    PipelineConfig {
        groupby: overrides.groupby.or(base.groupby),
        tracks: overrides.tracks.or(base.tracks),
        slices: overrides.slices.or(base.slices),
        restrict: overrides.restrict.or(base.restrict),
        exclude: overrides.exclude.or(base.exclude),
        nocache: overrides.nocache || base.nocache,
        transforms: if transforms.is_empty() { base.transforms } else { transforms },
        ..base
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_run(
    input: &Path,
    config_path: Option<&Path>,
    overrides: PipelineConfig,
    transforms: &[String],
    renderer: RendererArgs,
    format: OutputFormat,
    output: Option<&Path>,
    cache_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", input.display());

    let base = match config_path {
        Some(path) => PipelineConfig::from_json(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    let steps = transforms
        .iter()
        .map(|t| serde_json::from_str::<TransformStep>(t))
        .collect::<Result<Vec<_>, _>>()?;
    let config = merge_config(base, overrides, steps);

    let source = DocumentSource::from_file(input)?;
    eprintln!("   Source: {}", source.identity());

    let sink = renderer.build()?;
    let dispatcher = Dispatcher::new(Box::new(source), cache_dir);
    let outcome = dispatcher.run(&config, &TransformRegistry::builtin(), sink.as_ref());

    let errors = outcome.errors().count();
    match &outcome.status {
        RunStatus::Rendered if errors > 0 => {
            eprintln!("   ⚠️  {} blocks, {} errors", outcome.blocks.len(), errors)
        }
        RunStatus::Rendered => eprintln!("   ✅ {} blocks", outcome.blocks.len()),
        RunStatus::NoData { stage, reason } => eprintln!("   📭 No data at {}: {}", stage, reason),
        RunStatus::Failed { stage } => eprintln!("   ❌ Failed at {}", stage),
    }

    let content = match format {
        OutputFormat::Json => serde_json::to_string_pretty(&outcome)?,
        OutputFormat::Csv => blocks_to_csv(&outcome.blocks)?,
    };
    write_output(&content, output)?;

    if outcome.is_failed() {
        return Err("pipeline failed".into());
    }
    Ok(())
}

fn cmd_paths(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let source = DocumentSource::from_file(input)?;
    eprintln!("📄 {} ({})", input.display(), source.identity());

    for (level, labels) in source.data_paths().iter().enumerate() {
        println!("  level {}: {}", level, labels.join(", "));
    }
    Ok(())
}

fn cmd_operators() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", operators_description());
    println!("{}", transforms_description());
    Ok(())
}

async fn cmd_serve(port: u16, cache_dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    trackreport::server::start_server(port, cache_dir).await
}

fn cmd_cache(action: CacheAction, cache_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CacheAction::List { identity } => {
            let cache = PathCache::open(cache_dir, &identity);
            let entries = cache.entries();
            if entries.is_empty() {
                eprintln!("📋 No cached entries for '{}'.", identity);
                return Ok(());
            }

            eprintln!("📋 Cached entries ({}):\n", entries.len());
            for entry in entries {
                println!("  📄 {}", entry.key);
                println!("     Stored: {}", entry.stored_at);
                println!("     Kind: {}", entry.value.kind());
            }
        }

        CacheAction::Clear { identity } => {
            let cache = PathCache::open(cache_dir, &identity);
            let removed = cache.clear();
            eprintln!("🗑️  Removed {} entries for '{}'", removed, identity);
        }
    }

    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
