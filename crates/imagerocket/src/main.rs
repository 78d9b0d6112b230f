//! imagerocket: crop scanned images to their content from the command line.
//!
//! Loads a pipeline document (or builds the default pipeline from flags),
//! runs it over every input image, and writes `<stem>.cropped.png` files.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin imagerocket -- [OPTIONS] <IMAGES>...
//! ```
//!
//! Logging goes to stderr and is filtered with `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use imagerocket_io::IoError;
use imagerocket_pipeline::{
    NodeGraph, NodeId, PipelineConfig, PipelineError, Scheduler, Serializer, SerializerError,
    build_default_pipeline,
};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Crop images to their content with a configurable node pipeline.
///
/// Without `--pipeline` the default pipeline is used: sample the top-left
/// pixel as the border color, detect the content, expand it, and fill any
/// overhang with the border color.
#[derive(Parser)]
#[command(name = "imagerocket", version)]
struct Cli {
    /// Input images (PNG, JPEG, BMP, WebP).
    images: Vec<PathBuf>,

    /// Load the pipeline from a JSON document instead of building the
    /// default one. `--expand` and `--tolerance` are ignored.
    #[arg(long)]
    pipeline: Option<PathBuf>,

    /// Write the pipeline document to this file.
    #[arg(long)]
    save_pipeline: Option<PathBuf>,

    /// Directory for output images.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Also write every image-viewer snapshot.
    #[arg(long)]
    snapshots: bool,

    /// Pixels added around the detected content (default pipeline).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_EXPAND, allow_negative_numbers = true)]
    expand: i64,

    /// Per-channel color tolerance of the crop detector (default pipeline).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_TOLERANCE)]
    tolerance: u8,

    /// Print the pipeline document as JSON to stdout.
    #[arg(long)]
    print_pipeline: bool,

    /// List the registered node classes and exit.
    #[arg(long)]
    list_nodes: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Io(#[from] IoError),

    #[error("pipeline document: {0}")]
    Document(#[from] SerializerError),

    #[error("failed to encode pipeline document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{}: {source}", path.display())]
    Process {
        path: PathBuf,
        source: PipelineError,
    },

    #[error("cannot create output directory {}: {source}", path.display())]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_graph(cli: &Cli, serializer: &Serializer) -> Result<(NodeGraph, NodeId), CliError> {
    let mut graph = NodeGraph::new();
    let root = if let Some(path) = &cli.pipeline {
        let root = imagerocket_io::read_pipeline(path, serializer, &mut graph)?;
        tracing::info!(path = %path.display(), nodes = graph.len(), "loaded pipeline");
        root
    } else {
        let config = PipelineConfig {
            expand: cli.expand,
            tolerance: cli.tolerance,
        };
        build_default_pipeline(&mut graph, &config)
    };
    Ok((graph, root))
}

fn stem(path: &Path) -> &str {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
}

/// Crop one image and write its outputs.
fn crop_file(
    cli: &Cli,
    graph: &NodeGraph,
    root: NodeId,
    path: &Path,
) -> Result<(), CliError> {
    let input = imagerocket_io::load_image(path)?;
    let result = graph.process(root, input);
    Scheduler::current().run_until_idle();
    let output = result.map_err(|source| CliError::Process {
        path: path.to_path_buf(),
        source,
    })?;

    let stem = stem(path);
    if output.width() == 0 || output.height() == 0 {
        tracing::warn!(path = %path.display(), "no content found, nothing written");
    } else {
        let target = cli.output_dir.join(format!("{stem}.cropped.png"));
        imagerocket_io::save_png(&output, &target)?;
        tracing::info!(
            input = %path.display(),
            output = %target.display(),
            width = output.width(),
            height = output.height(),
            "cropped"
        );
    }

    // Viewers keep every buffer they see; drain them per image.
    let viewers = graph.iter().filter_map(|(_, node)| node.as_viewer());
    for (v, viewer) in viewers.enumerate() {
        let snapshots = viewer.take_snapshots();
        if !cli.snapshots {
            continue;
        }
        for (n, snapshot) in snapshots.into_iter().enumerate() {
            if snapshot.width() == 0 || snapshot.height() == 0 {
                continue;
            }
            let target = cli
                .output_dir
                .join(format!("{stem}.viewer{v}.{n}.png"));
            imagerocket_io::save_png(&snapshot, &target)?;
            tracing::debug!(output = %target.display(), "wrote snapshot");
        }
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<bool, CliError> {
    let serializer = Serializer::with_builtins();

    if cli.list_nodes {
        for class in serializer.enumerate_classes() {
            println!("{class}");
        }
        return Ok(true);
    }

    let (graph, root) = build_graph(cli, &serializer)?;

    if cli.print_pipeline {
        let document = serializer.capture(&graph, root)?;
        println!("{}", serde_json::to_string_pretty(&document)?);
    }
    if let Some(path) = &cli.save_pipeline {
        imagerocket_io::write_pipeline(path, &serializer, &graph, root)?;
        tracing::info!(path = %path.display(), "saved pipeline");
    }

    if cli.images.is_empty() {
        return Ok(true);
    }
    std::fs::create_dir_all(&cli.output_dir).map_err(|source| CliError::OutputDir {
        path: cli.output_dir.clone(),
        source,
    })?;

    let mut ok = true;
    for path in &cli.images {
        if let Err(e) = crop_file(cli, &graph, root, path) {
            eprintln!("Error: {e}");
            ok = false;
        }
    }
    Ok(ok)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
