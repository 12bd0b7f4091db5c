//! kgviz CLI
//!
//! Reads LLM extraction output, breaks cycles, lays the graph out and
//! prints positioned nodes as JSON for a renderer.

use anyhow::{Context, Result};
use clap::Parser;
use kgviz::{CanvasSize, Direction, Edge, GraphModel, LayoutConfig, PositionedNode, ViewState};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kgviz")]
#[command(about = "Lay out an extracted knowledge graph", long_about = None)]
struct Cli {
    /// Extraction output to read (stdin when omitted)
    input: Option<PathBuf>,

    /// Rank direction: TB, BT, LR or RL
    #[arg(short, long, default_value = "TB")]
    direction: Direction,

    /// JSON file with layout settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node width in pixels
    #[arg(long)]
    node_width: Option<f32>,

    /// Gap between nodes of the same rank
    #[arg(long)]
    node_separation: Option<f32>,

    /// Gap between ranks
    #[arg(long)]
    rank_separation: Option<f32>,

    /// Only show nodes whose label contains this text
    #[arg(long)]
    filter: Option<String>,

    /// Hide everything below this node (repeatable)
    #[arg(long)]
    collapse: Vec<String>,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct RenderedGraph {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    direction: Direction,
    nodes: Vec<PositionedNode>,
    edges: Vec<Edge>,
    size: CanvasSize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&cli)?;

    let raw = match &cli.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };

    let (model, format) = GraphModel::from_json_with_format(&raw)?;
    info!(?format, nodes = model.nodes.len(), edges = model.edges.len(), "parsed extraction");

    let view = ViewState {
        label_filter: cli.filter.clone().unwrap_or_default(),
        collapsed: cli.collapse.iter().cloned().collect(),
        ..ViewState::default()
    };
    let (nodes, edges) = view.apply(&model);

    let layout = kgviz::layout(&nodes, &edges, cli.direction, &config);
    let rendered = RenderedGraph {
        title: model.title,
        direction: cli.direction,
        nodes: layout.nodes,
        edges: layout.edges,
        size: layout.size,
    };

    let output = if cli.pretty {
        serde_json::to_string_pretty(&rendered)?
    } else {
        serde_json::to_string(&rendered)?
    };
    println!("{output}");
    Ok(())
}

fn load_config(cli: &Cli) -> Result<LayoutConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid layout config in {}", path.display()))?
        }
        None => LayoutConfig::default(),
    };

    if let Some(width) = cli.node_width {
        config.node_width = width;
    }
    if let Some(gap) = cli.node_separation {
        config.node_separation = gap;
    }
    if let Some(gap) = cli.rank_separation {
        config.rank_separation = gap;
    }
    Ok(config)
}
