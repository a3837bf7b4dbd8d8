use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use flowline_client::codec::{encode_validate, EncodeOptions};
use flowline_client::{decode_saved_graph, ExecutionSession, RunMode, RunState, RunnerClient};
use flowline_core::document::GraphDocument;
use flowline_core::error::FlowlineError;
use flowline_core::event::ExecutionEvent;
use flowline_core::RunnerConfig;

#[derive(Parser)]
#[command(name = "flowline", version, about = "Client for a remote graph-execution runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "flowline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a graph and stream its execution live
    Run {
        /// Path to a saved graph JSON file
        graph: PathBuf,
        /// Run input as a JSON document
        #[arg(short, long, default_value = "{}")]
        input: String,
        /// Open a resumable run that can suspend at interrupt nodes
        #[arg(long)]
        hitl: bool,
        /// Override the configured recursion limit
        #[arg(long)]
        recursion_limit: Option<u32>,
    },
    /// Ask the remote validator whether a graph is executable
    Validate {
        graph: PathBuf,
    },
    /// Manage graphs saved on the runner
    Graphs {
        #[command(subcommand)]
        command: GraphCommands,
    },
}

#[derive(Subcommand)]
enum GraphCommands {
    /// List saved graphs
    List,
    /// Upload a graph file
    Save {
        graph: PathBuf,
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Print one saved graph
    Show { id: String },
    /// Delete a saved graph
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("flowline=info,warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            graph,
            input,
            hitl,
            recursion_limit,
        } => cmd_run(&config, &graph, &input, hitl, recursion_limit).await,
        Commands::Validate { graph } => cmd_validate(&config, &graph).await,
        Commands::Graphs { command } => cmd_graphs(&config, command).await,
    }
}

fn load_config(path: &PathBuf) -> anyhow::Result<RunnerConfig> {
    match RunnerConfig::load(path) {
        Ok(config) => Ok(config),
        Err(FlowlineError::ConfigNotFound(_)) => Ok(RunnerConfig::from_env()),
        Err(e) => Err(e).context("failed to load config"),
    }
}

fn load_graph(path: &PathBuf) -> anyhow::Result<GraphDocument> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let saved: GraphDocument =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a graph", path.display()))?;
    Ok(decode_saved_graph(&saved))
}

async fn cmd_run(
    config: &RunnerConfig,
    graph: &PathBuf,
    input: &str,
    hitl: bool,
    recursion_limit: Option<u32>,
) -> anyhow::Result<()> {
    let doc = load_graph(graph)?;
    let client = Arc::new(RunnerClient::new(config));
    let session = ExecutionSession::new(client).with_options(EncodeOptions {
        recursion_limit: recursion_limit.or(config.recursion_limit),
    });

    // Live event printer
    let mut rx = session.bus().subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            print_event(&event);
        }
    });

    // Ctrl-C requests cooperative cancellation
    let canceller = session.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let mode = if hitl { RunMode::Resumable } else { RunMode::Standard };
    let mut result = session.start(&doc, input, mode).await;

    while session.state() == RunState::Interrupted {
        let Some(interrupt) = session.interrupt() else {
            break;
        };
        println!("run suspended: {}", interrupt.interrupt_value);
        let answer: String = dialoguer::Input::new()
            .with_prompt("resume value")
            .interact_text()
            .context("failed to read resume value")?;
        // Bare text becomes a JSON string
        let value = serde_json::from_str(&answer).unwrap_or(Value::String(answer));
        result = session.resume(value).await;
    }
    printer.abort();

    match result {
        Ok(()) => {
            println!("run completed");
            if let Some(output) = session.output() {
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            println!("run cancelled");
            Ok(())
        }
        Err(e) => {
            if let Some(message) = session.last_error() {
                warn!(message, "run failed");
            }
            Err(e).context("run failed")
        }
    }
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::NodeStart { node_id } => println!("▶ {node_id}"),
        ExecutionEvent::NodeEnd {
            node_id,
            step_number,
            ..
        } => println!("✓ {node_id} (step {step_number})"),
        ExecutionEvent::Interrupted { session_id, .. } => {
            println!("⏸ interrupted (session {session_id})");
        }
        ExecutionEvent::Error { message } => eprintln!("✗ {message}"),
        ExecutionEvent::Complete { .. } => {}
    }
}

async fn cmd_validate(config: &RunnerConfig, graph: &PathBuf) -> anyhow::Result<()> {
    let doc = load_graph(graph)?;
    let client = RunnerClient::new(config);
    let report = client.validate(&encode_validate(&doc)).await?;
    if report.valid {
        println!("graph is valid");
        Ok(())
    } else {
        for error in &report.errors {
            eprintln!("✗ {error}");
        }
        anyhow::bail!("graph failed validation ({} errors)", report.errors.len());
    }
}

async fn cmd_graphs(config: &RunnerConfig, command: GraphCommands) -> anyhow::Result<()> {
    let client = RunnerClient::new(config);
    match command {
        GraphCommands::List => {
            for graph in client.list_graphs().await? {
                println!(
                    "{}  {}  ({} nodes, updated {})",
                    graph.id,
                    graph.name,
                    graph.graph_data.nodes.len(),
                    graph.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        GraphCommands::Save {
            graph,
            name,
            description,
        } => {
            let doc = load_graph(&graph)?;
            let saved = client
                .create_graph(&name, description.as_deref(), &doc)
                .await?;
            println!("saved as {}", saved.id);
            Ok(())
        }
        GraphCommands::Show { id } => {
            let saved = client.get_graph(&id).await?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
            Ok(())
        }
        GraphCommands::Delete { id } => {
            client.delete_graph(&id).await?;
            println!("deleted {id}");
            Ok(())
        }
    }
}
