//! Mne command line
//!
//! - `render`: print the rendered markup of a note
//! - `preview`: print the preview markup of a note
//! - `run`: run every automation block of a note against a workspace
//! - `tasks`: list the registered tasks
//! - `reference`: print the automation quick reference

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mne::automation::{ExecutionStatus, OutputEvent, RunReport, TaskRegistry};
use mne::core::{AppConfig, Document};
use mne::markup::AUTOMATION_QUICK_REFERENCE;
use mne::MneApp;

/// Mne - markdown notes with automation blocks.
#[derive(Parser)]
#[command(name = "mne", version, about)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered markup of a note.
    Render { file: PathBuf },
    /// Print the preview markup of a note.
    Preview { file: PathBuf },
    /// Run every automation block of a note.
    Run {
        file: PathBuf,
        /// Workspace directory the scripts operate on
        #[arg(short, long)]
        workspace: Option<PathBuf>,
        /// Print output events and the summary as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// List registered tasks.
    Tasks,
    /// Print the automation quick reference.
    Reference,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing_subscriber::filter::LevelFilter::DEBUG
    } else {
        tracing_subscriber::filter::LevelFilter::INFO
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(level)
        .init();

    let result = match cli.command {
        Commands::Render { file } => Document::open(&file).map(|doc| {
            println!("{}", doc.render().html);
            true
        }),
        Commands::Preview { file } => Document::open(&file).map(|doc| {
            println!("{}", doc.preview());
            true
        }),
        Commands::Run {
            file,
            workspace,
            json,
        } => run(&file, workspace.as_deref(), json).await,
        Commands::Tasks => {
            for task in TaskRegistry::with_builtins().list() {
                println!("{:<12} {}", task.name, task.description);
            }
            Ok(true)
        }
        Commands::Reference => {
            print!("{AUTOMATION_QUICK_REFERENCE}");
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Run all blocks of `file`; `Ok(false)` when any block failed
async fn run(file: &Path, workspace: Option<&Path>, json: bool) -> Result<bool> {
    let config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("Using default config: {:#}", e);
        AppConfig::default()
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut app = MneApp::new(config, workspace)?.with_output(tx);
    tracing::info!("Workspace: {}", app.workspace().display());
    if let Err(e) = app.remember_workspace() {
        tracing::warn!("Failed to remember workspace: {:#}", e);
    }

    // The app owns the sender; dropping it ends the printer loop
    let runner = async move { app.run_file(file).await };
    let printer = async {
        while let Some(event) = rx.recv().await {
            print_event(&event, json);
        }
    };
    let (reports, ()) = tokio::join!(runner, printer);
    let reports = reports?;

    print_summary(&reports, json);
    Ok(reports
        .iter()
        .all(|report| report.status == ExecutionStatus::Succeeded))
}

fn print_event(event: &OutputEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::error!("Failed to encode output event: {}", e),
        }
        return;
    }
    match event {
        OutputEvent::Line { context_id, line } => {
            println!("[{context_id}] {:<7} {}", line.kind, line.text)
        }
        OutputEvent::Cleared { .. } => {}
    }
}

fn print_summary(reports: &[RunReport], json: bool) {
    if json {
        for report in reports {
            let summary = serde_json::json!({
                "event": "summary",
                "context_id": report.context_id,
                "status": report.status,
            });
            println!("{summary}");
        }
        return;
    }
    println!();
    for report in reports {
        let status = match report.status {
            ExecutionStatus::Succeeded => "ok",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Idle => "skipped",
        };
        println!("{:<16} {}", report.context_id, status);
    }
}
