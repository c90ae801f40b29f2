//! doccmd CLI tool
//!
//! Runs the command pipeline against a document fixture, an in-memory stand-in for a real host
//! document.
//!
//! ## Commands
//!
//! - `process --document <fixture.toml>`: scan, execute, clean up and write statuses back, then
//!   print the resulting text and command tree
//! - `scan --document <fixture.toml>`: build the command tree only and report conflicts
//!
//! A fixture holds the body text, optional extra flows and the markers:
//!
//! ```toml
//! text = "Dear ____,"
//!
//! [[markers]]
//! name = "CMD(KIND 'insertValue' ID 'Name')"
//! start = 5
//! end = 9
//! ```
//!
//! Form requests are answered automatically: the requested form is printed and the engine
//! resumed.

use clap::{Parser, Subcommand};
use doccmd_core::{
    config::{ConfigProvider, StaticConfigProvider, TomlConfigProvider},
    context::DocumentContext,
    engine::{Engine, EngineState},
    event::Event,
    host::{HostDocument, MemoryDocument},
    ops::Op,
};
use std::{
    path::PathBuf,
    sync::{mpsc::channel, Arc},
    time::Duration,
};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "doccmd")]
#[command(author, version, about = "Runs document commands against a fixture", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every command of the document
    Process {
        /// Document fixture (TOML)
        #[arg(long)]
        document: PathBuf,

        /// Document configuration (TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the tree snapshot as JSON instead of the indented dump
        #[arg(long)]
        json: bool,

        /// Print every event
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build the command tree without executing anything
    Scan {
        /// Document fixture (TOML)
        #[arg(long)]
        document: PathBuf,

        /// Print the tree snapshot as JSON instead of the indented dump
        #[arg(long)]
        json: bool,
    },
}

fn config_provider(path: Option<PathBuf>) -> Arc<dyn ConfigProvider> {
    match path {
        Some(path) => Arc::new(TomlConfigProvider::new(path)),
        None => Arc::new(StaticConfigProvider::default()),
    }
}

fn print_tree(ctx: &DocumentContext, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&ctx.tree().snapshot())?);
    } else {
        print!("{}", ctx.tree().dump());
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            document,
            config,
            json,
            verbose,
        } => {
            let doc = MemoryDocument::load_fixture(&document)?;
            let (tx, rx) = channel::<Event>();
            let ctx = DocumentContext::new(Box::new(doc.clone()), config_provider(config))
                .with_events(tx);
            let engine = Engine::start(ctx)?;
            engine.submit(Op::Process);

            loop {
                if !engine.handle().wait_settled(SETTLE_TIMEOUT) {
                    eprintln!("Error: processing did not settle within {SETTLE_TIMEOUT:?}");
                    std::process::exit(1);
                }
                for event in rx.try_iter() {
                    match event {
                        Event::FormRequested(form) => println!("Form requested: {form}"),
                        Event::CommandFailed(marker, reason) => {
                            eprintln!("Failed: {marker}: {reason}")
                        }
                        other if verbose => println!("{other}"),
                        _ => {}
                    }
                }
                if engine.state() != EngineState::Paused {
                    break;
                }
                engine.resume();
            }

            let ctx = engine.shutdown()?;
            println!("{}", doc.body());
            let mut remaining = doc.marker_names();
            remaining.sort();
            for name in remaining {
                if let Some(span) = doc.marker_span(&name) {
                    println!("  marker {span} {name}");
                }
            }
            print_tree(&ctx, json)?;
            Ok(())
        }

        Commands::Scan { document, json } => {
            let doc = MemoryDocument::load_fixture(&document)?;
            let mut ctx = DocumentContext::new(Box::new(doc), config_provider(None));
            let report = ctx.scan();
            println!(
                "{} command(s), {} other marker(s), {} conflict(s)",
                report.added, report.ignored, report.conflicts
            );
            print_tree(&ctx, json)?;
            if let Err(e) = ctx.tree().is_balanced() {
                eprintln!("Tree invariants violated:\n- {e}");
                std::process::exit(1);
            }
            Ok(())
        }
    }
}
