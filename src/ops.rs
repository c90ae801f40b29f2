//! The standard operations run against a [`DocumentContext`].
//!
//! Every document change that may affect commands is submitted as an [`Op`]; the engine
//! serializes them. [`Op::Process`] is the usual entry point after a document was opened or
//! fragments were inserted: it queues the full cycle as follow-ups, so work submitted in between
//! (say, a close) still runs in submission order.

use std::{fmt, sync::mpsc::Sender};

use crate::{
    config::Settings,
    context::DocumentContext,
    engine::{EngineHandle, Flow, Operation},
    event::Event,
    tree::TreeSnapshot,
};

#[derive(Debug, Clone)]
pub enum Op {
    /// Adds nodes for markers not seen before.
    Scan,
    /// Rounds of scan and execution, bounded by `settings.max_passes`. Pauses when a form was
    /// collected and has to be shown.
    Execute,
    /// Removes insert marks.
    CleanUp,
    /// Writes statuses back into marker names.
    SyncMarkers,
    PruneRetired,
    /// Queues `Scan`, `Execute`, `CleanUp`, `SyncMarkers` and `PruneRetired`.
    Process,
    Ping,
    Snapshot(Sender<TreeSnapshot>),
    /// The document was closed.
    Reset,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Op::Scan => "Scan",
            Op::Execute => "Execute",
            Op::CleanUp => "CleanUp",
            Op::SyncMarkers => "SyncMarkers",
            Op::PruneRetired => "PruneRetired",
            Op::Process => "Process",
            Op::Ping => "Ping",
            Op::Snapshot(_) => "Snapshot",
            Op::Reset => "Reset",
        };
        write!(f, "{label}")
    }
}

fn settings(ctx: &DocumentContext) -> Settings {
    match ctx.config() {
        Ok(config) => config.settings,
        Err(e) => {
            tracing::warn!("Could not read configuration, using defaults: {e}");
            Settings::default()
        }
    }
}

fn execute(ctx: &mut DocumentContext) -> Flow {
    let config = match ctx.config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Not executing commands, configuration unavailable: {e}");
            return Flow::Continue;
        }
    };
    let max_passes = config.settings.max_passes.max(1);
    for pass in 1..=max_passes {
        let scanned = ctx.scan();
        let report = ctx.execute_pass(&config);
        tracing::debug!(
            "Pass {pass}/{max_passes}: {} new node(s), {} executed, {} failed",
            scanned.added,
            report.executed,
            report.failed
        );
        if report.executed == 0 && report.failed == 0 {
            break;
        }
        if pass == max_passes {
            tracing::info!("Stopped after {max_passes} passes with commands possibly left over");
        }
    }
    ctx.prune_retired();

    if !ctx.form.is_pending() {
        return Flow::Continue;
    }
    ctx.form.presented = true;
    let description = ctx
        .form
        .description()
        .map(|form| form.stringify())
        .unwrap_or_default();
    ctx.emit(Event::FormRequested(description));
    Flow::Pause
}

impl Operation<DocumentContext> for Op {
    #[tracing::instrument(skip_all, fields(op = %self))]
    fn execute(
        &mut self,
        ctx: &mut DocumentContext,
        engine: &EngineHandle<DocumentContext>,
    ) -> Flow {
        match self {
            Op::Scan => {
                ctx.scan();
            }
            Op::Execute => return execute(ctx),
            Op::CleanUp => {
                let cleaned = ctx.clean_up();
                tracing::debug!("Removed insert marks of {cleaned} command(s)");
            }
            Op::SyncMarkers => {
                let settings = settings(ctx);
                let report = ctx.sync_markers(&settings);
                tracing::debug!(
                    "Markers: {} renamed, {} removed, {} vanished",
                    report.renamed,
                    report.removed,
                    report.vanished
                );
            }
            Op::PruneRetired => {
                ctx.prune_retired();
            }
            Op::Process => {
                for op in [
                    Op::Scan,
                    Op::Execute,
                    Op::CleanUp,
                    Op::SyncMarkers,
                    Op::PruneRetired,
                ] {
                    if !engine.submit(op) {
                        tracing::warn!("Engine stopped accepting work, processing cut short");
                        break;
                    }
                }
            }
            Op::Ping => ctx.emit(Event::Ping),
            Op::Snapshot(tx) => {
                if tx.send(ctx.tree().snapshot()).is_err() {
                    tracing::debug!("Snapshot receiver gone");
                }
            }
            Op::Reset => ctx.reset(),
        }
        Flow::Continue
    }

    fn label(&self) -> String {
        self.to_string()
    }
}
