//! The interpreter thread behind a [`RenderWorker`](super::RenderWorker).
//!
//! Each worker runs a current-thread tokio runtime on its own OS thread. The
//! engine is created here and never leaves; the loop waits on shutdown,
//! commands, and the script's next timer.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use prerender_js_runtime::{EngineError, EngineLoader, HostBridge, ScriptEngine};

use super::command::WorkerCommand;

pub(crate) async fn run_worker(
    id: u64,
    loader: Arc<dyn EngineLoader>,
    bundle: PathBuf,
    bridge: HostBridge,
    mut cmd_rx: mpsc::UnboundedReceiver<WorkerCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    init_tx: std::sync::mpsc::SyncSender<Result<(), EngineError>>,
) {
    let loaded = catch_unwind(AssertUnwindSafe(|| loader.load(&bundle, bridge.clone())));
    let mut engine = match loaded {
        Ok(Ok(engine)) => engine,
        Ok(Err(e)) => {
            let _ = init_tx.send(Err(e));
            return;
        }
        Err(panic) => {
            let _ = init_tx.send(Err(EngineError::Init(format!(
                "engine panicked while loading: {}",
                panic_message(panic.as_ref())
            ))));
            return;
        }
    };
    let _ = init_tx.send(Ok(()));
    tracing::debug!(worker_id = id, "Interpreter loop started");

    loop {
        if *shutdown_rx.borrow() || bridge.is_closed() {
            break;
        }

        let wake = engine.next_timer();

        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::debug!(worker_id = id, "Command channel closed");
                    break;
                };
                if !handle_command(id, engine.as_mut(), cmd) {
                    break;
                }
            }

            _ = tokio::time::sleep(wake.unwrap_or_default()), if wake.is_some() => {
                match catch_unwind(AssertUnwindSafe(|| engine.run_due_timers())) {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::warn!(worker_id = id, "Script timer failed: {}", e);
                        bridge.fail(e.to_string());
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        tracing::error!(worker_id = id, "Engine panicked in timer: {}", message);
                        bridge.fail(format!("Render worker panicked: {}", message));
                        break;
                    }
                }
            }
        }
    }

    // Teardown: nothing scheduled may survive, then release the heap.
    let teardown = catch_unwind(AssertUnwindSafe(move || {
        engine.flush_timers();
        engine.collect_garbage();
        drop(engine);
    }));
    if teardown.is_err() {
        tracing::error!(worker_id = id, "Engine panicked during teardown");
    }
    tracing::debug!(worker_id = id, "Interpreter loop finished");
}

/// Returns `false` when the loop must stop.
fn handle_command(id: u64, engine: &mut dyn ScriptEngine, cmd: WorkerCommand) -> bool {
    match cmd {
        WorkerCommand::Render { request, accepted } => {
            match catch_unwind(AssertUnwindSafe(|| engine.dispatch(&request))) {
                Ok(Ok(())) => {
                    let _ = accepted.send(Ok(()));
                    true
                }
                Ok(Err(e)) => {
                    tracing::debug!(
                        worker_id = id,
                        correlation_id = %request.correlation_id,
                        "Script rejected render: {}",
                        e
                    );
                    let _ = accepted.send(Err(e.to_string()));
                    true
                }
                Err(panic) => {
                    let message = format!("engine panicked: {}", panic_message(panic.as_ref()));
                    tracing::error!(worker_id = id, "{}", message);
                    let _ = accepted.send(Err(message));
                    false
                }
            }
        }

        WorkerCommand::FlushTimers { reply } => {
            engine.flush_timers();
            let _ = reply.send(());
            true
        }

        WorkerCommand::Reclaim { reply } => {
            engine.collect_garbage();
            let _ = reply.send(());
            true
        }
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
