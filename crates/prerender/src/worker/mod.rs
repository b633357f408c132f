//! Render workers.
//!
//! A [`RenderWorker`] is the host-side handle to one script interpreter
//! running on a dedicated OS thread. The handle is owned by exactly one party
//! at a time (the pool's idle queue or a single in-flight render) and is
//! moved, never shared.
//!
//! # Lifecycle
//!
//! ```text
//! spawn ─► Idle ─submit─► Busy ─mark_idle─► Idle
//!                          │
//!                          └──────dispose──► Disposed (terminal)
//! ```

mod command;
mod thread;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use prerender_js_runtime::{EngineError, EngineLoader, HostBridge, RenderRequest, RenderResult};

use crate::error::{Error, Result};
use command::WorkerCommand;

pub(crate) use thread::panic_message;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Where a worker is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Busy,
    Disposed,
}

/// Handle to one interpreter thread.
pub struct RenderWorker {
    id: u64,
    state: WorkerState,
    bridge: HostBridge,
    cmd_tx: mpsc::UnboundedSender<WorkerCommand>,
    shutdown_tx: watch::Sender<bool>,
    thread_handle: Option<std::thread::JoinHandle<()>>,
    jobs: u64,
}

impl RenderWorker {
    /// Start an interpreter thread and load `bundle` into it.
    ///
    /// Blocks until the bundle has been evaluated. Load failures come back as
    /// [`Error::Construction`].
    pub(crate) fn spawn(
        loader: Arc<dyn EngineLoader>,
        bundle: PathBuf,
        bridge: HostBridge,
    ) -> Result<Self> {
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::SeqCst);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (init_tx, init_rx) = std::sync::mpsc::sync_channel(1);

        let thread_bridge = bridge.clone();
        let thread_handle = std::thread::Builder::new()
            .name(format!("render-worker-{id}"))
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        let _ = init_tx.send(Err(EngineError::Init(format!(
                            "failed to start worker runtime: {e}"
                        ))));
                        return;
                    }
                };
                rt.block_on(thread::run_worker(
                    id,
                    loader,
                    bundle,
                    thread_bridge,
                    cmd_rx,
                    shutdown_rx,
                    init_tx,
                ));
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                return Err(Error::Construction(e));
            }
            Err(_) => {
                let _ = thread_handle.join();
                return Err(Error::Construction(EngineError::Init(
                    "worker thread exited while loading".to_string(),
                )));
            }
        }

        tracing::debug!(worker_id = id, "Render worker ready");

        Ok(Self {
            id,
            state: WorkerState::Idle,
            bridge,
            cmd_tx,
            shutdown_tx,
            thread_handle: Some(thread_handle),
            jobs: 0,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Jobs submitted over this worker's lifetime.
    pub fn jobs(&self) -> u64 {
        self.jobs
    }

    /// The bridge the interpreter posts results through.
    pub fn bridge(&self) -> &HostBridge {
        &self.bridge
    }

    /// Whether the interpreter thread is still running.
    pub fn is_alive(&self) -> bool {
        self.thread_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Hand a render job to the interpreter.
    ///
    /// The result slot is armed before the job is sent, so a script that
    /// reports synchronously cannot race the waiter. Only an idle worker
    /// accepts work.
    pub fn submit(&mut self, request: &RenderRequest) -> Result<PendingRender> {
        if self.state != WorkerState::Idle {
            return Err(Error::InvalidState {
                id: self.id,
                state: self.state,
            });
        }

        let result = self.bridge.slot().arm(&request.correlation_id);
        let (accepted_tx, accepted) = oneshot::channel();
        self.cmd_tx
            .send(WorkerCommand::Render {
                request: request.clone(),
                accepted: accepted_tx,
            })
            .map_err(|_| Error::WorkerGone(self.id))?;

        self.state = WorkerState::Busy;
        self.jobs += 1;
        tracing::trace!(
            worker_id = self.id,
            correlation_id = %request.correlation_id,
            "Render submitted"
        );

        Ok(PendingRender {
            worker_id: self.id,
            accepted,
            result,
        })
    }

    /// Cancel every timer the script still has registered.
    pub async fn flush_pending_timers(&self) -> Result<()> {
        self.round_trip(|reply| WorkerCommand::FlushTimers { reply })
            .await
    }

    /// Ask the interpreter to collect garbage.
    pub async fn reclaim(&self) -> Result<()> {
        self.round_trip(|reply| WorkerCommand::Reclaim { reply }).await
    }

    async fn round_trip<F>(&self, make_cmd: F) -> Result<()>
    where
        F: FnOnce(oneshot::Sender<()>) -> WorkerCommand,
    {
        if self.state == WorkerState::Disposed {
            return Err(Error::InvalidState {
                id: self.id,
                state: self.state,
            });
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(make_cmd(reply_tx))
            .map_err(|_| Error::WorkerGone(self.id))?;
        reply_rx.await.map_err(|_| Error::WorkerGone(self.id))
    }

    /// Return a busy worker to idle after its job completed.
    pub fn mark_idle(&mut self) {
        if self.state == WorkerState::Busy {
            self.state = WorkerState::Idle;
        }
    }

    /// Tear the interpreter down. Idempotent.
    ///
    /// Closes the bridge first, which makes late posts no-ops and interrupts
    /// a script that is still running, then stops and joins the thread.
    /// Blocks until the thread has exited.
    pub fn dispose(&mut self) {
        if let Some(handle) = self.stop() {
            join_thread(self.id, handle);
        }
    }

    /// Signal the interpreter to stop without waiting for it.
    ///
    /// Returns the thread handle the first time; the caller decides whether
    /// and where to join it. A script blocked in a host call keeps the thread
    /// alive until that call returns.
    pub(crate) fn stop(&mut self) -> Option<std::thread::JoinHandle<()>> {
        if self.state == WorkerState::Disposed {
            return None;
        }
        self.state = WorkerState::Disposed;

        self.bridge.close();
        let _ = self.shutdown_tx.send(true);
        tracing::debug!(worker_id = self.id, jobs = self.jobs, "Render worker disposed");
        self.thread_handle.take()
    }
}

/// Wait for an interpreter thread to exit.
pub(crate) fn join_thread(id: u64, handle: std::thread::JoinHandle<()>) {
    if handle.join().is_err() {
        tracing::warn!(worker_id = id, "Render worker thread panicked");
    }
}

impl Drop for RenderWorker {
    // Never blocks: the thread winds down on its own once signalled.
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl std::fmt::Debug for RenderWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderWorker")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("jobs", &self.jobs)
            .finish()
    }
}

/// A submitted render awaiting its result.
#[derive(Debug)]
#[must_use = "a pending render does nothing unless awaited"]
pub struct PendingRender {
    worker_id: u64,
    accepted: oneshot::Receiver<std::result::Result<(), String>>,
    result: oneshot::Receiver<RenderResult>,
}

impl PendingRender {
    /// Wait for the script to accept the job, then for its result.
    ///
    /// Never times out on its own; callers bound it with a deadline.
    pub async fn wait(self) -> Result<RenderResult> {
        match self.accepted.await {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                return Err(Error::Rejected {
                    id: self.worker_id,
                    message,
                })
            }
            Err(_) => return Err(Error::WorkerGone(self.worker_id)),
        }
        self.result
            .await
            .map_err(|_| Error::WorkerGone(self.worker_id))
    }
}
