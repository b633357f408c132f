//! Per-request orchestration.
//!
//! [`RenderCoordinator::handle`] runs one request through
//! `Acquiring -> Executing -> {Completed | TimedOut | Failed} -> Returning`.
//! Every path ends with the worker either released or discarded, and only a
//! failure to construct a worker escapes as an `Err`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use prerender_js_runtime::{RenderOutcome, RenderRequest, RenderResult};

use crate::config::RenderConfig;
use crate::error::Result;
use crate::factory::WorkerFactory;
use crate::pool::{self, Pool};
use crate::worker::{panic_message, RenderWorker};

enum Execution {
    Completed(RenderResult),
    TimedOut,
    Failed(String),
}

/// Runs render requests against a pool with a per-request deadline.
#[derive(Clone)]
pub struct RenderCoordinator {
    pool: Arc<dyn Pool>,
    render_timeout: Duration,
}

impl RenderCoordinator {
    pub fn new(pool: Arc<dyn Pool>, render_timeout: Duration) -> Self {
        Self {
            pool,
            render_timeout,
        }
    }

    /// Build the configured pool and wrap it.
    pub async fn from_config(config: &RenderConfig, factory: WorkerFactory) -> Result<Self> {
        let pool = pool::from_config(config, factory).await?;
        Ok(Self::new(pool, config.render_timeout()))
    }

    pub fn pool(&self) -> &Arc<dyn Pool> {
        &self.pool
    }

    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }

    /// Render one request.
    ///
    /// Script errors, timeouts, and engine panics all come back as a
    /// [`RenderResult`] with `error` set. The deadline starts when the job is
    /// submitted, not while waiting for a worker.
    ///
    /// Once a worker is acquired the render runs on its own task, so dropping
    /// the returned future never strands the worker: it is still released or
    /// discarded.
    pub async fn handle(&self, request: RenderRequest) -> Result<RenderResult> {
        let worker = self.pool.acquire().await?;
        let execution = tokio::spawn(execute(
            self.pool.clone(),
            self.render_timeout,
            worker,
            request,
        ));
        execution.await?
    }
}

async fn execute(
    pool: Arc<dyn Pool>,
    render_timeout: Duration,
    mut worker: RenderWorker,
    request: RenderRequest,
) -> Result<RenderResult> {
    let worker_id = worker.id();

    let started = Instant::now();
    let deadline = tokio::time::Instant::from_std(started + render_timeout);
    let job = AssertUnwindSafe(async {
        let pending = worker.submit(&request)?;
        pending.wait().await
    })
    .catch_unwind();

    let execution = match tokio::time::timeout_at(deadline, job).await {
        Ok(Ok(Ok(result))) => Execution::Completed(result),
        Ok(Ok(Err(e))) => Execution::Failed(e.to_string()),
        Ok(Err(panic)) => Execution::Failed(format!(
            "Render panicked: {}",
            panic_message(panic.as_ref())
        )),
        Err(_) => Execution::TimedOut,
    };
    let elapsed = started.elapsed();

    match execution {
        Execution::Completed(mut result) => {
            result.render_duration = elapsed;
            if result.correlation_id.is_empty() {
                result.correlation_id = request.correlation_id.clone();
            }
            if result.outcome() == RenderOutcome::Invalid {
                result.error = format!(
                    "Render of {} produced no markup, redirect, or error",
                    request.target_url
                );
            }
            pool.release(worker).await?;
            tracing::debug!(
                worker_id,
                correlation_id = %request.correlation_id,
                url = %request.target_url,
                elapsed_ms = elapsed.as_millis() as u64,
                "Render completed"
            );
            Ok(result)
        }

        Execution::TimedOut => {
            tracing::warn!(
                worker_id,
                correlation_id = %request.correlation_id,
                url = %request.target_url,
                "Render timed out; discarding worker"
            );
            pool.discard(worker).await?;
            Ok(RenderResult::failure(
                request.correlation_id,
                format!(
                    "Render timeout on {} after {:?}",
                    request.target_url, render_timeout
                ),
                elapsed,
            ))
        }

        Execution::Failed(message) => {
            tracing::warn!(
                worker_id,
                correlation_id = %request.correlation_id,
                url = %request.target_url,
                "Render failed: {}",
                message
            );
            pool.discard(worker).await?;
            Ok(RenderResult::failure(request.correlation_id, message, elapsed))
        }
    }
}
