//! Worker pools.
//!
//! A [`Pool`] hands out exclusive [`RenderWorker`]s and takes them back. Two
//! policies exist:
//!
//! - [`FixedPool`]: a prewarmed set of workers; waits when all are busy
//! - [`OnDemandPool`]: a fresh worker per acquire, disposed after use
//!
//! Both report their bookkeeping through [`PoolStatus`].

mod fixed;
mod on_demand;

pub use fixed::FixedPool;
pub use on_demand::OnDemandPool;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::RenderConfig;
use crate::error::Result;
use crate::factory::WorkerFactory;
use crate::worker::{join_thread, RenderWorker};

/// Upper bound on host-side cleanup of a worker that finished its job.
pub(crate) const RELEASE_GRACE: Duration = Duration::from_secs(1);

/// Source of exclusive render workers.
#[async_trait]
pub trait Pool: Send + Sync {
    /// Take an idle worker. May wait for one to be returned.
    async fn acquire(&self) -> Result<RenderWorker>;

    /// Return a worker whose job completed normally.
    async fn release(&self, worker: RenderWorker) -> Result<()>;

    /// Hand back a worker that must not be reused.
    ///
    /// Fails only when a replacement cannot be constructed.
    async fn discard(&self, worker: RenderWorker) -> Result<()>;

    fn status(&self) -> PoolStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolMode {
    Fixed,
    OnDemand,
}

/// Snapshot of a pool's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub mode: PoolMode,
    /// Configured size; `None` for on-demand pools
    pub size: Option<usize>,
    /// Workers built and not yet disposed
    pub live: u64,
    /// Workers waiting in the idle queue
    pub idle: usize,
    pub created_total: u64,
    pub disposed_total: u64,
}

/// Build the pool the configuration asks for.
pub async fn from_config(config: &RenderConfig, factory: WorkerFactory) -> Result<Arc<dyn Pool>> {
    config.validate()?;
    if config.debug {
        tracing::info!("Using on-demand render workers");
        Ok(Arc::new(OnDemandPool::new(factory)))
    } else {
        Ok(Arc::new(FixedPool::new(factory, config.pool_size).await?))
    }
}

#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    created: AtomicU64,
    disposed: AtomicU64,
}

impl PoolCounters {
    pub(crate) fn created(&self) {
        self.created.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn created_total(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }

    pub(crate) fn disposed_total(&self) -> u64 {
        self.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn live(&self) -> u64 {
        self.created_total().saturating_sub(self.disposed_total())
    }
}

/// Dispose `worker` without waiting for its thread.
///
/// The bridge is closed and shutdown signalled at once; the join happens on
/// the blocking pool, so a script stuck in a host call cannot hold up the
/// caller.
pub(crate) fn retire(mut worker: RenderWorker, counters: &PoolCounters) {
    let id = worker.id();
    if let Some(handle) = worker.stop() {
        tokio::task::spawn_blocking(move || join_thread(id, handle));
    }
    counters.disposed.fetch_add(1, Ordering::SeqCst);
}
