//! Prewarmed fixed-size pool.
//!
//! Idle workers sit in a bounded channel whose capacity equals the pool size.
//! Acquirers take turns on the receiving end, so waiters are served in the
//! order they arrived. Releasing never blocks: the channel always has room
//! for a worker that came out of it.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use crate::error::{Error, Result};
use crate::factory::WorkerFactory;
use crate::worker::RenderWorker;

use super::{retire, Pool, PoolCounters, PoolMode, PoolStatus, RELEASE_GRACE};

pub struct FixedPool {
    factory: WorkerFactory,
    size: usize,
    idle_tx: mpsc::Sender<RenderWorker>,
    idle_rx: Mutex<mpsc::Receiver<RenderWorker>>,
    counters: PoolCounters,
}

impl FixedPool {
    /// Build `size` workers up front.
    ///
    /// Any construction failure aborts pool creation; workers already built
    /// are disposed as the pool is dropped.
    pub async fn new(factory: WorkerFactory, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("pool size must be at least 1".to_string()));
        }

        let (idle_tx, idle_rx) = mpsc::channel(size);
        let pool = Self {
            factory,
            size,
            idle_tx,
            idle_rx: Mutex::new(idle_rx),
            counters: PoolCounters::default(),
        };

        for _ in 0..size {
            let worker = pool.factory.build_async().await?;
            pool.counters.created();
            pool.push(worker);
        }

        tracing::info!(
            size,
            bundle = %pool.factory.bundle_path().display(),
            "Render pool prewarmed"
        );
        Ok(pool)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue an idle worker. Never blocks.
    ///
    /// The queue holds exactly `size` slots and a worker only comes back after
    /// leaving it, so a rejection means the pool-size invariant is broken.
    fn push(&self, worker: RenderWorker) {
        if let Err(
            mpsc::error::TrySendError::Full(worker) | mpsc::error::TrySendError::Closed(worker),
        ) = self.idle_tx.try_send(worker)
        {
            tracing::error!(
                worker_id = worker.id(),
                size = self.size,
                "Idle queue rejected worker; pool size invariant broken"
            );
            debug_assert!(false, "idle queue rejected worker {}", worker.id());
            retire(worker, &self.counters);
        }
    }
}

#[async_trait]
impl Pool for FixedPool {
    async fn acquire(&self) -> Result<RenderWorker> {
        let mut idle = self.idle_rx.lock().await;
        let worker = idle.recv().await.ok_or(Error::PoolClosed)?;
        tracing::trace!(worker_id = worker.id(), "Worker acquired");
        Ok(worker)
    }

    async fn release(&self, mut worker: RenderWorker) -> Result<()> {
        match tokio::time::timeout(RELEASE_GRACE, worker.flush_pending_timers()).await {
            Ok(Ok(())) => {
                worker.mark_idle();
                tracing::trace!(worker_id = worker.id(), "Worker released");
                self.push(worker);
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(worker_id = worker.id(), "Timer flush failed: {}", e);
                self.discard(worker).await
            }
            Err(_) => {
                tracing::warn!(worker_id = worker.id(), "Timer flush did not finish in time");
                self.discard(worker).await
            }
        }
    }

    async fn discard(&self, worker: RenderWorker) -> Result<()> {
        let discarded = worker.id();
        retire(worker, &self.counters);

        let replacement = self.factory.build_async().await?;
        self.counters.created();
        tracing::info!(discarded, replacement = replacement.id(), "Replaced render worker");
        self.push(replacement);
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            mode: PoolMode::Fixed,
            size: Some(self.size),
            live: self.counters.live(),
            idle: self.idle_tx.max_capacity() - self.idle_tx.capacity(),
            created_total: self.counters.created_total(),
            disposed_total: self.counters.disposed_total(),
        }
    }
}
