//! One fresh worker per request.
//!
//! Used in debug mode so every render sees the bundle as it is on disk now.

use async_trait::async_trait;

use crate::error::Result;
use crate::factory::WorkerFactory;
use crate::worker::RenderWorker;

use super::{retire, Pool, PoolCounters, PoolMode, PoolStatus, RELEASE_GRACE};

pub struct OnDemandPool {
    factory: WorkerFactory,
    counters: PoolCounters,
}

impl OnDemandPool {
    pub fn new(factory: WorkerFactory) -> Self {
        Self {
            factory,
            counters: PoolCounters::default(),
        }
    }
}

#[async_trait]
impl Pool for OnDemandPool {
    async fn acquire(&self) -> Result<RenderWorker> {
        let worker = self.factory.build_async().await?;
        self.counters.created();
        tracing::debug!(worker_id = worker.id(), "Built on-demand worker");
        Ok(worker)
    }

    async fn release(&self, worker: RenderWorker) -> Result<()> {
        // Best effort; the worker is torn down either way.
        let cleanup = async {
            worker.flush_pending_timers().await?;
            worker.reclaim().await
        };
        match tokio::time::timeout(RELEASE_GRACE, cleanup).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(worker_id = worker.id(), "Cleanup failed: {}", e),
            Err(_) => tracing::debug!(worker_id = worker.id(), "Cleanup timed out"),
        }
        retire(worker, &self.counters);
        Ok(())
    }

    async fn discard(&self, worker: RenderWorker) -> Result<()> {
        retire(worker, &self.counters);
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            mode: PoolMode::OnDemand,
            size: None,
            live: self.counters.live(),
            idle: 0,
            created_total: self.counters.created_total(),
            disposed_total: self.counters.disposed_total(),
        }
    }
}
