//! Worker construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use prerender_js_runtime::{DenyFetch, EngineLoader, HostBridge, HostFetch, QuickJsLoader};

use crate::config::RenderConfig;
use crate::error::Result;
use crate::worker::RenderWorker;

/// Builds fully initialised [`RenderWorker`]s from a bundle on disk.
///
/// Every build reads the bundle afresh, so an on-demand pool picks up a
/// rebuilt bundle on the next request.
#[derive(Clone)]
pub struct WorkerFactory {
    bundle_path: PathBuf,
    loader: Arc<dyn EngineLoader>,
    fetch: Arc<dyn HostFetch>,
}

impl WorkerFactory {
    pub fn new(bundle_path: impl Into<PathBuf>, loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            bundle_path: bundle_path.into(),
            loader,
            fetch: Arc::new(DenyFetch),
        }
    }

    /// QuickJS workers for the configured bundle.
    pub fn quickjs(config: &RenderConfig) -> Self {
        let mut loader = QuickJsLoader::new();
        if let Some(bytes) = config.memory_limit_bytes() {
            loader = loader.with_memory_limit(bytes);
        }
        Self::new(&config.bundle_path, Arc::new(loader))
    }

    /// Offer scripts a `fetch` backed by `fetch`.
    pub fn with_fetch(mut self, fetch: Arc<dyn HostFetch>) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn bundle_path(&self) -> &Path {
        &self.bundle_path
    }

    /// Build a worker, blocking until its bundle is loaded.
    pub fn build(&self) -> Result<RenderWorker> {
        let bridge = HostBridge::new(self.fetch.clone());
        RenderWorker::spawn(self.loader.clone(), self.bundle_path.clone(), bridge)
    }

    /// [`build`](Self::build) on the blocking thread pool.
    pub async fn build_async(&self) -> Result<RenderWorker> {
        let factory = self.clone();
        tokio::task::spawn_blocking(move || factory.build()).await?
    }
}

impl std::fmt::Debug for WorkerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerFactory")
            .field("bundle_path", &self.bundle_path)
            .finish_non_exhaustive()
    }
}
