//! Prerender
//!
//! Server-side rendering through a bounded pool of embedded script
//! interpreters.
//!
//! # Architecture
//!
//! - [`RenderWorker`]: one interpreter on its own OS thread, driven through a
//!   command channel
//! - [`WorkerFactory`]: builds workers from a bundle on disk
//! - [`Pool`]: hands out exclusive workers; [`FixedPool`] keeps a prewarmed
//!   set, [`OnDemandPool`] builds one per request
//! - [`RenderCoordinator`]: runs a request under a watchdog deadline and
//!   decides whether the worker is released or discarded

pub mod config;
pub mod coordinator;
pub mod error;
pub mod factory;
pub mod pool;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use config::RenderConfig;
pub use coordinator::RenderCoordinator;
pub use error::{Error, Result};
pub use factory::WorkerFactory;
pub use pool::{FixedPool, OnDemandPool, Pool, PoolMode, PoolStatus};
pub use worker::{PendingRender, RenderWorker, WorkerState};

pub use prerender_js_runtime::{
    FetchError, FetchRequest, FetchResponse, HostFetch, RenderOutcome, RenderRequest, RenderResult,
};
