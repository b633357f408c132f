//! The interpreter seam.
//!
//! A [`ScriptEngine`] is created on the thread that will drive it and never
//! leaves that thread, so implementations need not be `Send`. The loader that
//! creates it is shared across threads.

use std::path::Path;
use std::time::Duration;

use crate::bridge::HostBridge;
use crate::error::EngineError;
use crate::types::RenderRequest;

/// One loaded rendering bundle inside one interpreter.
pub trait ScriptEngine {
    /// Start rendering `request`.
    ///
    /// Returning `Ok` means the script accepted the job; the result arrives
    /// later through the bridge. An `Err` is a synchronous script failure.
    fn dispatch(&mut self, request: &RenderRequest) -> Result<(), EngineError>;

    /// Time until the earliest scheduled timer, if any.
    fn next_timer(&mut self) -> Option<Duration>;

    /// Run every timer that is due.
    fn run_due_timers(&mut self) -> Result<(), EngineError>;

    /// Cancel all timers the script registered.
    fn flush_timers(&mut self);

    /// Force a garbage-collection pass.
    fn collect_garbage(&mut self);
}

/// Builds engines from a bundle on disk.
pub trait EngineLoader: Send + Sync + 'static {
    fn load(&self, bundle: &Path, bridge: HostBridge) -> Result<Box<dyn ScriptEngine>, EngineError>;
}
