//! Host-callback bridge.
//!
//! The bridge is wired into an interpreter exactly once, when the worker is
//! built, and is the only way results leave the script. Results land in a
//! [`ResultSlot`]: a single-slot, single-producer channel that is re-armed for
//! every job and can be closed for good when the worker is disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::FetchError;
use crate::types::{FetchRequest, FetchResponse, RenderResult};

// ─────────────────────────────────────────────────────────────────────────────
// Result slot
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SlotState {
    sender: Option<oneshot::Sender<RenderResult>>,
    correlation_id: String,
}

/// Single-slot result channel shared between a worker handle and its
/// interpreter thread.
#[derive(Clone, Default)]
pub struct ResultSlot {
    state: Arc<Mutex<SlotState>>,
    closed: Arc<AtomicBool>,
}

impl ResultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the slot for the job identified by `correlation_id`.
    ///
    /// Any sender left over from a previous job is replaced. On a closed slot
    /// the returned receiver resolves to an error immediately.
    pub fn arm(&self, correlation_id: &str) -> oneshot::Receiver<RenderResult> {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            return rx;
        }
        let mut state = self.state.lock();
        state.sender = Some(tx);
        state.correlation_id = correlation_id.to_string();
        rx
    }

    /// Deliver a result to the armed job. Never blocks.
    ///
    /// Returns `false` when the slot is closed, nothing is armed, or the
    /// receiver is gone; all of these are no-ops.
    pub fn post(&self, mut result: RenderResult) -> bool {
        if self.is_closed() {
            return false;
        }
        let mut state = self.state.lock();
        let Some(sender) = state.sender.take() else {
            tracing::debug!("Dropping render result posted with no job armed");
            return false;
        };
        if result.correlation_id.is_empty() {
            result.correlation_id = state.correlation_id.clone();
        }
        sender.send(result).is_ok()
    }

    /// Whether a job is waiting for a result.
    pub fn is_armed(&self) -> bool {
        self.state.lock().sender.is_some()
    }

    /// Correlation id of the armed (or last armed) job.
    pub fn correlation_id(&self) -> String {
        self.state.lock().correlation_id.clone()
    }

    /// Close the slot permanently. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state.lock().sender = None;
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host fetch capability
// ─────────────────────────────────────────────────────────────────────────────

/// Network-fetch-like capability offered to scripts.
///
/// Called on the interpreter thread, synchronously.
pub trait HostFetch: Send + Sync + 'static {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}

impl<F> HostFetch for F
where
    F: Fn(&FetchRequest) -> Result<FetchResponse, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self(request)
    }
}

/// Rejects every fetch.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyFetch;

impl HostFetch for DenyFetch {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        tracing::debug!(url = %request.url, "Denied script fetch");
        Err(FetchError::Unavailable)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bridge
// ─────────────────────────────────────────────────────────────────────────────

/// Everything an interpreter needs from its host.
#[derive(Clone)]
pub struct HostBridge {
    slot: ResultSlot,
    fetch: Arc<dyn HostFetch>,
}

impl HostBridge {
    pub fn new(fetch: Arc<dyn HostFetch>) -> Self {
        Self {
            slot: ResultSlot::new(),
            fetch,
        }
    }

    pub fn slot(&self) -> &ResultSlot {
        &self.slot
    }

    /// Parse a payload reported by the script and post it.
    ///
    /// A payload that is not a valid result is posted as an error result.
    pub fn report(&self, payload: &str) -> bool {
        let result = match RenderResult::from_payload(payload) {
            Ok(result) => result,
            Err(e) => RenderResult::failure(
                self.slot.correlation_id(),
                format!("Malformed render payload: {}", e),
                Duration::ZERO,
            ),
        };
        self.slot.post(result)
    }

    /// Post an error result for the armed job.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.slot.post(RenderResult::failure(
            self.slot.correlation_id(),
            message,
            Duration::ZERO,
        ))
    }

    pub fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.fetch.fetch(request)
    }

    /// Once closed the interpreter must stop running.
    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    pub fn close(&self) {
        self.slot.close();
    }
}

impl Default for HostBridge {
    fn default() -> Self {
        Self::new(Arc::new(DenyFetch))
    }
}
