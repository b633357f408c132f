//! Commands sent to a render worker's interpreter thread.

use tokio::sync::oneshot;

use prerender_js_runtime::RenderRequest;

pub(crate) enum WorkerCommand {
    /// Dispatch a render job. `accepted` reports whether the script took the
    /// job without throwing; the result itself arrives through the bridge.
    Render {
        request: RenderRequest,
        accepted: oneshot::Sender<Result<(), String>>,
    },

    /// Cancel every timer the script registered.
    FlushTimers { reply: oneshot::Sender<()> },

    /// Run a garbage-collection pass.
    Reclaim { reply: oneshot::Sender<()> },
}
