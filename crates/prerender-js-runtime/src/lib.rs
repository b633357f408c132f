//! Prerender JavaScript Runtime
//!
//! Embeds QuickJS to run server-side rendering bundles.
//!
//! # Architecture
//!
//! - A bundle defines `main(request, callback)`; the callback reports the
//!   render result as JSON (or a plain object)
//! - Results leave the interpreter only through the [`HostBridge`], which
//!   posts them into a single-slot [`ResultSlot`]
//! - Engines are `!Send`: an [`EngineLoader`] builds them on the thread that
//!   will drive them
//! - Scripts get `console`, `setTimeout`/`setInterval`, and a `fetch` backed
//!   by the host's [`HostFetch`] capability

mod bridge;
mod engine;
mod error;
mod globals;
mod quickjs;
mod types;

pub use bridge::{DenyFetch, HostBridge, HostFetch, ResultSlot};
pub use engine::{EngineLoader, ScriptEngine};
pub use error::{EngineError, FetchError};
pub use quickjs::{QuickJsEngine, QuickJsLoader, BOOTSTRAP_JS};
pub use types::{FetchRequest, FetchResponse, RenderOutcome, RenderRequest, RenderResult};
