//! Error types for the embedded render runtime.

use std::path::PathBuf;

/// Errors raised while loading a bundle or driving the interpreter.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Bundle not readable at {path}: {source}")]
    BundleUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create interpreter: {0}")]
    Init(String),

    #[error("Bundle failed to evaluate: {0}")]
    BundleEval(String),

    #[error("Bundle does not define a main(request, callback) entry point")]
    MissingEntryPoint,

    #[error("JavaScript error: {0}")]
    Script(String),

    #[error("Failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors surfaced to scripts calling the host `fetch`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("fetch is not available to render scripts")]
    Unavailable,

    #[error("fetch of {url} failed: {reason}")]
    Failed { url: String, reason: String },
}
