//! Error types for the render pool.

use prerender_js_runtime::EngineError;

use crate::worker::WorkerState;

/// Errors raised by workers, pools and configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to construct render worker: {0}")]
    Construction(#[from] EngineError),

    #[error("Failed to spawn render worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Worker construction task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Render worker {id} is {state:?}")]
    InvalidState { id: u64, state: WorkerState },

    #[error("Render worker {0} stopped responding")]
    WorkerGone(u64),

    #[error("Render worker {id} rejected the job: {message}")]
    Rejected { id: u64, message: String },

    #[error("Render pool is closed")]
    PoolClosed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Construction failures are deployment errors, never per-request ones.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Construction(_) | Error::Spawn(_) | Error::Join(_) | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Construction(EngineError::MissingEntryPoint).is_fatal());
        assert!(Error::Config("pool_size".into()).is_fatal());
        assert!(!Error::WorkerGone(3).is_fatal());
        assert!(
            !Error::Rejected {
                id: 1,
                message: "boom".into()
            }
            .is_fatal()
        );
    }
}
