//! Error types for the control-plane binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup.

/// Top-level error for the control-plane binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: greenwave_core::config::ConfigError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {message}")]
    Observer {
        /// Description of the observer failure.
        message: String,
    },
}
