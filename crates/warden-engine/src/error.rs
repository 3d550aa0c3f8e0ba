//! Error types for the Warden engine binary.
//!
//! [`EngineError`] wraps every failure mode during startup and the
//! supervised run, so `main` can propagate with `?`.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: warden_core::ConfigError,
    },

    /// The checkpoint directory could not be opened or seeded.
    #[error("checkpoint error: {source}")]
    Checkpoint {
        /// The underlying checkpoint error.
        #[from]
        source: warden_core::CheckpointError,
    },

    /// The audit log could not be opened.
    #[error("audit error: {source}")]
    Audit {
        /// The underlying audit error.
        #[from]
        source: warden_core::AuditError,
    },

    /// The governor rejected its configuration.
    #[error("governor error: {source}")]
    Governor {
        /// The underlying governor error.
        #[from]
        source: warden_core::GovernorError,
    },

    /// The world loop could not start.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: warden_core::RunnerError,
    },
}
