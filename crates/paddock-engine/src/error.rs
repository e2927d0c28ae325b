//! Error types for the race engine binary.

/// Top-level error for the race engine binary.
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
        source: paddock_core::config::ConfigError,
    },

    /// The configured card of races is invalid.
    #[error("program error: {source}")]
    Program {
        /// The underlying program error.
        #[from]
        source: paddock_core::program::ProgramError,
    },

    /// The tick timer could not be created.
    #[error("timer error: {source}")]
    Timer {
        /// The underlying timer error.
        #[from]
        source: paddock_core::timer::TimerError,
    },

    /// The race loop rejected a command or went away.
    #[error("race loop error: {source}")]
    Driver {
        /// The underlying driver error.
        #[from]
        source: paddock_core::driver::DriverError,
    },

    /// Listening for Ctrl-C failed.
    #[error("signal error: {source}")]
    Signal {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
