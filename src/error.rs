//! Error types shared across the acquisition run and its appendages.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A failing driver call: task creation, channel or clock configuration,
    /// start, or a per-batch read. The message is the driver's own text;
    /// the extended error text is available from [`crate::driver::Driver::last_error_text`].
    #[error("driver error: {0}")]
    Driver(String),

    /// The output file could not be opened for append
    #[error("unable to open output file {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Missing or malformed command-line argument
    #[error("argument error: {0}")]
    Argument(String),

    /// Caller-supplied data does not satisfy a precondition,
    /// e.g. a raw sample buffer shorter than the configured batch
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Semantically invalid run configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("logging setup error: {0}")]
    Logging(String),
}
