// Error type for the line codec.

use std::io;

use thiserror::Error;

/// A wire line could not be turned into a `Command`. The connection that
/// produced it is considered corrupted and should be closed.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("frame has no `<<` separator: {line:?}")]
    MissingSeparator { line: String },

    #[error("connection closed by peer")]
    Closed,

    #[error("i/o error on line stream: {0}")]
    Io(#[from] io::Error),
}
