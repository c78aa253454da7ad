//! Error definitions for the disguise layer.

use std::io;

use thiserror::Error;

/// Errors produced while selecting a strategy or framing a disguised stream.
#[derive(Debug, Clone, Error)]
pub enum ObfsError {
    /// The configured strategy name is not known to the registry.
    #[error("unsupported obfs: {0}")]
    Unsupported(String),

    /// The peer never sent a header terminator within the scan bound,
    /// or closed the stream before sending one.
    #[error("disguise header not found")]
    HeaderNotFound,

    /// A disguised request arrived but its request line did not decode.
    #[error("malformed disguise request line")]
    MalformedRequest,

    /// A first write that was left pending mid-frame came back with
    /// different bytes.
    #[error("pending first write retried with a different buffer")]
    WriteRetryMismatch,
}

impl ObfsError {
    /// Whether this error poisons the read side of a stream.
    pub fn is_framing(&self) -> bool {
        matches!(self, ObfsError::HeaderNotFound | ObfsError::MalformedRequest)
    }
}

impl From<ObfsError> for io::Error {
    fn from(err: ObfsError) -> Self {
        let kind = if err.is_framing() {
            io::ErrorKind::InvalidData
        } else {
            io::ErrorKind::InvalidInput
        };
        io::Error::new(kind, err)
    }
}

/// Result type for disguise layer setup.
pub type ObfsResult<T> = Result<T, ObfsError>;
