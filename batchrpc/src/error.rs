//! Error types for batchrpc.

use std::io;

use crate::op::{OpKind, Tag};

/// Errors from batch construction, submission and completion handling.
///
/// The `BatchOutstanding`, `CallTerminated` and `TagMismatch` variants are
/// invariant violations: they indicate harness programming errors, and the
/// harnesses abort on them instead of retrying.
#[derive(Debug)]
pub enum Error {
    /// IO error from the underlying transport.
    Io(io::Error),
    /// Batch built with no operations.
    EmptyBatch,
    /// Operation kind appears more than once in a batch.
    DuplicateOp(OpKind),
    /// A batch was submitted while another is still outstanding on the call.
    BatchOutstanding,
    /// A batch was submitted against a terminated call.
    CallTerminated,
    /// Completion event delivered for a tag the call does not own.
    TagMismatch { expected: Tag, got: Tag },
    /// The channel worker has shut down, no further submissions possible.
    ChannelClosed,
    /// The completion queue shut down while an exchange was being driven.
    QueueShutdown,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::EmptyBatch => write!(f, "Batch contains no operations"),
            Error::DuplicateOp(kind) => {
                write!(f, "Operation {} appears more than once in batch", kind)
            }
            Error::BatchOutstanding => {
                write!(f, "A batch is already outstanding on this call")
            }
            Error::CallTerminated => write!(f, "Call is terminated"),
            Error::TagMismatch { expected, got } => {
                write!(f, "Completion tag mismatch: expected {:?}, got {:?}", expected, got)
            }
            Error::ChannelClosed => write!(f, "Channel is closed"),
            Error::QueueShutdown => write!(f, "Completion queue is shut down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

/// Result type for batchrpc operations.
pub type Result<T> = std::result::Result<T, Error>;
