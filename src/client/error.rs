//! Client-side error type.

use thiserror::Error;

use crate::codec::CodecError;
use crate::headers::HeaderError;
use crate::status::{Code, Status};

/// Failure of an outgoing call.
///
/// [`ClientError::Status`] means the server answered with a status;
/// [`ClientError::Transport`] means no status was received at all.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Status(#[from] Status),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Status code this error is equivalent to.
    pub fn code(&self) -> Code {
        match self {
            Self::Transport(_) => Code::Unavailable,
            Self::Status(status) => status.code(),
            Self::Codec(_) | Self::Header(_) => Code::Internal,
            Self::InvalidRequest(_) => Code::InvalidArgument,
        }
    }

    /// The received status, if the server sent one.
    pub fn status(&self) -> Option<&Status> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Whether retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self.code(), Code::Unavailable | Code::ResourceExhausted | Code::Aborted)
    }
}
