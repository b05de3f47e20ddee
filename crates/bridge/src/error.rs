use docquery::DomError;
use thiserror::Error;

use crate::value::HandleId;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Unknown handle: {0}")]
    UnknownHandle(HandleId),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    #[error("Invalid argument {index} for {method}: expected {expected}")]
    InvalidArgument {
        method: String,
        index: usize,
        expected: &'static str,
    },

    #[error("Handle limit reached ({0} live handles)")]
    HandleLimit(usize),

    /// Raised by a host callback; passed through untouched
    #[error("Host error: {0}")]
    Host(String),

    #[error(transparent)]
    Dom(#[from] DomError),
}
