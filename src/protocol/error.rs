use std::io;

use thiserror::Error;

use super::Kind;

/// Failures surfaced by the client.
///
/// Variants other than [`Error::Fault`] leave the connection usable: the
/// decoder has consumed the whole reply before reporting them. A [`Fault`]
/// means the byte stream can no longer be trusted.
#[derive(Debug, Error)]
pub enum Error {
    #[error("remote error: {0}")]
    Remote(String),

    #[error("unexpected {0} reply")]
    UnexpectedShape(Kind),

    #[error("expected {expected} value, found {actual}")]
    InvalidShape { expected: Kind, actual: Kind },

    #[error("failed to convert bulk payload: {0}")]
    Conversion(String),

    #[error("connection fault: {0}")]
    Fault(#[from] Fault),
}

/// Fatal connection level errors.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("visitor left {0} bulk bytes unread")]
    Unconsumed(usize),

    #[error("transport io error: {0}")]
    Io(#[from] io::Error),

    #[error("connection is closed")]
    Closed,
}

impl Error {
    pub(crate) fn protocol(reason: impl Into<String>) -> Self {
        Error::Fault(Fault::Protocol(reason.into()))
    }

    /// Whether the connection that produced this error must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fault(_))
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Fault(Fault::Io(value))
    }
}
