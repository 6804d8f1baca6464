//! # Summary
//!
//! Crate-wide error type.
//!
//! `NotFound` is an ordinary control-flow signal (a read past the end of the
//! log, an empty store on startup). `ProtocolViolation` means the log was asked
//! to do something the protocol should make impossible, and is treated as
//! fatal by the driver loop.

use crate::message::InstanceId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No record for the requested instance (or range).
    #[error("no chosen value for instance {instance_id}")]
    NotFound { instance_id: InstanceId },

    /// Local log invariant broken: a gap, or an inverted/out-of-bound slice.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Rejected configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// The driver loop has exited.
    #[error("paxos node stopped")]
    Stopped,

    #[error("storage i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    pub(crate) fn not_found(instance_id: InstanceId) -> Self {
        Error::NotFound { instance_id }
    }

    pub(crate) fn violation<S: Into<String>>(message: S) -> Self {
        Error::ProtocolViolation(message.into())
    }
}
