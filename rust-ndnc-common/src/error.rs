//! Error types for the rust-ndnc client node.

use thiserror::Error;

/// All possible errors that can occur within the client node.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to NDN packet processing.
    #[error("NDN packet error: {0}")]
    NdnPacket(String),

    /// Error related to the transport connection.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Error related to prefix registration.
    #[error("Registration error: {0}")]
    Registration(String),

    /// The event loop is already running.
    #[error("Event loop is already running")]
    AlreadyRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}
