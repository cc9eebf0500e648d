//! Common types for the rust-ndnc client node.
//!
//! This crate provides the NDN packet structures and TLV codec shared by
//! the client-node engine and by embedders that need to speak the wire
//! format directly.

pub mod error;
pub mod ndn;
pub mod tlv;

/// Reexport of common types
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
