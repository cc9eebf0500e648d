//! NDN client-node engine.
//!
//! This crate implements the in-process core of an NDN client: applications
//! express Interests and are notified when matching Data arrives or a
//! timeout elapses, and register name prefixes so that Interests arriving
//! at the forwarder are delivered to the application. All state lives in a
//! single [`Node`] driven by a single-threaded event loop.

use std::time::Duration;

pub mod clock;
pub mod metrics;
pub mod node;
pub mod pit;
pub mod registration;
pub mod rpt;
pub mod transport;

pub use node::{Node, NodeHandle, StopHandle};
pub use transport::{memory_pair, MemoryPeer, MemoryTransport, Transport};

/// Reexport of the shared wire types
pub use rust_ndnc_common::{ndn, tlv, Error, Result};

/// Interval of the periodic timer that drives pending-Interest expiry.
pub const TIMER_INTERVAL: Duration = Duration::from_millis(100);

/// Deadline applied to pending Interests whose lifetime is unspecified.
/// Also the lifetime of the ndnd-ID probe Interest.
pub const DEFAULT_INTEREST_LIFETIME_MS: i64 = 4000;

/// Maximum NDN packet size; larger inbound frames are dropped.
pub const MAX_PACKET_SIZE: usize = 8800;
