//! Metrics collection for the client node.
//!
//! Lightweight atomic counters tracking what the node has sent, received,
//! satisfied, and expired.

use std::sync::atomic::{AtomicU64, Ordering};

/* ---------------------------------------------------------------- *
 * Simple Counter
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Node metrics
 * ---------------------------------------------------------------- */

/// Counters the node maintains while processing events.
#[derive(Debug, Default)]
pub struct NodeMetrics {
    /// Interests expressed by the application.
    pub interests_expressed: Counter,
    /// Pending Interests satisfied by incoming Data.
    pub interests_satisfied: Counter,
    /// Pending Interests expired by the periodic sweep.
    pub interests_timed_out: Counter,
    /// Interests received from the forwarder.
    pub interests_received: Counter,
    /// Data packets received from the forwarder.
    pub data_received: Counter,
    /// Prefix registrations sent to the forwarder.
    pub registrations_completed: Counter,
    /// Prefix registrations that failed.
    pub registrations_failed: Counter,
    /// Bytes handed to the transport.
    pub bytes_sent: Counter,
    /// Bytes delivered by the transport.
    pub bytes_received: Counter,
    /// Current number of outstanding pending Interests.
    pub pending_interests: Gauge,
}

impl NodeMetrics {
    pub fn new() -> Self {
        Self::default()
    }
}
