//! Pending Interest Table.
//!
//! Outstanding Interests awaiting Data, matched by name prefix and expired
//! by the periodic sweep. Entries are kept in insertion order; every entry
//! leaves the table exactly once, whether by match, expiry, or explicit
//! removal.

use log::trace;
use rust_ndnc_common::ndn::{Data, Interest, Name};

use crate::DEFAULT_INTEREST_LIFETIME_MS;

/// Callback invoked when a pending Interest is satisfied by Data.
pub type OnData = Box<dyn FnOnce(&Interest, &Data) + Send>;
/// Callback invoked when a pending Interest times out.
pub type OnTimeout = Box<dyn FnOnce(&Interest) + Send>;

/// What happens when a pending Interest is satisfied or expires.
pub enum PitCallbacks {
    /// Deliver to the application; either callback may be absent.
    App {
        on_data: Option<OnData>,
        on_timeout: Option<OnTimeout>,
    },
    /// The ndnd-ID probe; the node resolves the registration queue itself.
    NdndIdProbe,
}

/// A single outstanding Interest.
pub struct PendingInterest {
    pub id: u64,
    pub interest: Interest,
    pub callbacks: PitCallbacks,
    /// Absolute monotonic deadline in milliseconds.
    pub deadline_ms: i64,
}

/// Insertion-ordered table of outstanding Interests.
#[derive(Default)]
pub struct PendingInterestTable {
    entries: Vec<PendingInterest>,
    next_id: u64,
}

impl PendingInterestTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts a new entry and returns its id.
    ///
    /// The deadline is `now_ms` plus the Interest lifetime, or plus
    /// [`DEFAULT_INTEREST_LIFETIME_MS`] when the lifetime is unspecified.
    pub fn insert(&mut self, interest: Interest, callbacks: PitCallbacks, now_ms: i64) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let lifetime = if interest.lifetime_ms >= 0 {
            interest.lifetime_ms
        } else {
            DEFAULT_INTEREST_LIFETIME_MS
        };
        let deadline_ms = now_ms + lifetime;
        trace!(
            "[PIT] insert id={} name={} deadline={}",
            id,
            interest.name,
            deadline_ms
        );
        self.entries.push(PendingInterest {
            id,
            interest,
            callbacks,
            deadline_ms,
        });
        id
    }

    /// Removes every entry with the given id. Silent when absent.
    pub fn remove_by_id(&mut self, id: u64) {
        self.entries.retain(|entry| entry.id != id);
    }

    /// Removes and returns the first entry, in insertion order, whose
    /// Interest matches `data_name`.
    ///
    /// The entry is out of the table before the caller runs any callback,
    /// so a callback can never observe its own entry.
    pub fn match_incoming(&mut self, data_name: &Name) -> Option<PendingInterest> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.interest.matches_name(data_name))?;
        Some(self.entries.remove(index))
    }

    /// Removes and returns every entry with `deadline <= now_ms`,
    /// preserving insertion order.
    pub fn sweep_expired(&mut self, now_ms: i64) -> Vec<PendingInterest> {
        if self.entries.iter().all(|entry| entry.deadline_ms > now_ms) {
            return Vec::new();
        }
        let (expired, kept) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|entry| entry.deadline_ms <= now_ms);
        self.entries = kept;
        expired
    }
}
