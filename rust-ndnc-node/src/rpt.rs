//! Registered Prefix Table.
//!
//! Prefixes the application owns, each with an Interest handler. Incoming
//! Interests are dispatched to the entry with the longest matching prefix.

use log::trace;
use rust_ndnc_common::ndn::{Interest, Name};

use crate::transport::Transport;

/// Handler invoked for each Interest arriving under a registered prefix.
///
/// Receives the registered prefix, the Interest, the transport (to emit
/// reply Data), and the registration id.
pub type OnInterest = Box<dyn FnMut(&Name, &Interest, &mut dyn Transport, u64) + Send>;

/// A registered prefix and its handler.
pub struct RegisteredPrefix {
    pub id: u64,
    pub prefix: Name,
    pub on_interest: OnInterest,
}

/// Insertion-ordered table of registered prefixes.
#[derive(Default)]
pub struct RegisteredPrefixTable {
    entries: Vec<RegisteredPrefix>,
    next_id: u64,
}

impl RegisteredPrefixTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reserves an id without inserting.
    ///
    /// The registration protocol hands the id back to the caller as a
    /// cancel handle before the forwarder exchange completes.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, prefix: Name, on_interest: OnInterest) -> u64 {
        let id = self.allocate_id();
        self.insert_with_id(id, prefix, on_interest);
        id
    }

    pub fn insert_with_id(&mut self, id: u64, prefix: Name, on_interest: OnInterest) {
        trace!("[RPT] insert id={} prefix={}", id, prefix);
        self.entries.push(RegisteredPrefix {
            id,
            prefix,
            on_interest,
        });
    }

    /// Removes every entry with the given id. Silent when absent.
    pub fn remove_by_id(&mut self, id: u64) {
        self.entries.retain(|entry| entry.id != id);
    }

    /// The entry whose prefix is the longest prefix of `name`; ties break
    /// to the earliest insertion. `None` when no prefix matches.
    pub fn longest_match_mut(&mut self, name: &Name) -> Option<&mut RegisteredPrefix> {
        let mut best: Option<usize> = None;
        for (index, entry) in self.entries.iter().enumerate() {
            if !entry.prefix.is_prefix_of(name) {
                continue;
            }
            match best {
                Some(current) if self.entries[current].prefix.len() >= entry.prefix.len() => {}
                _ => best = Some(index),
            }
        }
        best.map(move |index| &mut self.entries[index])
    }

    /// Registered prefixes, in insertion order.
    pub fn prefixes(&self) -> impl Iterator<Item = &Name> {
        self.entries.iter().map(|entry| &entry.prefix)
    }
}
