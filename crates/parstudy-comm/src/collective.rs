//! Shared slot table backing the in-process collectives.
//!
//! Each collective call is identified by its kind and the per-kind
//! sequence number on the issuing rank. Every rank deposits its
//! contribution into the slot for that key; once all ranks have arrived
//! the slot is readable, and it is retired after every rank has read it.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::comm::Rank;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Kind {
    Sum,
    Barrier,
    Gather,
}

pub(crate) type Key = (Kind, u64);

#[derive(Debug)]
struct Slot {
    contributions: Vec<Option<Vec<u8>>>,
    arrived: usize,
    reads: usize,
}

#[derive(Debug)]
pub(crate) struct Collectives {
    size: usize,
    slots: Mutex<HashMap<Key, Slot>>,
}

impl Collectives {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            size,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn contribute(&self, key: Key, rank: Rank, bytes: Vec<u8>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let size = self.size;
        let slot = slots.entry(key).or_insert_with(|| Slot {
            contributions: vec![None; size],
            arrived: 0,
            reads: 0,
        });
        debug_assert!(
            slot.contributions[rank].is_none(),
            "rank {rank} contributed twice to {key:?}"
        );
        slot.contributions[rank] = Some(bytes);
        slot.arrived += 1;
    }

    /// Returns every rank's contribution once all have arrived.
    ///
    /// Must be called at most once per rank per key after it returns
    /// `Some`.
    pub(crate) fn try_collect(&self, key: Key) -> Option<Vec<Vec<u8>>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.get_mut(&key)?;
        if slot.arrived < self.size {
            return None;
        }
        slot.reads += 1;
        let out = slot
            .contributions
            .iter()
            .map(|c| c.clone().unwrap_or_default())
            .collect();
        if slot.reads == self.size {
            slots.remove(&key);
        }
        Some(out)
    }

    pub(crate) fn live_slots(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
