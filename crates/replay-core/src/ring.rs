//! Event ring buffer: the bounded, drop-oldest holding area events sit in
//! between being recorded and being drained into a batch.

use std::collections::VecDeque;

use crate::event::EventRecord;
use crate::CoreError;

/// Bounded FIFO of event records. Pushing past capacity silently drops the
/// oldest record; the ring never blocks a recorder and never grows past its
/// configured capacity.
#[derive(Debug)]
pub struct EventRing {
    capacity: usize,
    records: VecDeque<EventRecord>,
    dropped_total: u64,
}

impl EventRing {
    /// Creates a new ring able to hold up to `capacity` records.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidCapacity`] when `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity);
        }
        Ok(Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
            dropped_total: 0,
        })
    }

    /// Pushes a newly recorded event onto the back of the ring, dropping the
    /// oldest record if the ring is already full.
    pub fn push(&mut self, record: EventRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
            self.dropped_total += 1;
        }
        self.records.push_back(record);
    }

    /// Removes and returns every record currently in the ring, oldest first,
    /// leaving the ring empty.
    pub fn drain_all(&mut self) -> Vec<EventRecord> {
        self.records.drain(..).collect()
    }

    /// Re-inserts previously drained records at the front of the ring, in
    /// their original order, used when a batch fails to serialize.
    ///
    /// Because the requeued records are chronologically older than anything
    /// recorded since the drain, overflow here evicts from the front of the
    /// combined sequence: the requeued records themselves, oldest first,
    /// rather than whatever was already in the ring.
    pub fn requeue_front(&mut self, records: Vec<EventRecord>) {
        let mut combined: VecDeque<EventRecord> =
            VecDeque::with_capacity(records.len() + self.records.len());
        combined.extend(records);
        combined.extend(self.records.drain(..));

        let overflow = combined.len().saturating_sub(self.capacity);
        if overflow > 0 {
            combined.drain(..overflow);
            self.dropped_total += overflow as u64;
        }
        self.records = combined;
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured maximum number of records.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total number of records dropped over this ring's lifetime, via either
    /// normal overflow or requeue overflow.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }
}
