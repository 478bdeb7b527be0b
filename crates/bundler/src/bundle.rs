//! A single bundle of items.

use std::time::Duration;
use tokio::time::Instant;

/// An ordered group of items accumulated since the previous flush.
///
/// Items keep the order in which `add` accepted them. `size` is the sum of
/// the sizes the items were accounted at.
#[derive(Debug)]
pub struct Bundle<T> {
    items: Vec<T>,
    size: usize,
    generation: u64,
    opened_at: Instant,
}

impl<T> Bundle<T> {
    pub(crate) fn new(generation: u64) -> Self {
        Self {
            items: Vec::new(),
            size: 0,
            generation,
            opened_at: Instant::now(),
        }
    }

    pub(crate) fn push(&mut self, item: T, size: usize) {
        if self.items.is_empty() {
            self.opened_at = Instant::now();
        }
        self.items.push(item);
        self.size += size;
    }

    /// Number of items in the bundle.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the bundle holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Accumulated size of all items.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Items in acceptance order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the bundle, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Sequence number of this bundle; every opened bundle gets the next one.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Time since the first item was added.
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub(crate) fn opened_at(&self) -> Instant {
        self.opened_at
    }
}
