//! §3: "Unsigned 64-bit integer. Zero is a sentinel ('unset'). IDs are
//! assigned monotonically per manager; on project load, the next-ID counter
//! rises to one above the maximum ID observed."

use std::sync::atomic::{AtomicU64, Ordering};

use derive_more::Display;

/// A 64-bit object identifier, unique within one [`crate::Category`]'s
/// manager. `ItemId::UNSET` (zero) never addresses a real object.
#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ItemId(u64);

impl ItemId {
    pub const UNSET: ItemId = ItemId(0);

    #[must_use]
    pub const fn new(value: u64) -> Self {
        ItemId(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }
}

/// Monotonic per-manager ID allocator. `next()` hands out IDs starting at 1;
/// [`IdAllocator::observe`] raises the floor so that loading a project whose
/// highest stored ID is `N` leaves the allocator ready to hand out `N + 1`
/// next, per §3.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next monotonic ID.
    pub fn next(&self) -> ItemId {
        ItemId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Raise the allocator's floor so that `next()` will never hand out an
    /// ID `<= observed`. Used when inserting an object at an
    /// explicitly-specified (e.g. XML-deserialized) ID.
    pub fn observe(&self, observed: ItemId) {
        let floor = observed.get().saturating_add(1);
        self.next.fetch_max(floor, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_starting_at_one() {
        let alloc = IdAllocator::new();
        assert_eq!(alloc.next().get(), 1);
        assert_eq!(alloc.next().get(), 2);
    }

    #[test]
    fn observing_a_higher_id_raises_the_floor() {
        let alloc = IdAllocator::new();
        alloc.observe(ItemId::new(41));
        assert_eq!(alloc.next().get(), 42);
    }

    #[test]
    fn observing_a_lower_id_does_not_lower_the_floor() {
        let alloc = IdAllocator::new();
        alloc.observe(ItemId::new(100));
        alloc.observe(ItemId::new(5));
        assert_eq!(alloc.next().get(), 101);
    }
}
