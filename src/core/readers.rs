//! Per-thread reader slots for a single RCU cell.
//!
//! Every thread that reads a cell gets one slot in that cell's registry. The
//! slot caches a byte describing the thread's read-side state:
//!
//! ```text
//!                _______________________________________
//!                |  Unused     |   Epoch   |  Reading  |
//! EpochReading:  | 7 6 5 4 3 2 |     1     |     0     |
//!                o-------------|-----------|-----------o
//! ```
//!
//! Readers only ever write their own slot, so entering and leaving a read
//! section never contends with other readers. The updater scans every slot
//! when it wants to know whether an epoch has drained.

use parking_lot::RwLock;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

pub type EpochReading = u8;

const READING: EpochReading = 1;
const IDLE: EpochReading = 0;

/// Slot value of a reader that entered under `epoch`.
#[inline]
pub(crate) fn reading_mark(epoch: u8) -> EpochReading {
    ((epoch & 1) << 1) | READING
}

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub(crate) struct ReaderSlot {
    state: AtomicU8,
    // Only touched by the owning thread.
    depth: AtomicU32,
    in_use: AtomicBool,
}

impl ReaderSlot {
    fn claimed() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            depth: AtomicU32::new(0),
            in_use: AtomicBool::new(true),
        }
    }

    fn try_claim(&self) -> bool {
        self.in_use
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) {
        self.state.store(IDLE, Ordering::SeqCst);
        self.depth.store(0, Ordering::Relaxed);
        self.in_use.store(false, Ordering::Release);
    }
}

/// Slots claimed by the current thread, keyed by registry id.
///
/// Dropped at thread exit, which hands every slot back to its registry.
#[derive(Default)]
struct LocalSlots {
    entries: Vec<(u64, Arc<ReaderSlot>)>,
}

impl LocalSlots {
    fn find(&self, registry_id: u64) -> Option<&Arc<ReaderSlot>> {
        self.entries
            .iter()
            .find(|(id, _)| *id == registry_id)
            .map(|(_, slot)| slot)
    }

    fn insert(&mut self, registry_id: u64, slot: Arc<ReaderSlot>) {
        // A slot only referenced from here belongs to a registry that was dropped.
        self.entries.retain(|(_, slot)| Arc::strong_count(slot) > 1);
        self.entries.push((registry_id, slot));
    }
}

impl Drop for LocalSlots {
    fn drop(&mut self) {
        for (_, slot) in &self.entries {
            slot.release();
        }
    }
}

thread_local! {
    static LOCAL_SLOTS: RefCell<LocalSlots> = RefCell::new(LocalSlots::default());
}

/// The set of reader slots belonging to one cell.
#[derive(Debug)]
pub struct ReaderRegistry {
    id: u64,
    slots: RwLock<Vec<Arc<ReaderSlot>>>,
}

impl Default for ReaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReaderRegistry {
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Marks the calling thread as reading under `epoch`.
    ///
    /// Nested entries on the same thread keep the mark of the outermost one.
    pub fn enter(&self, epoch: u8) -> ReaderHandle {
        let (slot, transient) = self.local_slot();

        if slot.depth.fetch_add(1, Ordering::Relaxed) == 0 {
            // SeqCst pairs with the updater's pointer swap and slot scan.
            slot.state.store(reading_mark(epoch), Ordering::SeqCst);
        }

        ReaderHandle {
            slot,
            transient,
            _not_send: PhantomData,
        }
    }

    /// Returns true when no thread is inside a read section entered under `epoch`.
    pub fn epoch_is_clear(&self, epoch: u8) -> bool {
        let reading = reading_mark(epoch);
        self.slots
            .read()
            .iter()
            .all(|slot| slot.state.load(Ordering::SeqCst) != reading)
    }

    /// Number of slots ever allocated, claimed or free.
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Number of slots currently owned by a live thread.
    pub fn active_slots(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.in_use.load(Ordering::Acquire))
            .count()
    }

    fn local_slot(&self) -> (Arc<ReaderSlot>, bool) {
        let cached = LOCAL_SLOTS.try_with(|local| {
            let mut local = local.borrow_mut();
            if let Some(slot) = local.find(self.id) {
                return Arc::clone(slot);
            }
            let slot = self.claim_slot();
            local.insert(self.id, Arc::clone(&slot));
            slot
        });

        match cached {
            Ok(slot) => (slot, false),
            // Thread-local storage is being torn down; use a one-off slot.
            Err(_) => (self.claim_slot(), true),
        }
    }

    fn claim_slot(&self) -> Arc<ReaderSlot> {
        if let Some(slot) = self.slots.read().iter().find(|slot| slot.try_claim()) {
            tracing::trace!(registry = self.id, "reusing reader slot");
            return Arc::clone(slot);
        }

        let slot = Arc::new(ReaderSlot::claimed());
        let mut slots = self.slots.write();
        slots.push(Arc::clone(&slot));
        tracing::trace!(registry = self.id, slots = slots.len(), "allocated reader slot");
        slot
    }
}

/// Proof that the calling thread is inside a read section. Leaves it on drop.
#[derive(Debug)]
pub struct ReaderHandle {
    slot: Arc<ReaderSlot>,
    transient: bool,
    // The slot belongs to the thread that entered.
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        if self.slot.depth.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.slot.state.store(IDLE, Ordering::SeqCst);
            if self.transient {
                self.slot.release();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_reading_mark_layout() {
        assert_eq!(reading_mark(0), 0b01);
        assert_eq!(reading_mark(1), 0b11);
    }

    #[test]
    fn test_enter_blocks_only_its_epoch() {
        let registry = ReaderRegistry::new();
        assert!(registry.epoch_is_clear(0));
        assert!(registry.epoch_is_clear(1));

        let handle = registry.enter(1);
        assert!(registry.epoch_is_clear(0));
        assert!(!registry.epoch_is_clear(1));

        drop(handle);
        assert!(registry.epoch_is_clear(1));
    }

    #[test]
    fn test_nested_enter_keeps_outer_mark() {
        let registry = ReaderRegistry::new();
        let outer = registry.enter(0);
        let inner = registry.enter(1);

        assert!(!registry.epoch_is_clear(0));
        assert!(registry.epoch_is_clear(1));

        drop(inner);
        assert!(!registry.epoch_is_clear(0));
        drop(outer);
        assert!(registry.epoch_is_clear(0));
        assert_eq!(registry.slot_count(), 1);
    }

    #[test]
    fn test_slot_released_on_thread_exit() {
        let registry = Arc::new(ReaderRegistry::new());

        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let _handle = registry.enter(0);
            })
            .join()
            .unwrap();
        }

        // Each thread exited before the next one started, so one slot is recycled.
        assert_eq!(registry.slot_count(), 1);
        assert_eq!(registry.active_slots(), 0);
        assert!(registry.epoch_is_clear(0));
    }

    #[test]
    fn test_concurrent_readers_get_distinct_slots() {
        let registry = ReaderRegistry::new();
        let barrier = std::sync::Barrier::new(3);

        thread::scope(|s| {
            for _ in 0..2 {
                s.spawn(|| {
                    let _handle = registry.enter(0);
                    barrier.wait();
                    barrier.wait();
                });
            }
            barrier.wait();
            assert_eq!(registry.active_slots(), 2);
            assert!(!registry.epoch_is_clear(0));
            barrier.wait();
        });

        assert!(registry.epoch_is_clear(0));
    }

    #[test]
    fn test_registries_do_not_share_slots() {
        let a = ReaderRegistry::new();
        let b = ReaderRegistry::new();

        let _in_a = a.enter(0);
        assert!(!a.epoch_is_clear(0));
        assert!(b.epoch_is_clear(0));
        assert_eq!(b.slot_count(), 0);
    }
}
