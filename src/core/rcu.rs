//! Writer-biased read-copy-update cell.
//!
//! Readers never block: entering a read section is a store to a per-thread
//! slot followed by a pointer load. Writers are combined. The first thread to
//! register becomes the updater and applies its own closure plus every closure
//! other threads queue while it works, then publishes all of them with a single
//! pointer swap. Old versions wait on a retire list for their epoch to drain
//! and are then recycled as the backing storage for later copies.

use crate::core::readers::{ReaderHandle, ReaderRegistry};
use crate::core::retire::{Node, RetireState};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::any::Any;
use std::marker::PhantomData;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, AtomicU64, AtomicU8, Ordering};

type UpdateFn<T> = Box<dyn FnOnce(&mut T) + Send>;
type PanicPayload = Box<dyn Any + Send>;

/// Number of hardware threads, used to size the retire lists and update queue.
pub fn hardware_concurrency() -> usize {
    num_cpus::get().max(1)
}

#[derive(Debug, Clone)]
pub struct RcuBuilder {
    cleanup_threshold: usize,
    queue_capacity: usize,
}

impl Default for RcuBuilder {
    fn default() -> Self {
        let threads = hardware_concurrency();
        Self {
            cleanup_threshold: threads,
            queue_capacity: threads * 2,
        }
    }
}

impl RcuBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retired versions to collect in the current epoch before trying to reclaim the previous one.
    pub fn cleanup_threshold(mut self, threshold: usize) -> Self {
        self.cleanup_threshold = threshold.max(1);
        self
    }

    /// Pending updates other threads may queue before `update` blocks.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn build<T>(self, value: T) -> Rcu<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (jobs_tx, jobs_rx) = flume::bounded(self.queue_capacity);
        tracing::debug!(
            cleanup_threshold = self.cleanup_threshold,
            queue_capacity = self.queue_capacity,
            "creating rcu cell"
        );

        Rcu {
            current: AtomicPtr::new(Node::new(value).into_raw()),
            epoch: AtomicU8::new(0),
            readers: ReaderRegistry::new(),
            writer: Mutex::new(RetireState::default()),
            pending: AtomicU64::new(0),
            jobs_tx,
            jobs_rx,
            cleanup_threshold: self.cleanup_threshold,
            counters: Counters::default(),
            _owns: PhantomData,
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    updates: AtomicU64,
    publishes: AtomicU64,
    epoch_flips: AtomicU64,
    reclaimed: AtomicU64,
    reused: AtomicU64,
}

/// Snapshot of a cell's writer-side activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RcuStats {
    pub updates: u64,
    pub publishes: u64,
    pub epoch_flips: u64,
    pub reclaimed: u64,
    pub reused: u64,
    pub epoch: u8,
}

pub struct Rcu<T>
where
    T: Clone + Send + Sync + 'static,
{
    current: AtomicPtr<T>,
    epoch: AtomicU8,
    readers: ReaderRegistry,
    writer: Mutex<RetireState<T>>,
    /// Updates registered but not yet published. Non-zero means an updater is active.
    pending: AtomicU64,
    jobs_tx: flume::Sender<UpdateFn<T>>,
    jobs_rx: flume::Receiver<UpdateFn<T>>,
    cleanup_threshold: usize,
    counters: Counters,
    _owns: PhantomData<T>,
}

impl<T> Rcu<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        RcuBuilder::new().build(value)
    }

    /// Returns a guard to the current version.
    ///
    /// The version stays valid for as long as the guard lives, even if newer
    /// versions are published meanwhile.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let handle = self.readers.enter(self.epoch.load(Ordering::Relaxed));
        let raw = self.current.load(Ordering::SeqCst);

        ReadGuard {
            // SAFETY: `current` always holds a pointer from `Node::into_raw`.
            ptr: unsafe { NonNull::new_unchecked(raw) },
            _handle: handle,
            _cell: PhantomData,
        }
    }

    /// Applies `update` to a copy of the current value and publishes it.
    ///
    /// When another thread is already updating, the closure is handed to it
    /// and this call returns without waiting for the result to be published.
    /// Closures from one thread are applied in the order they were issued.
    ///
    /// An update issued from inside an update closure of the same cell is
    /// queued and applied after the outer closure finishes. The queue is only
    /// drained once the closure returns, so a nested update blocks forever
    /// if the queue is already full. Other threads may have filled it, so
    /// nested updates can deadlock under contention.
    ///
    /// A panicking closure keeps the changes it made before panicking. The
    /// rest of the queue is still applied and published before the first
    /// panic resumes on the applying thread.
    pub fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        if self.pending.fetch_add(1, Ordering::Acquire) != 0 {
            self.enqueue(Box::new(update));
            return;
        }

        let panicked = {
            let mut writer = self.writer.lock();
            let mut copy = self.take_copy(&mut writer);
            let panicked = self.apply(&mut copy, update);
            self.drain_and_publish(&mut writer, copy, panicked)
        };

        if let Some(payload) = panicked {
            panic::resume_unwind(payload);
        }
    }

    pub fn stats(&self) -> RcuStats {
        RcuStats {
            updates: self.counters.updates.load(Ordering::Relaxed),
            publishes: self.counters.publishes.load(Ordering::Relaxed),
            epoch_flips: self.counters.epoch_flips.load(Ordering::Relaxed),
            reclaimed: self.counters.reclaimed.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            epoch: self.epoch.load(Ordering::Relaxed),
        }
    }

    /// Reader slots allocated by this cell.
    pub fn reader_slots(&self) -> usize {
        self.readers.slot_count()
    }

    fn enqueue(&self, job: UpdateFn<T>) {
        // Both channel ends live in `self`, so the queue cannot disconnect.
        let Ok(()) = self.jobs_tx.send(job) else {
            unreachable!("update queue receiver is owned by the cell");
        };
    }

    fn take_copy(&self, writer: &mut RetireState<T>) -> Node<T> {
        // SAFETY: only the updater replaces `current`, and we are the updater.
        let current = unsafe { &*self.current.load(Ordering::Acquire) };
        let (copy, reused) = writer.copy_of(current);
        if reused {
            self.counters.reused.fetch_add(1, Ordering::Relaxed);
        }
        copy
    }

    /// Runs one closure on the unpublished copy, catching a panic so the
    /// pending count is always settled.
    fn apply<F>(&self, copy: &mut Node<T>, update: F) -> Option<PanicPayload>
    where
        F: FnOnce(&mut T),
    {
        // SAFETY: the copy has not been published yet.
        let value = unsafe { copy.as_mut() };
        let result = panic::catch_unwind(AssertUnwindSafe(|| update(value)));
        self.counters.updates.fetch_add(1, Ordering::Relaxed);

        let payload = result.err()?;
        tracing::error!("update closure panicked, publishing remaining updates");
        Some(payload)
    }

    fn drain_and_publish(
        &self,
        writer: &mut RetireState<T>,
        mut copy: Node<T>,
        mut panicked: Option<PanicPayload>,
    ) -> Option<PanicPayload> {
        let mut done: u64 = 1;
        let mut registered = self.pending.load(Ordering::Acquire);

        loop {
            while done != registered {
                while done < registered {
                    let Ok(job) = self.jobs_rx.recv() else {
                        unreachable!("update queue sender is owned by the cell");
                    };
                    let failed = self.apply(&mut copy, job);
                    if panicked.is_none() {
                        panicked = failed;
                    }
                    done += 1;
                }
                registered = self.pending.load(Ordering::Acquire);
            }

            let old = self.current.swap(copy.into_raw(), Ordering::SeqCst);
            self.counters.publishes.fetch_add(1, Ordering::Relaxed);
            // SAFETY: `old` was just unlinked and came from `Node::into_raw`.
            self.retire(writer, unsafe { Node::from_raw(old) });

            // Anyone who registered after our last look is waiting on us.
            match self
                .pending
                .compare_exchange(registered, 0, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return panicked,
                Err(now) => {
                    registered = now;
                    copy = self.take_copy(writer);
                }
            }
        }
    }

    fn retire(&self, writer: &mut RetireState<T>, old: Node<T>) {
        let current = self.epoch.load(Ordering::Relaxed);
        let previous = current ^ 1;

        if writer.push(current, old) < self.cleanup_threshold
            || !self.readers.epoch_is_clear(previous)
        {
            return;
        }

        let freed = writer.reclaim(previous);
        self.epoch.store(previous, Ordering::SeqCst);
        self.counters.epoch_flips.fetch_add(1, Ordering::Relaxed);
        self.counters
            .reclaimed
            .fetch_add(freed as u64, Ordering::Relaxed);
        tracing::trace!(
            epoch = previous,
            freed,
            retained = writer.retired(current),
            pooled = writer.pooled(),
            "epoch advanced"
        );
    }
}

impl<T> Drop for Rcu<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // SAFETY: `&mut self` rules out live guards and in-flight updates.
        drop(unsafe { Node::from_raw(*self.current.get_mut()) });
    }
}

impl<T> Default for Rcu<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Rcu<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T> fmt::Debug for Rcu<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rcu")
            .field("value", &*self.read())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Read access to one published version. Not `Send`: it pins the reader slot of its thread.
pub struct ReadGuard<'a, T> {
    ptr: NonNull<T>,
    _handle: ReaderHandle,
    _cell: PhantomData<&'a T>,
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the reader handle keeps this version out of reclamation.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Tracked {
        value: u64,
        live: Arc<AtomicUsize>,
    }

    impl Tracked {
        fn new(value: u64, live: &Arc<AtomicUsize>) -> Self {
            live.fetch_add(1, Ordering::SeqCst);
            Self {
                value,
                live: Arc::clone(live),
            }
        }
    }

    impl Clone for Tracked {
        fn clone(&self) -> Self {
            Self::new(self.value, &self.live)
        }

        fn clone_from(&mut self, source: &Self) {
            self.value = source.value;
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_initial_value() {
        let cell = Rcu::new(0u64);
        assert_eq!(*cell.read(), 0);
    }

    #[test]
    fn test_basic_update() {
        let cell = Rcu::new(0u64);
        cell.update(|v| *v = 42);
        assert_eq!(*cell.read(), 42);

        let stats = cell.stats();
        assert_eq!(stats.updates, 1);
        assert_eq!(stats.publishes, 1);
    }

    #[test]
    fn test_guard_keeps_old_version() {
        let cell = RcuBuilder::new()
            .cleanup_threshold(1)
            .build(String::from("first"));

        let guard = cell.read();
        for i in 0..100 {
            cell.update(move |s| *s = format!("version {}", i));
        }

        assert_eq!(&*guard, "first");
        assert_eq!(&*cell.read(), "version 99");
    }

    #[test]
    fn test_reader_blocks_epoch_flip() {
        let cell = RcuBuilder::new().cleanup_threshold(1).build(0u64);

        let guard = cell.read();
        for _ in 0..10 {
            cell.update(|v| *v += 1);
        }
        // The first flip only needed the other epoch to be clear.
        assert_eq!(cell.stats().epoch_flips, 1);

        drop(guard);
        cell.update(|v| *v += 1);
        assert_eq!(cell.stats().epoch_flips, 2);
        assert_eq!(*cell.read(), 11);
    }

    #[test]
    fn test_nested_update_applies_after_outer() {
        let cell = Arc::new(Rcu::new(0i64));
        let inner = Arc::clone(&cell);

        cell.update(move |v| {
            *v = 1;
            inner.update(|v| *v *= 2);
        });

        assert_eq!(*cell.read(), 2);
        assert_eq!(cell.stats().publishes, 1);
    }

    #[test]
    fn test_panicking_update_keeps_cell_usable() {
        let cell = Rcu::new(0u64);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cell.update(|_| panic!("update failed"));
        }));
        assert!(result.is_err());

        cell.update(|v| *v = 7);
        assert_eq!(*cell.read(), 7);
        assert_eq!(cell.stats().publishes, 2);
    }

    #[test]
    fn test_panicking_queued_update_still_publishes() {
        let cell = Arc::new(Rcu::new(0u64));
        let inner = Arc::clone(&cell);

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            cell.update(move |v| {
                *v = 1;
                inner.update(|_| panic!("queued update failed"));
            });
        }));
        assert!(result.is_err());
        assert_eq!(*cell.read(), 1);

        cell.update(|v| *v += 1);
        assert_eq!(*cell.read(), 2);
    }

    #[test]
    fn test_nested_read_guards() {
        let cell = RcuBuilder::new().cleanup_threshold(1).build(1u64);

        let outer = cell.read();
        cell.update(|v| *v = 2);
        let inner = cell.read();
        assert_eq!((*outer, *inner), (1, 2));

        drop(inner);
        for _ in 0..10 {
            cell.update(|v| *v += 1);
        }
        assert_eq!(*outer, 1);
        assert_eq!(cell.reader_slots(), 1);
    }

    #[test]
    fn test_large_number_of_updates() {
        let cell = Rcu::new(0u64);
        for i in 0..10_000u64 {
            cell.update(move |v| *v = i);
        }
        assert_eq!(*cell.read(), 9_999);
        assert!(cell.stats().reused > 0);
    }

    #[test]
    fn test_all_versions_freed_on_drop() {
        let live = Arc::new(AtomicUsize::new(0));
        {
            let cell = RcuBuilder::new()
                .cleanup_threshold(2)
                .build(Tracked::new(0, &live));
            for _ in 0..50 {
                cell.update(|t| t.value += 1);
            }
            assert_eq!(cell.read().value, 50);
            assert!(live.load(Ordering::SeqCst) >= 1);
        }
        assert_eq!(live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pool_bounds_live_versions() {
        let live = Arc::new(AtomicUsize::new(0));
        let cell = RcuBuilder::new()
            .cleanup_threshold(4)
            .build(Tracked::new(0, &live));

        for _ in 0..1_000 {
            cell.update(|t| t.value += 1);
        }

        // current + two retire lists + pool, each list capped near the threshold
        assert!(live.load(Ordering::SeqCst) <= 1 + 3 * 4);
        assert!(cell.stats().reclaimed > 0 || cell.stats().reused > 0);
    }
}
