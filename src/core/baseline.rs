//! Lock-based cells the RCU cell is measured against.
//!
//! None of these support calling `update` from inside an update closure.

use crate::core::rcu::{ReadGuard, Rcu};
use crate::domain::ports::Protect;
use parking_lot::{Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::sync::Arc;

impl<T> Protect<T> for Rcu<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Guard<'a> = ReadGuard<'a, T>;

    fn name(&self) -> &'static str {
        "wbrcu"
    }

    fn read(&self) -> Self::Guard<'_> {
        Rcu::read(self)
    }

    fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        Rcu::update(self, update)
    }
}

/// Readers and writers share one exclusive lock.
#[derive(Debug, Default)]
pub struct MutexProtected<T> {
    value: Mutex<T>,
}

impl<T> MutexProtected<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }
}

impl<T: Send + Sync> Protect<T> for MutexProtected<T> {
    type Guard<'a> = MutexGuard<'a, T> where Self: 'a;

    fn name(&self) -> &'static str {
        "mutex"
    }

    fn read(&self) -> Self::Guard<'_> {
        self.value.lock()
    }

    fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        update(&mut self.value.lock());
    }
}

/// Readers share the lock, writers take it exclusively and update in place.
#[derive(Debug, Default)]
pub struct RwLockProtected<T> {
    value: RwLock<T>,
}

impl<T> RwLockProtected<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }
}

impl<T: Send + Sync> Protect<T> for RwLockProtected<T> {
    type Guard<'a> = RwLockReadGuard<'a, T> where Self: 'a;

    fn name(&self) -> &'static str {
        "rwlock"
    }

    fn read(&self) -> Self::Guard<'_> {
        self.value.read()
    }

    fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        update(&mut self.value.write());
    }
}

/// Copy-on-write through reference counting.
///
/// Readers clone the current `Arc` and never hold a lock while using it.
/// Writers serialize on `writer`, copy, apply, and swap in the new version.
#[derive(Debug, Default)]
pub struct ArcProtected<T> {
    current: RwLock<Arc<T>>,
    writer: Mutex<()>,
}

impl<T> ArcProtected<T> {
    pub fn new(value: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(value)),
            writer: Mutex::new(()),
        }
    }
}

impl<T: Clone + Send + Sync> Protect<T> for ArcProtected<T> {
    type Guard<'a> = Arc<T> where Self: 'a;

    fn name(&self) -> &'static str {
        "arc"
    }

    fn read(&self) -> Self::Guard<'_> {
        Arc::clone(&self.current.read())
    }

    fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        let writer = self.writer.lock();
        let mut next = T::clone(&self.current.read());
        update(&mut next);
        let previous = std::mem::replace(&mut *self.current.write(), Arc::new(next));
        drop(writer);
        // The last holder of the old version frees it, outside our locks.
        drop(previous);
    }
}
