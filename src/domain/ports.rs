use std::ops::Deref;

/// A shared cell that many threads read and update concurrently.
///
/// Implemented by the RCU cell and by the lock-based cells it is benchmarked against.
pub trait Protect<T>: Send + Sync {
    type Guard<'a>: Deref<Target = T>
    where
        Self: 'a;

    fn name(&self) -> &'static str;

    fn read(&self) -> Self::Guard<'_>;

    fn update<F>(&self, update: F)
    where
        F: FnOnce(&mut T) + Send + 'static;
}
