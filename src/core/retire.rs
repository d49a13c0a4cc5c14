use std::mem;
use std::ptr::NonNull;

/// An owned, heap-allocated version of the protected value.
///
/// Unlike `Box<T>` this makes no uniqueness claim, so readers may still hold
/// shared references into it while it sits on a retire list.
pub(crate) struct Node<T> {
    ptr: NonNull<T>,
}

// A node is handed between updater threads and dropped on whichever one reclaims it.
unsafe impl<T: Send> Send for Node<T> {}

impl<T> Node<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            ptr: NonNull::from(Box::leak(Box::new(value))),
        }
    }

    /// # Safety
    ///
    /// `ptr` must come from [`Node::into_raw`] and must not be owned by another node.
    pub(crate) unsafe fn from_raw(ptr: *mut T) -> Self {
        Self {
            ptr: NonNull::new_unchecked(ptr),
        }
    }

    pub(crate) fn into_raw(self) -> *mut T {
        let ptr = self.ptr.as_ptr();
        mem::forget(self);
        ptr
    }

    /// # Safety
    ///
    /// No reader may be able to reach this node.
    pub(crate) unsafe fn as_mut(&mut self) -> &mut T {
        self.ptr.as_mut()
    }
}

impl<T> Drop for Node<T> {
    fn drop(&mut self) {
        // SAFETY: the node owns the allocation made in `Node::new`.
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) }
    }
}

/// Writer-side bookkeeping. Only the registered updater touches it.
pub(crate) struct RetireState<T> {
    /// `lists[e]` holds versions retired while the epoch was `e`. Readers
    /// that entered under `e` keep that list alive.
    lists: [Vec<Node<T>>; 2],
    /// Versions no reader can reach any more, kept to back future copies.
    finished: Vec<Node<T>>,
}

impl<T> Default for RetireState<T> {
    fn default() -> Self {
        Self {
            lists: [Vec::new(), Vec::new()],
            finished: Vec::new(),
        }
    }
}

impl<T: Clone> RetireState<T> {
    /// Builds a private copy of `current`, recycling a finished version when one is available.
    pub(crate) fn copy_of(&mut self, current: &T) -> (Node<T>, bool) {
        match self.finished.pop() {
            Some(mut node) => {
                // SAFETY: finished nodes were reclaimed after their epoch drained.
                unsafe { node.as_mut() }.clone_from(current);
                (node, true)
            }
            None => (Node::new(current.clone()), false),
        }
    }
}

impl<T> RetireState<T> {
    /// Queues `node` under `epoch` and returns the new length of that list.
    pub(crate) fn push(&mut self, epoch: u8, node: Node<T>) -> usize {
        let list = &mut self.lists[usize::from(epoch & 1)];
        list.push(node);
        list.len()
    }

    /// Moves the versions retired under `epoch` into the finished pool and
    /// frees the previous pool. Returns how many versions were freed.
    ///
    /// The caller must have observed that no reader holds `epoch`.
    pub(crate) fn reclaim(&mut self, epoch: u8) -> usize {
        let list = &mut self.lists[usize::from(epoch & 1)];
        mem::swap(&mut self.finished, list);
        let freed = list.len();
        list.clear();
        freed
    }

    pub(crate) fn retired(&self, epoch: u8) -> usize {
        self.lists[usize::from(epoch & 1)].len()
    }

    pub(crate) fn pooled(&self) -> usize {
        self.finished.len()
    }
}
