//! Swappable accumulation buffer for pending block headers.

use parking_lot::Mutex;

/// Append-only concurrent buffer with an atomic snapshot-and-reset.
///
/// `snapshot()` exchanges the backing vector for a fresh empty one in a
/// single `mem::take`; the lock is held only for the exchange itself, never
/// across an append+swap sequence, so no append is lost or duplicated.
#[derive(Debug, Default)]
pub struct InsertBuffer<T> {
    inner: Mutex<Vec<T>>,
}

impl<T> InsertBuffer<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Appends one item.
    pub fn append(&self, item: T) {
        self.inner.lock().push(item);
    }

    /// Number of currently buffered items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Swaps in a fresh empty buffer and returns the previous contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<T> {
        std::mem::take(&mut *self.inner.lock())
    }
}
