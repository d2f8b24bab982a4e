//! Named, atomically incremented counters.

use tracing::debug;

use crate::{
    backend::StoreBackend,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Hands out blocks of sequence numbers from named counters.
///
/// All mutual exclusion is delegated to
/// [`StoreBackend::find_and_increment`]; the allocator itself holds no state.
#[derive(Debug)]
pub struct SequenceAllocator<'a, B: StoreBackend> {
    backend: &'a B,
}

impl<'a, B: StoreBackend> SequenceAllocator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Adds `increment` to the counter `name` and returns the new value.
    ///
    /// The caller owns the block `value - increment + 1 ..= value`. A counter that
    /// has never been used starts at 0, so the first call with an increment of 1
    /// returns 1.
    pub async fn next(&self, name: &str, increment: i64) -> DocumentStoreResult<i64> {
        if increment <= 0 {
            return Err(DocumentStoreError::validation(format!(
                "sequence increment must be positive, got {increment} for '{name}'"
            )));
        }

        let value = self.backend.find_and_increment(name, increment).await?;

        debug!(target: "entitylayer::sequence", counter = name, increment, value, "allocated sequence block");

        Ok(value)
    }

    /// Shorthand for `next(name, 1)`.
    pub async fn next_one(&self, name: &str) -> DocumentStoreResult<i64> {
        self.next(name, 1).await
    }
}
