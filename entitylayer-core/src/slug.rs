//! Human-readable identifiers derived from a prefix and a sequence number.
//!
//! An entity needs a slug when it has neither a store identifier nor a slug of
//! its own. Slugs are assigned once and never rewritten.

use tracing::debug;

use crate::{
    backend::StoreBackend,
    document::Entity,
    error::DocumentStoreResult,
    sequence::SequenceAllocator,
};

#[derive(Debug)]
pub struct SlugAssigner<'a, B: StoreBackend> {
    allocator: SequenceAllocator<'a, B>,
    prefix: Option<&'a str>,
    counter: &'a str,
}

impl<'a, B: StoreBackend> SlugAssigner<'a, B> {
    /// Creates an assigner drawing from `counter`. Without a prefix every call is a no-op.
    pub fn new(backend: &'a B, prefix: Option<&'a str>, counter: &'a str) -> Self {
        Self { allocator: SequenceAllocator::new(backend), prefix, counter }
    }

    pub fn needs_slug<E: Entity>(entity: &E) -> bool {
        entity.id().is_none() && entity.slug().is_none_or(str::is_empty)
    }

    /// Assigns a slug to `entity` if it needs one. Returns whether a slug was assigned.
    pub async fn assign_if_needed<E: Entity>(&self, entity: &mut E) -> DocumentStoreResult<bool> {
        let Some(prefix) = self.prefix else {
            return Ok(false);
        };
        if !Self::needs_slug(entity) {
            return Ok(false);
        }

        let sequence = self.allocator.next(self.counter, 1).await?;
        entity.assign_slug(format!("{prefix}{sequence}"), sequence);

        Ok(true)
    }

    /// Assigns slugs to every entity in `entities` that needs one, reserving the
    /// whole block with a single allocator call.
    ///
    /// The i-th entity needing a slug (in input order, 0-based) receives
    /// `prefix + (last - n + 1 + i)` where `last` is the allocator's return value
    /// and `n` the number of such entities. Returns `n`.
    pub async fn assign_all<'e, E, I>(&self, entities: I) -> DocumentStoreResult<usize>
    where
        E: Entity + 'e,
        I: IntoIterator<Item = &'e mut E>,
    {
        let Some(prefix) = self.prefix else {
            return Ok(0);
        };

        let mut pending: Vec<&mut E> = entities
            .into_iter()
            .filter(|e| Self::needs_slug(&**e))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let count = pending.len() as i64;
        let last = self.allocator.next(self.counter, count).await?;
        let first = last - count + 1;

        for (offset, entity) in pending.iter_mut().enumerate() {
            let sequence = first + offset as i64;
            entity.assign_slug(format!("{prefix}{sequence}"), sequence);
        }

        debug!(target: "entitylayer::sequence", counter = self.counter, first, last, "assigned slug block");

        Ok(pending.len())
    }
}
