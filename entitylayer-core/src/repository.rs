//! Lifecycle operations for one entity type: paged search, slug assignment,
//! field-level patches, create-or-overwrite, bulk import and the audit trail.
//!
//! Every mutating call takes an explicit [`AuditContext`]. Change records are
//! written only for entities that are active after the change.
//!
//! ```ignore
//! let repository = store.repository::<Customer>(config, registry);
//! let ctx = AuditContext::interactive("alice");
//!
//! let created = repository.create_or_overwrite(customer, &ctx).await?;
//! let patched = repository
//!     .patch_by_id(created.id.unwrap(), &changes, &["name"], &ctx)
//!     .await?;
//! ```

use bson::{Bson, Document as BsonDocument, Uuid};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audit::{AuditContext, ChangeAction, ChangeRecord, ChangeSource},
    backend::StoreBackend,
    collection::TypedCollection,
    compile::{FilterRequest, QueryCompiler},
    config::EntityConfig,
    diff::{DiffEngine, PropertyChange},
    document::{DocumentExt, Entity},
    error::{DocumentStoreError, DocumentStoreResult},
    page::Page,
    query::{Expr, Filter, Query, Sort},
    registry::FieldRegistry,
    sequence::SequenceAllocator,
    slug::SlugAssigner,
};

/// Outcome of importing one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportAction {
    Created,
    Updated,
    /// The incoming entity matched the stored one value for value; nothing was written.
    Ignored,
}

enum ImportPlan<E> {
    Create(E),
    /// Create after hard-deleting an inactive record with the same id.
    Replace { stale: Uuid, entity: E },
    Overwrite { existing: E, incoming: E },
}

#[derive(Debug)]
pub struct EntityRepository<'a, B: StoreBackend, E: Entity> {
    backend: &'a B,
    config: EntityConfig,
    registry: Arc<FieldRegistry<E>>,
    differ: DiffEngine,
}

impl<'a, B: StoreBackend, E: Entity> EntityRepository<'a, B, E> {
    pub fn new(backend: &'a B, config: EntityConfig, registry: Arc<FieldRegistry<E>>) -> Self {
        let differ = DiffEngine::from_config(&config);

        Self { backend, config, registry, differ }
    }

    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    pub fn registry(&self) -> &FieldRegistry<E> {
        &self.registry
    }

    pub fn collection(&self) -> TypedCollection<'a, B, E> {
        TypedCollection::new(E::collection_name().to_string(), self.backend)
    }

    fn audit_log(&self) -> TypedCollection<'a, B, ChangeRecord> {
        TypedCollection::new(self.config.audit_collection.clone(), self.backend)
    }

    pub fn sequences(&self) -> SequenceAllocator<'a, B> {
        SequenceAllocator::new(self.backend)
    }

    fn slugs(&self) -> SlugAssigner<'_, B> {
        SlugAssigner::new(
            self.backend,
            self.config.slug_prefix.as_deref(),
            self.config.sequence_name_or(E::collection_name()),
        )
    }

    pub fn compiler(&self) -> QueryCompiler<'_> {
        QueryCompiler::new(&self.config)
    }

    fn by_id(&self, id: Uuid) -> Expr {
        Filter::eq(self.config.id_field.as_str(), id)
    }

    fn not_found(&self, key: impl Into<String>) -> DocumentStoreError {
        DocumentStoreError::NotFound(key.into(), E::collection_name().to_string())
    }

    // ── Queries ──

    /// Compiles `request` and returns the requested page.
    pub async fn find_page(&self, request: &FilterRequest) -> DocumentStoreResult<Page<E>> {
        let (compiled, page) = self.compiler().compile_request(request)?;

        self.collection()
            .find_page(compiled.filter, compiled.sort, page)
            .await
    }

    /// Like [`find_page`](Self::find_page), restricted to active entities.
    pub async fn find_active_page(&self, request: &FilterRequest) -> DocumentStoreResult<Page<E>> {
        let (compiled, page) = self.compiler().compile_request(request)?;
        let filter = compiled
            .filter
            .and(Filter::eq(self.config.active_field.as_str(), true));

        self.collection()
            .find_page(filter, compiled.sort, page)
            .await
    }

    pub async fn get_by_id(&self, id: Uuid) -> DocumentStoreResult<E> {
        self.collection()
            .get_one(id)
            .await?
            .ok_or_else(|| self.not_found(id.to_string()))
    }

    pub async fn get_by_slug(&self, slug: &str) -> DocumentStoreResult<E> {
        self.collection()
            .find_one(Filter::eq(self.config.slug_field.as_str(), slug))
            .await?
            .ok_or_else(|| self.not_found(format!("with slug {slug}")))
    }

    /// The audit trail of one entity, oldest first.
    pub async fn history(&self, entity_id: Uuid) -> DocumentStoreResult<Vec<ChangeRecord>> {
        let query = Query::builder()
            .filter(Filter::and([
                Filter::eq("entity_collection", E::collection_name()),
                Filter::eq("entity_id", entity_id),
            ]))
            .sorts(vec![Sort::asc("changed_at")])
            .build();

        self.audit_log().query(query).await
    }

    // ── Slugs and diffs ──

    pub async fn assign_slug(&self, entity: &mut E) -> DocumentStoreResult<bool> {
        self.slugs().assign_if_needed(entity).await
    }

    pub async fn assign_slugs(&self, entities: &mut [E]) -> DocumentStoreResult<usize> {
        self.slugs().assign_all(entities.iter_mut()).await
    }

    /// Update records for every non-identity property that differs between `old` and `new`.
    pub fn diff(&self, old: &E, new: &E, ctx: &AuditContext) -> DocumentStoreResult<Vec<ChangeRecord>> {
        let id = old.require_id("diff")?;
        let changes = self.differ.diff(old, new)?;

        Ok(self.update_records(id, old.slug(), changes, ctx))
    }

    // ── Patches ──

    /// Copies the named properties of `requested` onto the entity stored under `id`
    /// and persists the ones that changed.
    pub async fn patch_by_id<S: AsRef<str>>(
        &self,
        id: Uuid,
        requested: &E,
        properties: &[S],
        ctx: &AuditContext,
    ) -> DocumentStoreResult<E> {
        let properties = self.checked_properties(properties)?;
        let existing = self.get_by_id(id).await?;

        self.apply_patch(existing, requested, &properties, ctx).await
    }

    pub async fn patch_by_slug<S: AsRef<str>>(
        &self,
        slug: &str,
        requested: &E,
        properties: &[S],
        ctx: &AuditContext,
    ) -> DocumentStoreResult<E> {
        let properties = self.checked_properties(properties)?;
        let existing = self.get_by_slug(slug).await?;

        self.apply_patch(existing, requested, &properties, ctx).await
    }

    /// Patches the first entity matching `filter`.
    pub async fn patch_by_filter<S: AsRef<str>>(
        &self,
        filter: Expr,
        requested: &E,
        properties: &[S],
        ctx: &AuditContext,
    ) -> DocumentStoreResult<E> {
        let properties = self.checked_properties(properties)?;
        let existing = self
            .collection()
            .find_one(filter.clone())
            .await?
            .ok_or_else(|| self.not_found(format!("matching {filter:?}")))?;

        self.apply_patch(existing, requested, &properties, ctx).await
    }

    /// Sets the named properties of every entity matching `filter` to the values
    /// held by `requested`. Returns the matched count.
    ///
    /// The values are written as given, without a diff, and no change records
    /// are produced.
    pub async fn patch_many<S: AsRef<str>>(
        &self,
        filter: Expr,
        requested: &E,
        properties: &[S],
        ctx: &AuditContext,
    ) -> DocumentStoreResult<u64> {
        let properties = self.checked_properties(properties)?;
        let values = self.registry.read_all(requested, &properties)?;

        let matched = self.collection().update_fields(filter, values).await?;

        info!(
            target: "entitylayer::repository",
            collection = E::collection_name(),
            user = %ctx.user,
            ?properties,
            matched,
            "patched entities by criteria"
        );

        Ok(matched)
    }

    fn checked_properties<S: AsRef<str>>(&self, properties: &[S]) -> DocumentStoreResult<Vec<String>> {
        let properties: Vec<String> = properties
            .iter()
            .map(|p| p.as_ref().to_string())
            .collect();
        self.registry.validate(&properties)?;

        Ok(properties)
    }

    async fn apply_patch(
        &self,
        existing: E,
        requested: &E,
        properties: &[String],
        ctx: &AuditContext,
    ) -> DocumentStoreResult<E> {
        let id = existing.require_id("patch")?;

        let mut updated = existing.clone();
        for property in properties {
            self.registry.copy(property, requested, &mut updated)?;
        }
        updated.validate().map_err(DocumentStoreError::Validation)?;

        self.resolve_duplicate(&updated, Some(id)).await?;

        let changes = self.differ.diff_properties(&existing, &updated, properties)?;
        if changes.is_empty() {
            debug!(target: "entitylayer::repository", %id, "patch changed nothing");
            return Ok(existing);
        }

        let changed: Vec<String> = changes.iter().map(|c| c.property.clone()).collect();
        let values = self.registry.read_all(&updated, &changed)?;
        self.collection().update_fields(self.by_id(id), values).await?;

        if updated.is_active() {
            self.record(self.update_records(id, updated.slug(), changes, ctx)).await?;
        }

        Ok(updated)
    }

    // ── Create, overwrite and import ──

    /// Creates `entity`, or replaces the stored entity with the same id.
    ///
    /// An overwrite keeps every identity field of the stored copy and writes
    /// nothing when no other field changed.
    pub async fn create_or_overwrite(&self, entity: E, ctx: &AuditContext) -> DocumentStoreResult<E> {
        if let Some(id) = entity.id()
            && let Some(existing) = self.collection().get_one(id).await?
        {
            return self.overwrite(existing, entity, ctx).await;
        }

        entity.validate().map_err(DocumentStoreError::Validation)?;

        self.create_new(entity, ctx).await
    }

    async fn overwrite(&self, existing: E, incoming: E, ctx: &AuditContext) -> DocumentStoreResult<E> {
        incoming.validate().map_err(DocumentStoreError::Validation)?;
        let id = existing.require_id("overwrite")?;

        let mut document = incoming.to_document()?;
        let stored = existing.to_document()?;
        for field in &self.config.identity_fields {
            match stored.get(field) {
                Some(value) => document.insert(field.clone(), value.clone()),
                None => document.remove(field),
            };
        }
        let mut updated = E::from_bson(Bson::Document(document))?;

        self.resolve_duplicate(&updated, Some(id)).await?;

        let changes = self.differ.diff(&existing, &updated)?;
        if changes.is_empty() {
            debug!(target: "entitylayer::repository", %id, "overwrite changed nothing");
            return Ok(existing);
        }

        updated.stamp(ctx, false);
        self.collection().update(vec![updated.clone()]).await?;

        if updated.is_active() {
            self.record(self.update_records(id, updated.slug(), changes, ctx)).await?;
        }

        Ok(updated)
    }

    /// Duplicate check, then slug, id, stamp, insert and create record.
    ///
    /// The slug is drawn only once the duplicate check has passed, so a
    /// rejected create leaves the sequence untouched.
    async fn create_new(&self, mut entity: E, ctx: &AuditContext) -> DocumentStoreResult<E> {
        self.resolve_duplicate(&entity, entity.id()).await?;
        self.assign_slug(&mut entity).await?;

        let id = match entity.id() {
            Some(id) => id,
            None => {
                let id = Uuid::new();
                entity.set_id(id);
                id
            }
        };
        entity.stamp(ctx, true);

        self.collection().insert(vec![entity.clone()]).await?;

        info!(
            target: "entitylayer::repository",
            collection = E::collection_name(),
            %id,
            slug = entity.slug().unwrap_or_default(),
            user = %ctx.user,
            "created entity"
        );

        if entity.is_active() {
            let record = ChangeRecord::entity_level(
                E::collection_name(),
                id,
                entity.slug(),
                ChangeAction::Create,
                ctx,
            );
            self.record(vec![record]).await?;
        }

        Ok(entity)
    }

    /// Imports `entities` in order.
    ///
    /// Every entity is validated before anything is written. Each one is then
    /// matched against the store by id, then by its duplicate filter, right
    /// before it is written, so a later entity sees the ones imported before it.
    /// Matches are merged field by field (null incoming values keep the stored
    /// value) and skipped as [`ImportAction::Ignored`] when nothing changed,
    /// unless `force` is set. Everything else is created.
    ///
    /// The first failure aborts the import. Entities imported before it stay
    /// committed.
    pub async fn bulk_import(
        &self,
        entities: Vec<E>,
        ctx: &AuditContext,
        force: bool,
    ) -> DocumentStoreResult<Vec<(E, ImportAction)>> {
        let ctx = ctx.with_source(ChangeSource::Import);
        let total = entities.len();

        for entity in &entities {
            entity.validate().map_err(DocumentStoreError::Validation)?;
        }

        let mut results = Vec::with_capacity(total);
        for (index, entity) in entities.into_iter().enumerate() {
            let outcome = match self.plan_import(entity).await {
                Ok(plan) => self.execute_import(plan, &ctx, force).await,
                Err(err) => Err(err),
            };

            match outcome {
                Ok(outcome) => results.push(outcome),
                Err(err) => {
                    warn!(
                        target: "entitylayer::repository",
                        collection = E::collection_name(),
                        index,
                        committed = results.len(),
                        error = %err,
                        "aborting import"
                    );
                    return Err(err);
                }
            }
        }

        info!(
            target: "entitylayer::repository",
            collection = E::collection_name(),
            total,
            created = results.iter().filter(|(_, a)| *a == ImportAction::Created).count(),
            updated = results.iter().filter(|(_, a)| *a == ImportAction::Updated).count(),
            user = %ctx.user,
            "imported entities"
        );

        Ok(results)
    }

    async fn plan_import(&self, entity: E) -> DocumentStoreResult<ImportPlan<E>> {
        if let Some(id) = entity.id()
            && let Some(existing) = self.collection().get_one(id).await?
        {
            return Ok(if existing.is_active() {
                ImportPlan::Overwrite { existing, incoming: entity }
            } else {
                ImportPlan::Replace { stale: id, entity }
            });
        }

        // Inactive duplicates are left to the duplicate check at insert time.
        if let Some(filter) = entity.duplicate_filter()
            && let Some(existing) = self.collection().find_one(filter).await?
            && existing.is_active()
        {
            return Ok(ImportPlan::Overwrite { existing, incoming: entity });
        }

        Ok(ImportPlan::Create(entity))
    }

    async fn execute_import(
        &self,
        plan: ImportPlan<E>,
        ctx: &AuditContext,
        force: bool,
    ) -> DocumentStoreResult<(E, ImportAction)> {
        match plan {
            ImportPlan::Create(entity) => Ok((self.create_new(entity, ctx).await?, ImportAction::Created)),
            ImportPlan::Replace { stale, entity } => {
                warn!(target: "entitylayer::repository", collection = E::collection_name(), id = %stale, "replacing inactive record");
                self.collection().delete(vec![stale]).await?;

                Ok((self.create_new(entity, ctx).await?, ImportAction::Created))
            }
            ImportPlan::Overwrite { existing, incoming } => {
                let id = existing.require_id("import")?;
                let mut merged = self.merge(&existing, &incoming)?;

                let changes = self.differ.diff(&existing, &merged)?;
                if changes.is_empty() && !force {
                    return Ok((existing, ImportAction::Ignored));
                }

                self.resolve_duplicate(&merged, Some(id)).await?;
                merged.stamp(ctx, false);
                self.collection().update(vec![merged.clone()]).await?;

                if merged.is_active() {
                    self.record(self.update_records(id, merged.slug(), changes, ctx)).await?;
                }

                Ok((merged, ImportAction::Updated))
            }
        }
    }

    /// The stored entity with every non-null, non-identity field of `incoming` laid over it.
    fn merge(&self, existing: &E, incoming: &E) -> DocumentStoreResult<E> {
        let mut merged = existing.to_document()?;
        for (key, value) in incoming.to_document()? {
            if key == "_id" || self.config.is_identity_field(&key) || matches!(value, Bson::Null) {
                continue;
            }
            merged.insert(key, value);
        }

        E::from_bson(Bson::Document(merged))
    }

    // ── Deletes ──

    /// Clears the active flag. Soft-deleting an inactive entity is a no-op.
    pub async fn soft_delete_by_id(&self, id: Uuid, ctx: &AuditContext) -> DocumentStoreResult<E> {
        let existing = self.get_by_id(id).await?;
        if !existing.is_active() {
            return Ok(existing);
        }

        let active = self.config.active_field.as_str();
        let mut fields = BsonDocument::new();
        fields.insert(active, false);
        self.collection().update_fields(self.by_id(id), fields).await?;

        let change = PropertyChange {
            property: active.to_string(),
            old_value: Some(true.to_string()),
            new_value: Some(false.to_string()),
        };
        let record = ChangeRecord::for_property(
            E::collection_name(),
            id,
            existing.slug(),
            ChangeAction::Delete,
            change,
            ctx,
        );
        self.record(vec![record]).await?;

        info!(target: "entitylayer::repository", collection = E::collection_name(), %id, user = %ctx.user, "soft-deleted entity");

        self.get_by_id(id).await
    }

    /// Removes the entity from the store.
    pub async fn delete_by_id(&self, id: Uuid, ctx: &AuditContext) -> DocumentStoreResult<()> {
        let existing = self.get_by_id(id).await?;
        self.collection().delete(vec![id]).await?;

        if existing.is_active() {
            let record = ChangeRecord::entity_level(
                E::collection_name(),
                id,
                existing.slug(),
                ChangeAction::Delete,
                ctx,
            );
            self.record(vec![record]).await?;
        }

        info!(target: "entitylayer::repository", collection = E::collection_name(), %id, user = %ctx.user, "deleted entity");

        Ok(())
    }

    // ── Maintenance ──

    /// Unique sparse indexes on the slug and sequence fields, plus a lookup index
    /// on the audit collection.
    pub async fn ensure_indexes(&self) -> DocumentStoreResult<()> {
        let collection = E::collection_name();

        self.backend
            .add_index(collection, &self.config.slug_field, true, true)
            .await?;
        self.backend
            .add_index(collection, &self.config.sequence_field, true, true)
            .await?;
        self.backend
            .add_index(&self.config.audit_collection, "entity_id", false, false)
            .await
    }

    // ── Internals ──

    /// Rejects `entity` if another active entity collides with it; removes an
    /// inactive one instead.
    async fn resolve_duplicate(&self, entity: &E, own_id: Option<Uuid>) -> DocumentStoreResult<()> {
        let Some(filter) = entity.duplicate_filter() else {
            return Ok(());
        };
        let filter = match own_id {
            Some(id) => Filter::and([filter, Filter::ne(self.config.id_field.as_str(), id)]),
            None => filter,
        };

        let Some(duplicate) = self.collection().find_one(filter).await? else {
            return Ok(());
        };
        let duplicate_id = duplicate.require_id("duplicate check")?;

        if duplicate.is_active() {
            let key = duplicate
                .slug()
                .map(str::to_string)
                .unwrap_or_else(|| duplicate_id.to_string());

            return Err(DocumentStoreError::AlreadyExists(key, E::collection_name().to_string()));
        }

        warn!(
            target: "entitylayer::repository",
            collection = E::collection_name(),
            id = %duplicate_id,
            "removing inactive duplicate"
        );

        self.collection().delete(vec![duplicate_id]).await
    }

    fn update_records(
        &self,
        id: Uuid,
        slug: Option<&str>,
        changes: Vec<PropertyChange>,
        ctx: &AuditContext,
    ) -> Vec<ChangeRecord> {
        changes
            .into_iter()
            .map(|change| {
                ChangeRecord::for_property(E::collection_name(), id, slug, ChangeAction::Update, change, ctx)
            })
            .collect()
    }

    async fn record(&self, mut records: Vec<ChangeRecord>) -> DocumentStoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        for record in &mut records {
            record.id = Some(Uuid::new());
        }

        self.audit_log().insert(records).await
    }
}
