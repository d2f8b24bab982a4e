//! Integration tests for entity repositories over the in-memory backend.
//!
//! Tests for:
//! - Slug assignment on create and in batches
//! - Field-level patches and their change records
//! - Create-or-overwrite and bulk import outcomes
//! - Duplicate detection against active and inactive records
//! - Soft and hard deletes
//! - Paged, filtered searches

mod common;

use common::{Customer, config, ctx, registry, store};
use entitylayer::{
    audit::{AuditContext, ChangeAction, ChangeRecord, ChangeSource},
    bson::DateTime,
    compile::FilterRequest,
    error::DocumentStoreError,
    filter::FilterDescription,
    query::Filter,
    repository::ImportAction,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn filter(value: serde_json::Value) -> FilterDescription {
    serde_json::from_value(value).unwrap()
}

fn names(customers: &[Customer]) -> Vec<&str> {
    customers.iter().map(|c| c.name.as_str()).collect()
}

// ============================================================================
// Slugs
// ============================================================================

#[tokio::test]
async fn test_slugs_follow_counter_and_survive_resave() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());

    let a = customers
        .create_or_overwrite(Customer::new("Alice", None, Some("Oslo"), 10.0), &ctx())
        .await
        .unwrap();
    let b = customers
        .create_or_overwrite(Customer::new("Bob", None, Some("Oslo"), 20.0), &ctx())
        .await
        .unwrap();

    assert_eq!(a.slug.as_deref(), Some("U1"));
    assert_eq!(a.sequence, Some(1));
    assert_eq!(b.slug.as_deref(), Some("U2"));

    let resaved = customers.create_or_overwrite(a.clone(), &ctx()).await.unwrap();
    assert_eq!(resaved, a);
    assert_eq!(customers.get_by_slug("U1").await.unwrap(), a);

    let history = customers.history(a.id.unwrap()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].action, ChangeAction::Create);
}

#[tokio::test]
async fn test_slug_batch_reserves_one_block() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    store.sequences().next("customers", 10).await.unwrap();

    let mut batch: Vec<Customer> = ["A", "B", "C", "D", "E"]
        .into_iter()
        .map(|name| Customer::new(name, None, None, 0.0))
        .collect();

    let assigned = customers.assign_slugs(&mut batch).await.unwrap();

    assert_eq!(assigned, 5);
    assert_eq!(
        batch.iter().map(|c| c.slug.clone().unwrap()).collect::<Vec<_>>(),
        vec!["U11", "U12", "U13", "U14", "U15"],
    );
    assert_eq!(batch.iter().map(|c| c.sequence.unwrap()).collect::<Vec<_>>(), vec![11, 12, 13, 14, 15]);
    assert_eq!(store.backend().counter_value("customers").await, Some(15));
}

#[tokio::test]
async fn test_slug_batch_skips_entities_that_have_one() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());

    let mut keep = Customer::new("Kept", None, None, 0.0);
    keep.slug = Some("LEGACY-9".to_string());
    let mut batch = vec![
        Customer::new("First", None, None, 0.0),
        keep,
        Customer::new("Stored", None, None, 0.0).with_id(),
        Customer::new("Last", None, None, 0.0),
    ];

    assert_eq!(customers.assign_slugs(&mut batch).await.unwrap(), 2);
    assert_eq!(
        batch.iter().map(|c| c.slug.as_deref()).collect::<Vec<_>>(),
        vec![Some("U1"), Some("LEGACY-9"), None, Some("U2")],
    );
}

// ============================================================================
// Patches
// ============================================================================

#[tokio::test]
async fn test_patch_changes_only_named_property() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let before = customers
        .create_or_overwrite(Customer::new("Alice", Some("alice@example.com"), Some("Oslo"), 10.0), &ctx())
        .await
        .unwrap();
    let id = before.id.unwrap();

    let requested = Customer::new("Bob", Some("other@example.com"), Some("Bergen"), 99.0);
    let patched = customers
        .patch_by_id(id, &requested, &["name"], &AuditContext::interactive("bob"))
        .await
        .unwrap();

    let mut expected = before.clone();
    expected.name = "Bob".to_string();
    assert_eq!(patched, expected);
    assert_eq!(customers.get_by_id(id).await.unwrap(), expected);

    let history = customers.history(id).await.unwrap();
    assert_eq!(history.len(), 2);
    let update = &history[1];
    assert_eq!(update.action, ChangeAction::Update);
    assert_eq!(update.prop_changed.as_deref(), Some("name"));
    assert_eq!(update.old_value.as_deref(), Some("Alice"));
    assert_eq!(update.new_value.as_deref(), Some("Bob"));
    assert_eq!(update.changed_by, "bob");
    assert_eq!(update.entity_slug.as_deref(), Some("U1"));
}

#[tokio::test]
async fn test_patch_without_changes_writes_nothing() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let existing = customers
        .create_or_overwrite(Customer::new("Alice", None, Some("Oslo"), 10.0), &ctx())
        .await
        .unwrap();

    let patched = customers
        .patch_by_slug("U1", &Customer::new("Alice", None, None, 0.0), &["name"], &ctx())
        .await
        .unwrap();

    assert_eq!(patched, existing);
    assert_eq!(customers.history(existing.id.unwrap()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_patch_rejects_unknown_or_missing_properties() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let existing = customers
        .create_or_overwrite(Customer::new("Alice", None, None, 10.0), &ctx())
        .await
        .unwrap();
    let id = existing.id.unwrap();

    let unknown = customers.patch_by_id(id, &existing, &["slug"], &ctx()).await;
    assert!(matches!(unknown, Err(DocumentStoreError::Validation(_))));

    let none: [&str; 0] = [];
    let empty = customers.patch_by_id(id, &existing, &none, &ctx()).await;
    assert!(matches!(empty, Err(DocumentStoreError::Validation(_))));
}

#[tokio::test]
async fn test_patch_of_missing_entity_is_not_found() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let requested = Customer::new("Ghost", None, None, 0.0);

    let by_slug = customers.patch_by_slug("U404", &requested, &["name"], &ctx()).await;
    assert!(matches!(by_slug, Err(DocumentStoreError::NotFound(..))));

    let by_filter = customers
        .patch_by_filter(Filter::eq("name", "Nobody"), &requested, &["name"], &ctx())
        .await;
    assert!(matches!(by_filter, Err(DocumentStoreError::NotFound(..))));
}

#[tokio::test]
async fn test_patch_rejects_invalid_result() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let existing = customers
        .create_or_overwrite(Customer::new("Alice", None, None, 10.0), &ctx())
        .await
        .unwrap();

    let blank = Customer::new("  ", None, None, 0.0);
    let result = customers.patch_by_id(existing.id.unwrap(), &blank, &["name"], &ctx()).await;

    assert!(matches!(result, Err(DocumentStoreError::Validation(_))));
    assert_eq!(customers.get_by_id(existing.id.unwrap()).await.unwrap().name, "Alice");
}

#[tokio::test]
async fn test_patch_into_active_duplicate_fails() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    customers
        .create_or_overwrite(Customer::new("Alice", Some("alice@example.com"), None, 0.0), &ctx())
        .await
        .unwrap();
    let bob = customers
        .create_or_overwrite(Customer::new("Bob", Some("bob@example.com"), None, 0.0), &ctx())
        .await
        .unwrap();

    let requested = Customer::new("Bob", Some("alice@example.com"), None, 0.0);
    let result = customers.patch_by_id(bob.id.unwrap(), &requested, &["email"], &ctx()).await;

    match result {
        Err(DocumentStoreError::AlreadyExists(key, collection)) => {
            assert_eq!(key, "U1");
            assert_eq!(collection, "customers");
        }
        other => panic!("expected a duplicate error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_patch_many_sets_values_without_audit() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    for (name, city) in [("Alice", "Oslo"), ("Bob", "Oslo"), ("Carol", "Bergen")] {
        customers
            .create_or_overwrite(Customer::new(name, None, Some(city), 0.0), &ctx())
            .await
            .unwrap();
    }
    let audit = store.typed_collection_named::<ChangeRecord>("change_records");
    let records_before = audit.count(None).await.unwrap();

    let requested = Customer::new("ignored", None, Some("Trondheim"), 0.0);
    let matched = customers
        .patch_many(Filter::eq("city", "Oslo"), &requested, &["city"], &ctx())
        .await
        .unwrap();

    assert_eq!(matched, 2);
    assert_eq!(audit.count(None).await.unwrap(), records_before);
    let moved = customers
        .collection()
        .count(Some(Filter::eq("city", "Trondheim")))
        .await
        .unwrap();
    assert_eq!(moved, 2);
}

// ============================================================================
// Diffs
// ============================================================================

#[tokio::test]
async fn test_diff_reports_single_changed_field() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let old = customers
        .create_or_overwrite(Customer::new("Alice", None, Some("Oslo"), 10.0), &ctx())
        .await
        .unwrap();

    assert!(customers.diff(&old, &old, &ctx()).unwrap().is_empty());

    let mut new = old.clone();
    new.city = Some("Bergen".to_string());
    new.modified_by = Some("someone else".to_string());
    let records = customers.diff(&old, &new, &ctx()).unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].prop_changed.as_deref(), Some("city"));
    assert_eq!(records[0].old_value.as_deref(), Some("Oslo"));
    assert_eq!(records[0].new_value.as_deref(), Some("Bergen"));
}

// ============================================================================
// Create, overwrite and import
// ============================================================================

#[tokio::test]
async fn test_overwrite_keeps_identity_fields() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let created = customers
        .create_or_overwrite(Customer::new("Alice", None, Some("Oslo"), 10.0), &ctx())
        .await
        .unwrap();

    let mut incoming = Customer::new("Alice", None, Some("Bergen"), 10.0);
    incoming.id = created.id;
    incoming.slug = Some("HIJACK".to_string());
    let overwritten = customers
        .create_or_overwrite(incoming, &AuditContext::interactive("bob"))
        .await
        .unwrap();

    assert_eq!(overwritten.slug.as_deref(), Some("U1"));
    assert_eq!(overwritten.created_by.as_deref(), Some("alice"));
    assert_eq!(overwritten.modified_by.as_deref(), Some("bob"));
    assert_eq!(overwritten.city.as_deref(), Some("Bergen"));

    let history = customers.history(created.id.unwrap()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].prop_changed.as_deref(), Some("city"));
}

#[tokio::test]
async fn test_import_creates_ignores_and_creates() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let existing = customers
        .create_or_overwrite(Customer::new("Bob", Some("bob@example.com"), Some("Oslo"), 5.0), &ctx())
        .await
        .unwrap();
    let audit = store.typed_collection_named::<ChangeRecord>("change_records");
    let records_before = audit.count(None).await.unwrap();

    let batch = vec![
        Customer::new("Alice", Some("alice@example.com"), Some("Oslo"), 1.0),
        existing.clone(),
        Customer::new("Carol", Some("carol@example.com"), Some("Bergen"), 3.0),
    ];
    let results = customers.bulk_import(batch, &ctx(), false).await.unwrap();

    assert_eq!(
        results.iter().map(|(_, action)| *action).collect::<Vec<_>>(),
        vec![ImportAction::Created, ImportAction::Ignored, ImportAction::Created],
    );
    assert_eq!(audit.count(None).await.unwrap(), records_before + 2);
    assert_eq!(results[0].0.slug.as_deref(), Some("U2"));
    assert_eq!(results[1].0, existing);
    assert_eq!(results[2].0.slug.as_deref(), Some("U3"));

    let created = customers.history(results[0].0.id.unwrap()).await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].source, ChangeSource::Import);
}

#[tokio::test]
async fn test_import_merges_by_duplicate_key() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let existing = customers
        .create_or_overwrite(Customer::new("Bob", Some("bob@example.com"), Some("Oslo"), 5.0), &ctx())
        .await
        .unwrap();

    let incoming = Customer::new("Bob", Some("bob@example.com"), None, 7.5);
    let results = customers.bulk_import(vec![incoming], &ctx(), false).await.unwrap();

    assert_eq!(results.len(), 1);
    let (merged, action) = &results[0];
    assert_eq!(*action, ImportAction::Updated);
    assert_eq!(merged.id, existing.id);
    assert_eq!(merged.slug, existing.slug);
    // A null incoming value keeps the stored one.
    assert_eq!(merged.city.as_deref(), Some("Oslo"));
    assert_eq!(merged.balance, 7.5);

    let history = customers.history(existing.id.unwrap()).await.unwrap();
    assert_eq!(history.last().unwrap().prop_changed.as_deref(), Some("balance"));
    assert_eq!(history.last().unwrap().source, ChangeSource::Import);
}

#[tokio::test]
async fn test_forced_import_updates_unchanged_entity() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let existing = customers
        .create_or_overwrite(Customer::new("Bob", None, Some("Oslo"), 5.0), &ctx())
        .await
        .unwrap();

    let results = customers
        .bulk_import(vec![existing.clone()], &AuditContext::import("loader"), true)
        .await
        .unwrap();

    assert_eq!(results[0].1, ImportAction::Updated);
    assert_eq!(results[0].0.modified_by.as_deref(), Some("loader"));
    // Nothing differed, so nothing was audited.
    assert_eq!(customers.history(existing.id.unwrap()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_import_overwrites_earlier_row_with_same_key() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());

    let batch = vec![
        Customer::new("Alice", Some("a@x.com"), Some("Oslo"), 1.0),
        Customer::new("Alice", Some("a@x.com"), Some("Rome"), 1.0),
    ];
    let results = customers.bulk_import(batch, &ctx(), false).await.unwrap();

    assert_eq!(
        results.iter().map(|(_, action)| *action).collect::<Vec<_>>(),
        vec![ImportAction::Created, ImportAction::Updated],
    );
    assert_eq!(results[1].0.id, results[0].0.id);
    assert_eq!(results[1].0.slug.as_deref(), Some("U1"));
    assert_eq!(results[1].0.city.as_deref(), Some("Rome"));
    assert_eq!(customers.collection().count(None).await.unwrap(), 1);
    assert_eq!(store.backend().counter_value("customers").await, Some(1));
}

#[tokio::test]
async fn test_import_validates_before_writing() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());

    let batch = vec![
        Customer::new("Alice", None, None, 1.0),
        Customer::new("", None, None, 2.0),
    ];
    let result = customers.bulk_import(batch, &ctx(), false).await;

    assert!(matches!(result, Err(DocumentStoreError::Validation(_))));
    assert_eq!(customers.collection().count(None).await.unwrap(), 0);
}

// ============================================================================
// Duplicates and deletes
// ============================================================================

#[tokio::test]
async fn test_duplicate_of_active_entity_is_rejected() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    customers
        .create_or_overwrite(Customer::new("Alice", Some("alice@example.com"), None, 0.0), &ctx())
        .await
        .unwrap();

    let result = customers
        .create_or_overwrite(Customer::new("Alicia", Some("alice@example.com"), None, 0.0), &ctx())
        .await;

    assert!(matches!(result, Err(DocumentStoreError::AlreadyExists(..))));
}

#[tokio::test]
async fn test_rejected_duplicate_leaves_counter_unchanged() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    customers
        .create_or_overwrite(Customer::new("Alice", Some("a@x.com"), None, 0.0), &ctx())
        .await
        .unwrap();

    let result = customers
        .create_or_overwrite(Customer::new("Alicia", Some("a@x.com"), None, 0.0), &ctx())
        .await;
    assert!(matches!(result, Err(DocumentStoreError::AlreadyExists(ref key, _)) if key == "U1"));
    assert_eq!(store.backend().counter_value("customers").await, Some(1));

    let bob = customers
        .create_or_overwrite(Customer::new("Bob", Some("b@x.com"), None, 0.0), &ctx())
        .await
        .unwrap();
    assert_eq!(bob.slug.as_deref(), Some("U2"));
    assert_eq!(store.backend().counter_value("customers").await, Some(2));
}

#[tokio::test]
async fn test_soft_deleted_duplicate_is_replaced() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let old = customers
        .create_or_overwrite(Customer::new("Alice", Some("alice@example.com"), None, 0.0), &ctx())
        .await
        .unwrap();
    let old_id = old.id.unwrap();

    let deleted = customers.soft_delete_by_id(old_id, &ctx()).await.unwrap();
    assert!(!deleted.active);

    let new = customers
        .create_or_overwrite(Customer::new("Alicia", Some("alice@example.com"), None, 0.0), &ctx())
        .await
        .unwrap();

    assert_ne!(new.id, old.id);
    assert!(customers.get_by_id(old_id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_soft_delete_records_flag_change_once() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let alice = customers
        .create_or_overwrite(Customer::new("Alice", None, None, 0.0), &ctx())
        .await
        .unwrap();
    let bob = customers
        .create_or_overwrite(Customer::new("Bob", None, None, 0.0), &ctx())
        .await
        .unwrap();
    let id = alice.id.unwrap();

    customers.soft_delete_by_id(id, &ctx()).await.unwrap();
    customers.soft_delete_by_id(id, &ctx()).await.unwrap();

    let history = customers.history(id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action, ChangeAction::Delete);
    assert_eq!(history[1].prop_changed.as_deref(), Some("active"));
    assert_eq!(history[1].old_value.as_deref(), Some("true"));
    assert_eq!(history[1].new_value.as_deref(), Some("false"));

    let request = FilterRequest::default();
    let active = customers.find_active_page(&request).await.unwrap();
    assert_eq!(active.items, vec![bob]);
    assert_eq!(customers.find_page(&request).await.unwrap().total_elements, 2);
}

#[tokio::test]
async fn test_hard_delete_removes_entity() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    let alice = customers
        .create_or_overwrite(Customer::new("Alice", None, None, 0.0), &ctx())
        .await
        .unwrap();
    let id = alice.id.unwrap();

    customers.delete_by_id(id, &ctx()).await.unwrap();

    assert!(customers.get_by_id(id).await.unwrap_err().is_not_found());
    assert!(customers.delete_by_id(id, &ctx()).await.unwrap_err().is_not_found());
    let history = customers.history(id).await.unwrap();
    assert_eq!(
        history.iter().map(|r| r.action).collect::<Vec<_>>(),
        vec![ChangeAction::Create, ChangeAction::Delete],
    );
}

// ============================================================================
// Paged searches
// ============================================================================

async fn seed(customers: &entitylayer::repository::EntityRepository<'_, entitylayer::memory::InMemoryStore, Customer>) {
    let people = [
        ("Dave", Some("Oslo"), 40.0),
        ("Alice", Some("Oslo"), 10.0),
        ("Carol", None, 30.0),
        ("Bob", Some("Bergen"), 20.0),
        ("Erin", Some(""), 50.0),
    ];
    for (name, city, balance) in people {
        customers
            .create_or_overwrite(Customer::new(name, None, city, balance), &ctx())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_find_page_uses_default_sort_and_pages() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    seed(&customers).await;

    let first = customers.find_page(&FilterRequest::new(0, 2)).await.unwrap();
    assert_eq!(names(&first.items), vec!["Alice", "Bob"]);
    assert_eq!(first.page_size, 2);
    assert_eq!(first.total_elements, 5);
    assert_eq!(first.total_pages, 3);
    assert!(first.has_next());

    let last = customers.find_page(&FilterRequest::new(2, 2)).await.unwrap();
    assert_eq!(names(&last.items), vec!["Erin"]);
    assert!(!last.has_next());
}

#[tokio::test]
async fn test_find_page_with_set_blanks_and_sort() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    seed(&customers).await;

    let request = FilterRequest::new(0, 10)
        .with_filter("city", filter(json!({ "filterType": "set", "values": ["Oslo", "(Blanks)"] })))
        .with_sort(entitylayer::query::Sort::desc("balance"));
    let page = customers.find_page(&request).await.unwrap();

    assert_eq!(names(&page.items), vec!["Erin", "Dave", "Carol", "Alice"]);
}

#[tokio::test]
async fn test_find_page_with_number_filter() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    seed(&customers).await;

    let request = FilterRequest::new(0, 10).with_filter(
        "balance",
        filter(json!({
            "filterType": "number",
            "operator": "OR",
            "condition1": { "type": "lessThan", "filter": 15 },
            "condition2": { "type": "greaterThanOrEqual", "filter": 40 },
        })),
    );
    let page = customers.find_page(&request).await.unwrap();

    assert_eq!(names(&page.items), vec!["Alice", "Dave", "Erin"]);
}

#[tokio::test]
async fn test_date_filter_matches_whole_day() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());
    // 2024-03-10T08:00:00Z
    let morning = 1_710_057_600_000;
    let at = |millis: i64| AuditContext::new("alice", ChangeSource::Interactive, DateTime::from_millis(millis));

    customers
        .create_or_overwrite(Customer::new("Early", None, None, 0.0), &at(morning))
        .await
        .unwrap();
    customers
        .create_or_overwrite(Customer::new("Late", None, None, 0.0), &at(morning + 15 * 3_600_000))
        .await
        .unwrap();
    customers
        .create_or_overwrite(Customer::new("Tomorrow", None, None, 0.0), &at(morning + 24 * 3_600_000))
        .await
        .unwrap();

    let request = FilterRequest::new(0, 10).with_filter(
        "created_at",
        filter(json!({ "filterType": "date", "type": "equals", "dateFrom": morning + 3_600_000 })),
    );
    let page = customers.find_page(&request).await.unwrap();

    assert_eq!(names(&page.items), vec!["Early", "Late"]);
}

#[tokio::test]
async fn test_filter_on_unlisted_field_is_rejected() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());

    let request = FilterRequest::new(0, 10)
        .with_filter("slug", filter(json!({ "filterType": "exactMatch", "filter": "U1" })));

    assert!(matches!(
        customers.find_page(&request).await,
        Err(DocumentStoreError::Validation(_)),
    ));
    assert!(matches!(
        customers.find_page(&FilterRequest::new(0, 0)).await,
        Err(DocumentStoreError::Validation(_)),
    ));
}

#[tokio::test]
async fn test_ensure_indexes_on_memory_backend() {
    let store = store();
    let customers = store.repository::<Customer>(config(), registry());

    customers.ensure_indexes().await.unwrap();
}
