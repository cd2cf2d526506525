//! Tests for the read path and its cache discipline.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use super::context::{ActorContext, TenantId};
use super::error::ErrorCode;
use super::object::StoredObject;
use super::page::{Page, PageRequest};
use super::ports::{
    FixtureObjectCache, MockObjectCache, MockObjectRepository, MockRelationshipRepository,
    MockVersionRepository, ObjectCacheError,
};
use super::reader::Reader;
use super::version::{ChangeType, VersionRecord};

fn reader(objects: MockObjectRepository, cache: MockObjectCache) -> Reader {
    Reader::new(
        Arc::new(objects),
        Arc::new(MockVersionRepository::new()),
        Arc::new(MockRelationshipRepository::new()),
        Arc::new(cache),
    )
}

fn reader_with_versions(versions: MockVersionRepository) -> Reader {
    Reader::new(
        Arc::new(MockObjectRepository::new()),
        Arc::new(versions),
        Arc::new(MockRelationshipRepository::new()),
        Arc::new(FixtureObjectCache),
    )
}

fn object(tenant: TenantId) -> StoredObject {
    StoredObject::create(
        Uuid::new_v4(),
        tenant,
        "CAND".to_owned(),
        "C-1".to_owned(),
        "Candidate".to_owned(),
        json!({"n": 1}),
        &ActorContext::new("ada"),
        Utc::now(),
    )
}

fn version(object_id: Uuid, tenant: TenantId, number: i32) -> VersionRecord {
    VersionRecord {
        id: Uuid::new_v4(),
        object_id,
        tenant_id: tenant,
        type_code: "CAND".to_owned(),
        code: "C-1".to_owned(),
        name: "Candidate".to_owned(),
        status: "ACTIVE".to_owned(),
        version_number: number,
        change_type: ChangeType::Update,
        previous_data: Some(json!({})),
        current_data: Some(json!({})),
        diff: None,
        changed_by: "ada".to_owned(),
        ip: None,
        user_agent: None,
        change_reason: None,
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn get_serves_cache_hits_without_the_store() {
    let tenant = TenantId::random();
    let cached = object(tenant);
    let id = cached.id;

    let mut cache = MockObjectCache::new();
    let hit = cached.clone();
    cache
        .expect_get_by_id()
        .times(1)
        .returning(move |_| Ok(Some(hit.clone())));

    // The store is never consulted: this is the cache-only read that keeps
    // working while the store is down.
    let service = reader(MockObjectRepository::new(), cache);
    let found = service.get(tenant, id).await.expect("cache-only read");
    assert_eq!(found, Some(cached));
}

#[tokio::test]
async fn get_misses_fall_through_and_repopulate() {
    let tenant = TenantId::random();
    let stored = object(tenant);
    let id = stored.id;

    let mut cache = MockObjectCache::new();
    cache.expect_get_by_id().times(1).returning(|_| Ok(None));
    cache
        .expect_put()
        .times(1)
        .withf(move |object| object.id == id)
        .returning(|_| Ok(()));

    let mut objects = MockObjectRepository::new();
    let fetched = stored.clone();
    objects
        .expect_find_by_id()
        .times(1)
        .returning(move |_, _, _| Ok(Some(fetched.clone())));

    let service = reader(objects, cache);
    let found = service.get(tenant, id).await.expect("read succeeds");
    assert_eq!(found, Some(stored));
}

#[tokio::test]
async fn get_treats_cache_errors_as_misses() {
    let tenant = TenantId::random();
    let stored = object(tenant);
    let id = stored.id;

    let mut cache = MockObjectCache::new();
    cache
        .expect_get_by_id()
        .returning(|_| Err(ObjectCacheError::backend("redis timeout")));
    cache.expect_put().returning(|_| Ok(()));

    let mut objects = MockObjectRepository::new();
    let fetched = stored.clone();
    objects
        .expect_find_by_id()
        .times(1)
        .returning(move |_, _, _| Ok(Some(fetched.clone())));

    let service = reader(objects, cache);
    let found = service.get(tenant, id).await.expect("fallthrough read");
    assert_eq!(found.map(|object| object.id), Some(id));
}

#[tokio::test]
async fn cross_tenant_cache_hits_read_as_absent() {
    let cached = object(TenantId::random());
    let id = cached.id;

    let mut cache = MockObjectCache::new();
    cache
        .expect_get_by_id()
        .returning(move |_| Ok(Some(cached.clone())));

    let service = reader(MockObjectRepository::new(), cache);
    let found = service
        .get(TenantId::random(), id)
        .await
        .expect("read succeeds");
    assert_eq!(found, None);
}

#[tokio::test]
async fn get_by_code_resolves_through_the_code_key() {
    let tenant = TenantId::random();
    let stored = object(tenant);
    let id = stored.id;

    let mut cache = MockObjectCache::new();
    cache
        .expect_get_id_by_code()
        .times(1)
        .returning(move |_, _, _| Ok(Some(id)));
    let hit = stored.clone();
    cache
        .expect_get_by_id()
        .times(1)
        .returning(move |_| Ok(Some(hit.clone())));

    let service = reader(MockObjectRepository::new(), cache);
    let found = service
        .get_by_code(tenant, "CAND", "C-1")
        .await
        .expect("code read");
    assert_eq!(found.map(|object| object.id), Some(id));
}

#[tokio::test]
async fn get_by_code_falls_back_to_the_store_on_stale_mappings() {
    let tenant = TenantId::random();
    let stored = object(tenant);

    let mut cache = MockObjectCache::new();
    // Code key points at an id whose obj: entry has expired and whose row
    // is gone from the store.
    cache
        .expect_get_id_by_code()
        .returning(|_, _, _| Ok(Some(Uuid::new_v4())));
    cache.expect_get_by_id().returning(|_| Ok(None));
    cache.expect_put().returning(|_| Ok(()));

    let mut objects = MockObjectRepository::new();
    objects.expect_find_by_id().returning(|_, _, _| Ok(None));
    let by_code = stored.clone();
    objects
        .expect_find_by_code()
        .times(1)
        .returning(move |_, _, _| Ok(Some(by_code.clone())));

    let service = reader(objects, cache);
    let found = service
        .get_by_code(tenant, "CAND", "C-1")
        .await
        .expect("fallback read");
    assert_eq!(found.map(|object| object.code), Some("C-1".to_owned()));
}

#[tokio::test]
async fn bulk_get_with_no_ids_never_touches_the_store() {
    let service = reader(MockObjectRepository::new(), MockObjectCache::new());
    let found = service
        .bulk_get(TenantId::random(), &[])
        .await
        .expect("empty bulk read");
    assert!(found.is_empty());
}

#[tokio::test]
async fn listings_come_straight_from_the_store() {
    let tenant = TenantId::random();
    let stored = object(tenant);

    let mut objects = MockObjectRepository::new();
    let rows = vec![stored.clone()];
    objects
        .expect_list_by_type()
        .times(1)
        .withf(|_, type_code, status, _| type_code == "CAND" && status.is_none())
        .returning(move |_, _, _, page| Ok(Page::new(rows.clone(), 1, page)));

    let service = reader(objects, MockObjectCache::new());
    let page = service
        .list_by_type(tenant, "CAND", PageRequest::new(0, 20))
        .await
        .expect("listing succeeds");
    assert_eq!(page.total, 1);
    assert_eq!(page.items.len(), 1);
}

#[tokio::test]
async fn version_lookup_beyond_current_is_not_found() {
    let mut versions = MockVersionRepository::new();
    versions
        .expect_find_version()
        .times(1)
        .returning(|_, _, _| Ok(None));

    let service = reader_with_versions(versions);
    let error = service
        .version(TenantId::random(), Uuid::new_v4(), 99)
        .await
        .expect_err("version out of range");
    assert_eq!(error.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn time_travel_returns_the_latest_version_at_or_before_the_instant() {
    let tenant = TenantId::random();
    let object_id = Uuid::new_v4();
    let t2 = Utc::now();

    let mut versions = MockVersionRepository::new();
    let mut at_t2 = version(object_id, tenant, 2);
    at_t2.created_at = t2;
    versions
        .expect_find_version_at()
        .times(1)
        .withf(move |_, _, at| *at == t2 + Duration::milliseconds(1))
        .returning(move |_, _, _| Ok(Some(at_t2.clone())));

    let service = reader_with_versions(versions);
    let found = service
        .version_at(tenant, object_id, t2 + Duration::milliseconds(1))
        .await
        .expect("time-travel hit");
    assert_eq!(found.version_number, 2);
}

#[tokio::test]
async fn blank_attribute_keys_are_rejected() {
    let service = reader(MockObjectRepository::new(), MockObjectCache::new());
    let error = service
        .find_by_attribute(
            TenantId::random(),
            "CAND",
            "  ",
            super::ports::AttributeValue::Bool(true),
        )
        .await
        .expect_err("blank key");
    assert_eq!(error.code(), ErrorCode::InvalidArgument);
}
