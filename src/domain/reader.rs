//! Read path: cache-first point lookups and store-backed listings.
//!
//! Point reads consult the look-aside cache before the store and repopulate
//! it on a miss. Listings and counts go straight to the store: pagination
//! defeats per-row caching. Cache failures are logged and treated as
//! misses; they never surface to callers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use super::context::TenantId;
use super::error::Error;
use super::object::{ObjectStatus, StoredObject};
use super::page::{Page, PageRequest};
use super::ports::{
    AttributeValue, ObjectCache, ObjectRepository, ObjectRepositoryError, RelationshipRepository,
    RelationshipRepositoryError, VersionRepository, VersionRepositoryError,
};
use super::relationship::ObjectRelationship;
use super::version::VersionRecord;

/// The read-path service.
pub struct Reader {
    objects: Arc<dyn ObjectRepository>,
    versions: Arc<dyn VersionRepository>,
    relationships: Arc<dyn RelationshipRepository>,
    cache: Arc<dyn ObjectCache>,
}

impl Reader {
    /// Wire the read path from its ports.
    pub fn new(
        objects: Arc<dyn ObjectRepository>,
        versions: Arc<dyn VersionRepository>,
        relationships: Arc<dyn RelationshipRepository>,
        cache: Arc<dyn ObjectCache>,
    ) -> Self {
        Self {
            objects,
            versions,
            relationships,
            cache,
        }
    }

    /// Fetch one object by id, cache first.
    ///
    /// A cached row from another tenant or a deleted row reads as absent.
    pub async fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<StoredObject>, Error> {
        match self.cache.get_by_id(id).await {
            Ok(Some(object)) => {
                if object.tenant_id == tenant && !object.deleted {
                    debug!(object_id = %id, "cache hit");
                    return Ok(Some(object));
                }
                // Cached copy exists but is not visible to this caller; the
                // store would answer the same way.
                return Ok(None);
            }
            Ok(None) => {}
            Err(err) => warn!(object_id = %id, error = %err, "cache read failed, falling through"),
        }

        let object = self
            .objects
            .find_by_id(tenant, id, false)
            .await
            .map_err(map_object_error)?;
        if let Some(object) = &object {
            if let Err(err) = self.cache.put(object).await {
                warn!(object_id = %id, error = %err, "cache repopulation failed");
            }
        }
        Ok(object)
    }

    /// Fetch one object by its code, resolving the id through the cache's
    /// code key when possible.
    pub async fn get_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<Option<StoredObject>, Error> {
        match self.cache.get_id_by_code(tenant, type_code, code).await {
            Ok(Some(id)) => {
                if let Some(object) = self.get(tenant, id).await? {
                    return Ok(Some(object));
                }
                // Stale code mapping; fall through to the store.
            }
            Ok(None) => {}
            Err(err) => warn!(%type_code, %code, error = %err, "cache code read failed, falling through"),
        }

        let object = self
            .objects
            .find_by_code(tenant, type_code, code)
            .await
            .map_err(map_object_error)?;
        if let Some(object) = &object {
            if let Err(err) = self.cache.put(object).await {
                warn!(object_id = %object.id, error = %err, "cache repopulation failed");
            }
        }
        Ok(object)
    }

    /// Page through live objects of one type.
    pub async fn list_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, Error> {
        self.objects
            .list_by_type(tenant, type_code, None, page)
            .await
            .map_err(map_object_error)
    }

    /// Page through live objects of one type in one status. ARCHIVED rows
    /// are visible here when asked for explicitly.
    pub async fn list_by_status(
        &self,
        tenant: TenantId,
        type_code: &str,
        status: ObjectStatus,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, Error> {
        self.objects
            .list_by_type(tenant, type_code, Some(status), page)
            .await
            .map_err(map_object_error)
    }

    /// Page through live objects whose name contains `term`.
    pub async fn search_by_name(
        &self,
        tenant: TenantId,
        type_code: &str,
        term: &str,
        page: PageRequest,
    ) -> Result<Page<StoredObject>, Error> {
        self.objects
            .search_by_name(tenant, type_code, term, page)
            .await
            .map_err(map_object_error)
    }

    /// Live objects whose data contains `{key: value}` at the top level.
    pub async fn find_by_attribute(
        &self,
        tenant: TenantId,
        type_code: &str,
        key: &str,
        value: AttributeValue,
    ) -> Result<Vec<StoredObject>, Error> {
        if key.trim().is_empty() {
            return Err(Error::invalid_argument("attribute key must not be blank"));
        }
        self.objects
            .find_by_attribute(tenant, type_code, key, value)
            .await
            .map_err(map_object_error)
    }

    /// Fetch many objects at once. An empty id list returns an empty list
    /// without touching the store.
    pub async fn bulk_get(
        &self,
        tenant: TenantId,
        ids: &[Uuid],
    ) -> Result<Vec<StoredObject>, Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.objects
            .find_many(tenant, ids)
            .await
            .map_err(map_object_error)
    }

    /// Count live objects of one type.
    pub async fn count_by_type(&self, tenant: TenantId, type_code: &str) -> Result<u64, Error> {
        self.objects
            .count_by_type(tenant, type_code)
            .await
            .map_err(map_object_error)
    }

    /// Page through an object's version history, newest first.
    pub async fn history(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<VersionRecord>, Error> {
        self.versions
            .history(tenant, object_id, page)
            .await
            .map_err(map_version_error)
    }

    /// Fetch one specific version; absent version numbers are `NotFound`.
    pub async fn version(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        version_number: i32,
    ) -> Result<VersionRecord, Error> {
        self.versions
            .find_version(tenant, object_id, version_number)
            .await
            .map_err(map_version_error)?
            .ok_or_else(|| {
                Error::not_found(format!(
                    "version {version_number} not found for object {object_id}"
                ))
            })
    }

    /// Time-travel: the version in force at `at` (largest `created_at ≤ at`).
    pub async fn version_at(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<VersionRecord, Error> {
        self.versions
            .find_version_at(tenant, object_id, at)
            .await
            .map_err(map_version_error)?
            .ok_or_else(|| {
                Error::not_found(format!("object {object_id} has no version at or before {at}"))
            })
    }

    /// Page through the durable event journal for an object, newest first.
    pub async fn events_for(
        &self,
        tenant: TenantId,
        object_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<super::event::EventJournalRecord>, Error> {
        self.versions
            .events_for(tenant, object_id, page)
            .await
            .map_err(map_version_error)
    }

    /// Active edges leaving an object.
    pub async fn links_from(
        &self,
        tenant: TenantId,
        object_id: Uuid,
    ) -> Result<Vec<ObjectRelationship>, Error> {
        self.require_visible(tenant, object_id).await?;
        self.relationships
            .edges_from(object_id)
            .await
            .map_err(map_relationship_error)
    }

    /// Active edges arriving at an object (symmetric navigation for
    /// bidirectional edges).
    pub async fn links_to(
        &self,
        tenant: TenantId,
        object_id: Uuid,
    ) -> Result<Vec<ObjectRelationship>, Error> {
        self.require_visible(tenant, object_id).await?;
        self.relationships
            .edges_to(object_id)
            .await
            .map_err(map_relationship_error)
    }

    async fn require_visible(&self, tenant: TenantId, object_id: Uuid) -> Result<(), Error> {
        self.get(tenant, object_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| Error::not_found(format!("object not found: {object_id}")))
    }
}

fn map_object_error(error: ObjectRepositoryError) -> Error {
    match error {
        ObjectRepositoryError::Connection { message } => {
            Error::unavailable(format!("object store unavailable: {message}"))
        }
        other => Error::integrity(format!("object store error: {other}")),
    }
}

fn map_version_error(error: VersionRepositoryError) -> Error {
    match error {
        VersionRepositoryError::Connection { message } => {
            Error::unavailable(format!("version store unavailable: {message}"))
        }
        VersionRepositoryError::Query { message } => {
            Error::integrity(format!("version store error: {message}"))
        }
    }
}

fn map_relationship_error(error: RelationshipRepositoryError) -> Error {
    match error {
        RelationshipRepositoryError::Connection { message } => {
            Error::unavailable(format!("relationship store unavailable: {message}"))
        }
        other => Error::integrity(format!("relationship store error: {other}")),
    }
}
