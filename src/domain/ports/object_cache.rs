//! Port for the look-aside object cache.
//!
//! The cache is advisory: a miss is never an error, and callers treat any
//! cache failure as a miss, falling through to the store. Only mutators
//! write, and only after their transaction has committed.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::object::StoredObject;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by cache adapters. Callers log these at warn and
    /// proceed; they never reach API callers.
    pub enum ObjectCacheError {
        /// Cache backend is unavailable or timing out.
        Backend { message: String } => "object cache backend failure: {message}",
        /// Serialisation or deserialisation of a cached object failed.
        Serialization { message: String } => "object cache serialisation failed: {message}",
    }
}

/// Port for the two-key look-aside cache (`obj:{id}` and
/// `code:{tenant}:{type}:{code}` → id).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Read a cached object by id.
    async fn get_by_id(&self, id: Uuid) -> Result<Option<StoredObject>, ObjectCacheError>;

    /// Resolve a code key to the object id it names.
    async fn get_id_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<Option<Uuid>, ObjectCacheError>;

    /// Write both keys for an object.
    async fn put(&self, object: &StoredObject) -> Result<(), ObjectCacheError>;

    /// Drop the `obj:` key for an id.
    async fn invalidate(&self, id: Uuid) -> Result<(), ObjectCacheError>;

    /// Resolve the code key and drop both keys.
    async fn invalidate_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<(), ObjectCacheError>;

    /// Best-effort bulk invalidation of every cached object of a type
    /// (driven by a tag index, not a key scan).
    async fn invalidate_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
    ) -> Result<(), ObjectCacheError>;
}

/// Fixture cache that never hits and accepts every write.
///
/// Use it in tests where cache behaviour is not under test; the reader and
/// mutator treat it as a permanently cold cache.
#[derive(Debug, Clone, Default)]
pub struct FixtureObjectCache;

#[async_trait]
impl ObjectCache for FixtureObjectCache {
    async fn get_by_id(&self, _id: Uuid) -> Result<Option<StoredObject>, ObjectCacheError> {
        Ok(None)
    }

    async fn get_id_by_code(
        &self,
        _tenant: TenantId,
        _type_code: &str,
        _code: &str,
    ) -> Result<Option<Uuid>, ObjectCacheError> {
        Ok(None)
    }

    async fn put(&self, _object: &StoredObject) -> Result<(), ObjectCacheError> {
        Ok(())
    }

    async fn invalidate(&self, _id: Uuid) -> Result<(), ObjectCacheError> {
        Ok(())
    }

    async fn invalidate_by_code(
        &self,
        _tenant: TenantId,
        _type_code: &str,
        _code: &str,
    ) -> Result<(), ObjectCacheError> {
        Ok(())
    }

    async fn invalidate_by_type(
        &self,
        _tenant: TenantId,
        _type_code: &str,
    ) -> Result<(), ObjectCacheError> {
        Ok(())
    }
}
