//! Redis-backed look-aside cache adapter.
//!
//! Implements the `ObjectCache` port over `bb8-redis`:
//!
//! - `obj:{id}` → serialized object, TTL 1 hour by default;
//! - `code:{tenant}:{type}:{code}` → object id string, same TTL;
//! - `tag:{tenant}:{type}` → set of both keys, driving
//!   `invalidate_by_type` without a key scan.
//!
//! TTLs get a small deterministic jitter per object so a burst of writes
//! does not expire as one thundering herd. All failures surface as port
//! errors for callers to log and swallow; the store remains the source of
//! truth.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::{bb8, RedisConnectionManager};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::domain::context::TenantId;
use crate::domain::object::StoredObject;
use crate::domain::ports::{ObjectCache, ObjectCacheError};

/// Cache adapter configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    redis_url: String,
    ttl: Duration,
    max_connections: u32,
}

impl CacheConfig {
    /// Create a configuration with the given Redis URL.
    ///
    /// Defaults: 1 hour TTL, 10 pooled connections.
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            ttl: Duration::from_secs(60 * 60),
            max_connections: 10,
        }
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the connection pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Redis-backed implementation of the `ObjectCache` port.
#[derive(Clone)]
pub struct RedisObjectCache {
    pool: bb8::Pool<RedisConnectionManager>,
    ttl: Duration,
}

impl RedisObjectCache {
    /// Connect the cache pool.
    pub async fn new(config: CacheConfig) -> Result<Self, ObjectCacheError> {
        let manager = RedisConnectionManager::new(config.redis_url.as_str())
            .map_err(|err| ObjectCacheError::backend(err.to_string()))?;
        let pool = bb8::Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .await
            .map_err(|err| ObjectCacheError::backend(err.to_string()))?;
        Ok(Self {
            pool,
            ttl: config.ttl,
        })
    }

    async fn conn(
        &self,
    ) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, ObjectCacheError> {
        self.pool
            .get()
            .await
            .map_err(|err| ObjectCacheError::backend(err.to_string()))
    }

    /// Entry TTL in seconds with a per-object deterministic jitter of up to
    /// 5% so simultaneous writes do not expire together.
    fn jittered_ttl_secs(&self, id: Uuid) -> u64 {
        let base = self.ttl.as_secs().max(1);
        let jitter_range = (base / 20).max(1);
        base + (id.as_u128() % u128::from(jitter_range)) as u64
    }
}

fn object_key(id: Uuid) -> String {
    format!("obj:{id}")
}

fn code_key(tenant: TenantId, type_code: &str, code: &str) -> String {
    format!("code:{tenant}:{type_code}:{code}")
}

fn tag_key(tenant: TenantId, type_code: &str) -> String {
    format!("tag:{tenant}:{type_code}")
}

fn map_redis(err: redis::RedisError) -> ObjectCacheError {
    ObjectCacheError::backend(err.to_string())
}

#[async_trait]
impl ObjectCache for RedisObjectCache {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<StoredObject>, ObjectCacheError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(object_key(id)).await.map_err(map_redis)?;
        raw.map(|value| {
            serde_json::from_str(&value)
                .map_err(|err| ObjectCacheError::serialization(err.to_string()))
        })
        .transpose()
    }

    async fn get_id_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<Option<Uuid>, ObjectCacheError> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn
            .get(code_key(tenant, type_code, code))
            .await
            .map_err(map_redis)?;
        raw.map(|value| {
            Uuid::parse_str(&value)
                .map_err(|err| ObjectCacheError::serialization(err.to_string()))
        })
        .transpose()
    }

    async fn put(&self, object: &StoredObject) -> Result<(), ObjectCacheError> {
        let serialized = serde_json::to_string(object)
            .map_err(|err| ObjectCacheError::serialization(err.to_string()))?;
        let ttl = self.jittered_ttl_secs(object.id);
        let obj_key = object_key(object.id);
        let code_key = code_key(object.tenant_id, &object.type_code, &object.code);
        let tag_key = tag_key(object.tenant_id, &object.type_code);

        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(&obj_key, serialized, ttl)
            .await
            .map_err(map_redis)?;
        conn.set_ex::<_, _, ()>(&code_key, object.id.to_string(), ttl)
            .await
            .map_err(map_redis)?;
        // Tag membership drives invalidate_by_type; the tag itself expires
        // with its newest member so it cannot grow without bound.
        conn.sadd::<_, _, ()>(&tag_key, vec![obj_key.as_str(), code_key.as_str()])
            .await
            .map_err(map_redis)?;
        conn.expire::<_, ()>(&tag_key, ttl as i64)
            .await
            .map_err(map_redis)?;
        Ok(())
    }

    async fn invalidate(&self, id: Uuid) -> Result<(), ObjectCacheError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(object_key(id)).await.map_err(map_redis)?;
        Ok(())
    }

    async fn invalidate_by_code(
        &self,
        tenant: TenantId,
        type_code: &str,
        code: &str,
    ) -> Result<(), ObjectCacheError> {
        let mut conn = self.conn().await?;
        let code_key = code_key(tenant, type_code, code);
        let id: Option<String> = conn.get(&code_key).await.map_err(map_redis)?;

        if let Some(id) = id {
            let id = Uuid::parse_str(&id)
                .map_err(|err| ObjectCacheError::serialization(err.to_string()))?;
            conn.del::<_, ()>(object_key(id)).await.map_err(map_redis)?;
        }
        conn.del::<_, ()>(&code_key).await.map_err(map_redis)?;
        Ok(())
    }

    async fn invalidate_by_type(
        &self,
        tenant: TenantId,
        type_code: &str,
    ) -> Result<(), ObjectCacheError> {
        let mut conn = self.conn().await?;
        let tag_key = tag_key(tenant, type_code);
        let members: Vec<String> = conn.smembers(&tag_key).await.map_err(map_redis)?;

        for chunk in members.chunks(512) {
            conn.del::<_, ()>(chunk).await.map_err(map_redis)?;
        }
        conn.del::<_, ()>(&tag_key).await.map_err(map_redis)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn keys_follow_the_published_scheme() {
        let id = Uuid::parse_str("7b1c7a70-0000-4000-8000-000000000000").expect("uuid");
        let tenant = TenantId::from_uuid(
            Uuid::parse_str("11111111-2222-4333-8444-555555555555").expect("uuid"),
        );

        assert_eq!(
            object_key(id),
            "obj:7b1c7a70-0000-4000-8000-000000000000"
        );
        assert_eq!(
            code_key(tenant, "CAND", "C-1"),
            "code:11111111-2222-4333-8444-555555555555:CAND:C-1"
        );
        assert_eq!(
            tag_key(tenant, "CAND"),
            "tag:11111111-2222-4333-8444-555555555555:CAND"
        );
    }

    #[rstest]
    fn ttl_jitter_is_bounded_and_deterministic() {
        let config = CacheConfig::new("redis://localhost").with_ttl(Duration::from_secs(3600));
        // Exercise the jitter math without a live pool.
        let base = config.ttl.as_secs();
        let jitter_range = (base / 20).max(1);
        let id = Uuid::new_v4();
        let jitter = (id.as_u128() % u128::from(jitter_range)) as u64;

        assert!(jitter < base / 20 + 1);
        assert_eq!(jitter, (id.as_u128() % u128::from(jitter_range)) as u64);
    }

    #[rstest]
    fn config_defaults_to_an_hour() {
        let config = CacheConfig::new("redis://localhost");
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.max_connections, 10);
    }
}
