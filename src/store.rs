//! Typed adapter over the shared coordination store.
//!
//! The store (Redis) is the single source of truth for queue state. This
//! module wraps `redis::aio::ConnectionManager` with the small set of atomic
//! primitives the work queue is built from:
//!
//! - Set membership test/insert (insert reports whether the member was new)
//! - List push and blocking pop with a bounded timeout
//! - Hash field increment/read/set-if-absent
//! - Atomic multi-operation pipelines
//!
//! Every write goes through exactly one of these primitives, so a failure
//! mid-call leaves the store in a well-defined pre or post state, never a
//! partial hybrid. Multi-step decisions must be driven by a primitive's own
//! return value (e.g. set-insert returning "new"), never by a separate read.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the coordination store.
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    /// A store operation failed.
    #[error("Store operation failed: {0}")]
    OperationFailed(#[from] redis::RedisError),
}

/// Shared coordination store handle.
///
/// The underlying connection manager reconnects automatically, and cloning
/// is cheap, so a single store can be shared across tasks.
#[derive(Clone)]
pub struct CoordinationStore {
    redis: ConnectionManager,
}

impl CoordinationStore {
    /// Connects to the coordination store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::ConnectionFailed` if the URL is invalid or the
    /// initial connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { redis })
    }

    /// Creates a store handle from an existing connection manager.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Inserts a member into a set, returning whether it was new.
    ///
    /// This is the atomic test-and-set used as the dedup gate.
    pub async fn set_insert(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added == 1)
    }

    /// Inserts many members into a set in one pipelined batch.
    ///
    /// Returns one flag per member, in input order, indicating whether that
    /// member was new.
    pub async fn set_insert_many(
        &self,
        key: &str,
        members: &[String],
    ) -> Result<Vec<bool>, StoreError> {
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        for member in members {
            pipe.sadd(key, member);
        }
        let added: Vec<i64> = pipe.query_async(&mut conn).await?;
        Ok(added.into_iter().map(|n| n == 1).collect())
    }

    /// Tests membership in a set.
    pub async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let member_of: bool = conn.sismember(key, member).await?;
        Ok(member_of)
    }

    /// Returns the cardinality of a set.
    pub async fn set_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.redis.clone();
        let len: u64 = conn.scard(key).await?;
        Ok(len)
    }

    /// Returns all members of a set.
    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.redis.clone();
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    /// Pushes a value onto the head of a list.
    pub async fn list_push(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(key, value).await?;
        Ok(())
    }

    /// Pushes many values onto a list in one pipelined batch.
    pub async fn list_push_many(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        if values.is_empty() {
            return Ok(());
        }

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        for value in values {
            pipe.lpush(key, value);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Pops a value from the tail of a list, blocking up to `timeout`.
    ///
    /// BRPOP takes whole seconds, so the timeout is truncated to second
    /// granularity and raised to a minimum of one second.
    ///
    /// Returns `None` if the timeout expires with the list still empty, so
    /// callers can poll for shutdown instead of blocking forever.
    pub async fn list_pop_blocking(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        // BRPOP returns (key, value) or nil on timeout
        let result: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(result.map(|(_, value)| value))
    }

    /// Returns the length of a list.
    pub async fn list_len(&self, key: &str) -> Result<u64, StoreError> {
        let mut conn = self.redis.clone();
        let len: u64 = conn.llen(key).await?;
        Ok(len)
    }

    /// Atomically increments a hash field, returning the new value.
    pub async fn hash_incr(&self, key: &str, field: &str, by: i64) -> Result<i64, StoreError> {
        let mut conn = self.redis.clone();
        let value: i64 = conn.hincr(key, field, by).await?;
        Ok(value)
    }

    /// Reads a hash field.
    pub async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    /// Sets a hash field only if it is absent, returning whether it was set.
    pub async fn hash_set_if_absent(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.redis.clone();
        let set: bool = conn.hset_nx(key, field, value).await?;
        Ok(set)
    }

    /// Runs a caller-built pipeline as one atomic MULTI/EXEC transaction.
    ///
    /// Used for multi-key transitions (e.g. moving an id from `failed` back
    /// to the queue) that must not be observed half-applied.
    pub async fn exec_atomic<F>(&self, build: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut redis::Pipeline),
    {
        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        build(&mut pipe);
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Deletes keys in one pipelined batch.
    pub async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.redis.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key);
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for CoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("refused"));
        assert!(err.to_string().contains("connection failed"));
    }
}
