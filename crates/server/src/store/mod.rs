//! Storage seams of the auth core.
//!
//! Everything the engine remembers between requests goes through one of the
//! traits below. Implementations must make the `consume_*` operations atomic:
//! when two callers race on the same record exactly one of them gets it.
//!
//! - [`memory`] keeps everything in DashMaps (single instance, tests)
//! - [`database`] persists challenges, tokens and users through sea-orm

use crate::error::StoreError;
use crate::oauth2::model::{AccessToken, PkceChallenge, RefreshToken, TokenPair, UserRecord};
use async_trait::async_trait;
use std::time::Duration;
use time::OffsetDateTime;

pub mod database;
pub mod memory;

pub use database::{DbChallengeStore, DbTokenStore, DbUserDirectory};
pub use memory::{MemoryChallengeStore, MemoryLockoutStore, MemoryTokenStore, MemoryUserDirectory};

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn insert(&self, challenge: PkceChallenge) -> StoreResult<()>;

    /// Read a challenge without consuming it.
    async fn get(&self, challenge_id: &str) -> StoreResult<Option<PkceChallenge>>;

    /// Atomically remove and return a challenge. `None` if it is gone already.
    async fn consume(&self, challenge_id: &str) -> StoreResult<Option<PkceChallenge>>;

    /// Drop challenges expired at `now`, returning how many were removed.
    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_pair(&self, pair: &TokenPair) -> StoreResult<()>;

    async fn find_access(&self, token: &str) -> StoreResult<Option<AccessToken>>;

    async fn find_refresh(&self, token: &str) -> StoreResult<Option<RefreshToken>>;

    /// Atomically mark an unrevoked refresh token as revoked and return it.
    ///
    /// Returns `None` when the token is unknown or was already revoked, so of
    /// two concurrent callers at most one sees `Some`.
    async fn consume_refresh(&self, token: &str) -> StoreResult<Option<RefreshToken>>;

    /// Returns whether the token existed.
    async fn revoke_access(&self, token: &str) -> StoreResult<bool>;

    /// Revoke every access and refresh token sharing a lineage.
    async fn revoke_lineage(&self, lineage_id: &str) -> StoreResult<u64>;

    /// Drop tokens that can no longer be used at `now`.
    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64>;
}

/// Fixed-window failure counters keyed by client.
#[async_trait]
pub trait LockoutStore: Send + Sync {
    /// Current failure count, `0` when no live window exists.
    async fn get(&self, key: &str) -> StoreResult<u32>;

    /// Increment the counter unless it has already reached `limit`, opening a
    /// window of `window` if none is live. Returns the new count, or `None`
    /// when the limit was reached. Check and increment are one atomic step.
    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> StoreResult<Option<u32>>;

    /// Give back one slot taken by `try_acquire`.
    async fn release(&self, key: &str) -> StoreResult<()>;

    /// Replace the remaining lifetime of the counter.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()>;

    /// Remaining lifetime of the counter, if any.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    async fn reset(&self, key: &str) -> StoreResult<()>;

    async fn purge_expired(&self) -> StoreResult<u64>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;
}
