//! DashMap-backed stores.
//!
//! Atomicity comes from DashMap's shard locks: `remove_if` and `get_mut`
//! hold the shard write lock for the whole check-and-mutate step.

use crate::config::{MAX_DURATION_SECS, UserConfig};
use crate::oauth2::model::{AccessToken, PkceChallenge, RefreshToken, TokenPair, UserRecord};
use crate::oauth2::types::ScopeSet;
use crate::store::{ChallengeStore, LockoutStore, StoreResult, TokenStore, UserDirectory};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;

#[derive(Clone, Default)]
pub struct MemoryChallengeStore {
    challenges: Arc<DashMap<String, PkceChallenge>>,
}

impl MemoryChallengeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn insert(&self, challenge: PkceChallenge) -> StoreResult<()> {
        self.challenges
            .insert(challenge.challenge_id.clone(), challenge);
        Ok(())
    }

    async fn get(&self, challenge_id: &str) -> StoreResult<Option<PkceChallenge>> {
        Ok(self.challenges.get(challenge_id).map(|c| c.clone()))
    }

    async fn consume(&self, challenge_id: &str) -> StoreResult<Option<PkceChallenge>> {
        Ok(self.challenges.remove(challenge_id).map(|(_, c)| c))
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let before = self.challenges.len();
        self.challenges.retain(|_, c| !c.is_expired_at(now));
        Ok(before.saturating_sub(self.challenges.len()) as u64)
    }
}

#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    access: Arc<DashMap<String, AccessToken>>,
    refresh: Arc<DashMap<String, RefreshToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of access tokens currently held, revoked ones included.
    pub fn access_len(&self) -> usize {
        self.access.len()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert_pair(&self, pair: &TokenPair) -> StoreResult<()> {
        self.access
            .insert(pair.access.token.clone(), pair.access.clone());
        self.refresh
            .insert(pair.refresh.token.clone(), pair.refresh.clone());
        Ok(())
    }

    async fn find_access(&self, token: &str) -> StoreResult<Option<AccessToken>> {
        Ok(self.access.get(token).map(|t| t.clone()))
    }

    async fn find_refresh(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        Ok(self.refresh.get(token).map(|t| t.clone()))
    }

    async fn consume_refresh(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let Some(mut entry) = self.refresh.get_mut(token) else {
            return Ok(None);
        };
        if entry.revoked {
            return Ok(None);
        }
        entry.revoked = true;
        Ok(Some(entry.clone()))
    }

    async fn revoke_access(&self, token: &str) -> StoreResult<bool> {
        match self.access.get_mut(token) {
            Some(mut entry) => {
                entry.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_lineage(&self, lineage_id: &str) -> StoreResult<u64> {
        let mut revoked = 0u64;
        for mut entry in self.access.iter_mut() {
            if entry.lineage_id == lineage_id && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        for mut entry in self.refresh.iter_mut() {
            if entry.lineage_id == lineage_id && !entry.revoked {
                entry.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: OffsetDateTime) -> StoreResult<u64> {
        let before = self.access.len() + self.refresh.len();
        self.access.retain(|_, t| !t.is_expired_at(now));
        // Revoked refresh tokens stay until expiry so reuse can be detected
        self.refresh.retain(|_, t| !t.is_expired_at(now));
        let after = self.access.len() + self.refresh.len();
        Ok(before.saturating_sub(after) as u64)
    }
}

/// `now + ttl`, falling back to the longest allowed duration when the clock
/// cannot represent the sum.
fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .or_else(|| now.checked_add(Duration::from_secs(MAX_DURATION_SECS)))
        .unwrap_or(now)
}

#[derive(Clone, Copy)]
struct Counter {
    count: u32,
    expires_at: Instant,
}

impl Counter {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Clone, Default)]
pub struct MemoryLockoutStore {
    counters: Arc<DashMap<String, Counter>>,
}

impl MemoryLockoutStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockoutStore for MemoryLockoutStore {
    async fn get(&self, key: &str) -> StoreResult<u32> {
        Ok(self
            .counters
            .get(key)
            .filter(|c| !c.is_expired())
            .map(|c| c.count)
            .unwrap_or(0))
    }

    async fn try_acquire(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
    ) -> StoreResult<Option<u32>> {
        let mut entry = self.counters.entry(key.to_string()).or_insert(Counter {
            count: 0,
            expires_at: deadline(window),
        });
        if entry.is_expired() {
            *entry = Counter {
                count: 0,
                expires_at: deadline(window),
            };
        }
        if entry.count >= limit {
            return Ok(None);
        }
        entry.count += 1;
        Ok(Some(entry.count))
    }

    async fn release(&self, key: &str) -> StoreResult<()> {
        if let Some(mut entry) = self.counters.get_mut(key) {
            entry.count = entry.count.saturating_sub(1);
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<()> {
        if let Some(mut entry) = self.counters.get_mut(key) {
            entry.expires_at = deadline(ttl);
        }
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        Ok(self
            .counters
            .get(key)
            .filter(|c| !c.is_expired())
            .map(|c| c.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn reset(&self, key: &str) -> StoreResult<()> {
        self.counters.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let before = self.counters.len();
        self.counters.retain(|_, c| !c.is_expired());
        Ok(before.saturating_sub(self.counters.len()) as u64)
    }
}

/// Users loaded from the `users` config section.
#[derive(Clone, Default)]
pub struct MemoryUserDirectory {
    users: Arc<DashMap<String, UserRecord>>,
}

impl MemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        let directory = Self::new();
        for user in users {
            directory.add(UserRecord {
                id: user.id.clone().unwrap_or_else(|| user.username.clone()),
                username: user.username.clone(),
                password_hash: user.password_hash.clone(),
                scopes: user.scopes.iter().copied().collect::<ScopeSet>(),
                disabled: user.disabled,
            });
        }
        directory
    }

    pub fn add(&self, user: UserRecord) {
        self.users.insert(user.username.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        Ok(self.users.get(username).map(|u| u.clone()))
    }
}
