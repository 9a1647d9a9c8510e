//! Per-client brute-force lockout.
//!
//! Every grant attempt takes a slot from the client's counter before it is
//! evaluated, so concurrent attempts cannot overshoot `max_failures`. Counted
//! failures keep their slot, other errors give it back and a success clears
//! the counter. Once `max_failures` slots are held the client is locked for
//! `cooldown` and every grant is refused with 429, whatever the credentials.

use crate::error::AuthError;
use crate::oauth2::types::ClientId;
use crate::settings::AuthPolicy;
use crate::store::{LockoutStore, StoreResult};
use std::sync::Arc;

#[derive(Clone)]
pub struct FailureGuard {
    store: Arc<dyn LockoutStore>,
}

impl FailureGuard {
    pub fn new(store: Arc<dyn LockoutStore>) -> Self {
        Self { store }
    }

    fn key(client_id: &ClientId) -> String {
        format!("grant:{client_id}")
    }

    /// Take a slot for one attempt, or refuse if the client is locked out.
    /// Every successful call must be followed by `settle`.
    pub async fn reserve(
        &self,
        client_id: &ClientId,
        policy: &AuthPolicy,
    ) -> Result<(), AuthError> {
        let key = Self::key(client_id);
        let acquired = self
            .store
            .try_acquire(&key, policy.max_failures, policy.failure_window)
            .await?;
        if acquired.is_some() {
            return Ok(());
        }
        let retry_after = self.store.ttl(&key).await?.unwrap_or(policy.cooldown);
        Err(AuthError::RateLimited { retry_after })
    }

    /// Resolve the slot taken by `reserve` from the outcome of the attempt.
    pub async fn settle<T>(
        &self,
        client_id: &ClientId,
        policy: &AuthPolicy,
        outcome: &Result<T, AuthError>,
    ) -> Result<(), AuthError> {
        let key = Self::key(client_id);
        match outcome {
            Ok(_) => self.store.reset(&key).await?,
            Err(e) if e.counts_as_failure() => {
                let failures = self.store.get(&key).await?;
                if failures >= policy.max_failures {
                    self.store.expire(&key, policy.cooldown).await?;
                    tracing::warn!(
                        %client_id,
                        failures,
                        cooldown_secs = policy.cooldown.as_secs(),
                        "client locked out after repeated failed grants"
                    );
                }
            }
            Err(_) => self.store.release(&key).await?,
        }
        Ok(())
    }

    pub async fn purge_expired(&self) -> StoreResult<u64> {
        self.store.purge_expired().await
    }
}
