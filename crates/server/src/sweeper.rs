//! Periodic removal of expired challenges, tokens and lockout counters.

use crate::oauth2::AuthService;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Run one sweep, logging instead of failing.
pub async fn sweep_once(service: &AuthService) {
    match service.purge_expired(OffsetDateTime::now_utc()).await {
        Ok(report) if report.total() > 0 => {
            tracing::debug!(
                challenges = report.challenges,
                tokens = report.tokens,
                lockout_counters = report.lockout_counters,
                "purged expired auth records"
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
    }
}

pub fn spawn_sweeper(service: AuthService, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            sweep_once(&service).await;
        }
    })
}
