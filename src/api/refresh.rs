//! Single-flight credential refresh.
//!
//! Any number of requests can fail with an expired credential at nearly the
//! same instant; the coordinator collapses them into exactly one refresh
//! call. The first failure of an episode becomes the leader and issues the
//! call; every later failure enqueues a completion handle and waits for the
//! episode to settle. On success the new credential is written to the store
//! before the queue is drained, so every replay picks it up. On failure the
//! store is cleared, the session-expired hook fires once, and every waiter
//! is rejected with the same error.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::auth::{Credential, CredentialStore};
use crate::models::TokenResponse;

use super::ApiError;

/// Outcome shared with every waiter of an episode. The error is carried as a
/// message so one failure can fan out to all of them.
type EpisodeOutcome = Result<Credential, String>;

/// Error message for an episode whose leader was cancelled mid-refresh.
const REFRESH_ABANDONED: &str = "refresh abandoned";

/// Invoked when a refresh fails and the session cannot continue, e.g. to
/// navigate the embedding application to its login view. Fires at most once
/// per episode no matter how many callers were waiting.
pub type SessionExpiredHook = Box<dyn Fn() + Send + Sync>;

enum EpisodeState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<EpisodeOutcome>>,
    },
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<EpisodeOutcome>),
}

pub(crate) struct RefreshCoordinator {
    state: Mutex<EpisodeState>,
    store: Arc<CredentialStore>,
    http: reqwest::Client,
    refresh_url: String,
    refresh_timeout: Duration,
    on_session_expired: SessionExpiredHook,
}

impl RefreshCoordinator {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        refresh_timeout: Duration,
        store: Arc<CredentialStore>,
        on_session_expired: SessionExpiredHook,
    ) -> Self {
        Self {
            state: Mutex::new(EpisodeState::Idle),
            store,
            http,
            refresh_url: format!("{}/auth/refresh", base_url),
            refresh_timeout,
            on_session_expired,
        }
    }

    /// Handle one authentication failure. Returns once the episode settles,
    /// with the renewed credential on success or `ApiError::RefreshFailed`
    /// otherwise.
    pub async fn handle_auth_failure(&self) -> Result<Credential, ApiError> {
        match self.join_episode() {
            Role::Leader => self.run_episode().await,
            Role::Waiter(rx) => match rx.await {
                Ok(Ok(credential)) => Ok(credential),
                Ok(Err(message)) => Err(ApiError::RefreshFailed(message)),
                // Sender dropped without settling; treat as a failed refresh.
                Err(_) => Err(ApiError::RefreshFailed(REFRESH_ABANDONED.to_string())),
            },
        }
    }

    /// Synchronous state transition under the lock. This is what makes the
    /// at-most-one-refresh check race-free, on any runtime flavor.
    fn join_episode(&self) -> Role {
        let mut state = self.lock_state();
        match &mut *state {
            EpisodeState::Idle => {
                *state = EpisodeState::Refreshing {
                    waiters: Vec::new(),
                };
                Role::Leader
            }
            EpisodeState::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Role::Waiter(rx)
            }
        }
    }

    /// Leader path: issue the one refresh call of the episode, then settle
    /// the queue.
    async fn run_episode(&self) -> Result<Credential, ApiError> {
        info!("Credential expired, starting refresh");
        // The guard settles the episode if this future is dropped at the
        // await below (e.g. the caller raced it against a timeout), so queued
        // waiters are rejected instead of hanging on a wedged state.
        let mut guard = EpisodeGuard::new(self);
        let outcome = match tokio::time::timeout(self.refresh_timeout, self.call_refresh()).await
        {
            Ok(result) => result,
            Err(_) => Err(ApiError::RefreshFailed("refresh call timed out".to_string())),
        };
        guard.disarm();

        match outcome {
            Ok(credential) => {
                // Persist before draining so replays read the new credential.
                if let Err(e) = self.store.set(credential.clone()) {
                    warn!(error = %e, "Failed to persist refreshed credential");
                }
                let waiters = self.end_episode();
                debug!(waiters = waiters.len(), "Refresh succeeded, draining queue");
                for waiter in waiters {
                    let _ = waiter.send(Ok(credential.clone()));
                }
                Ok(credential)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Refresh failed, ending session");
                if let Err(e) = self.store.clear() {
                    warn!(error = %e, "Failed to clear credential store");
                }
                (self.on_session_expired)();
                let waiters = self.end_episode();
                debug!(waiters = waiters.len(), "Rejecting queued requests");
                for waiter in waiters {
                    let _ = waiter.send(Err(message.clone()));
                }
                Err(ApiError::RefreshFailed(message))
            }
        }
    }

    /// Return to `Idle` and take the queued waiters, in FIFO enqueue order.
    fn end_episode(&self) -> Vec<oneshot::Sender<EpisodeOutcome>> {
        let mut state = self.lock_state();
        match std::mem::replace(&mut *state, EpisodeState::Idle) {
            EpisodeState::Refreshing { waiters } => waiters,
            EpisodeState::Idle => Vec::new(),
        }
    }

    /// The one outbound refresh call of an episode, authenticated with the
    /// store's current (possibly stale) credential.
    async fn call_refresh(&self) -> Result<Credential, ApiError> {
        let mut builder = self.http.post(&self.refresh_url);
        if let Some(credential) = self.store.get() {
            builder = builder.bearer_auth(&credential.access_token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::RefreshFailed(format!("refresh request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::RefreshFailed(
                ApiError::from_status(status, &body).to_string(),
            ));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| ApiError::RefreshFailed(format!("invalid refresh response: {}", e)))?;

        Ok(Credential::new(tokens.access_token, tokens.token_type))
    }

    fn lock_state(&self) -> MutexGuard<'_, EpisodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Settles an episode whose leader never got to.
///
/// The leader disarms the guard once the refresh call has settled; if the
/// leading future is dropped before that, the guard returns the coordinator
/// to `Idle` and rejects every queued waiter, so no request hangs and the
/// next failure can start a fresh episode. The store and the session-expired
/// hook are left alone: the refresh outcome is unknown, not failed.
struct EpisodeGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    armed: bool,
}

impl<'a> EpisodeGuard<'a> {
    fn new(coordinator: &'a RefreshCoordinator) -> Self {
        Self {
            coordinator,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let waiters = self.coordinator.end_episode();
        warn!(waiters = waiters.len(), "Refresh abandoned before settling");
        for waiter in waiters {
            let _ = waiter.send(Err(REFRESH_ABANDONED.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_coordinator() -> RefreshCoordinator {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CredentialStore::open(dir.path().to_path_buf()));
        RefreshCoordinator::new(
            reqwest::Client::new(),
            "http://localhost:8000/api",
            Duration::from_secs(1),
            store,
            Box::new(|| {}),
        )
    }

    #[test]
    fn test_first_failure_leads_later_failures_wait() {
        let coordinator = test_coordinator();
        assert!(matches!(coordinator.join_episode(), Role::Leader));
        assert!(matches!(coordinator.join_episode(), Role::Waiter(_)));
        assert!(matches!(coordinator.join_episode(), Role::Waiter(_)));
    }

    #[test]
    fn test_end_episode_drains_waiters_and_resets() {
        let coordinator = test_coordinator();
        assert!(matches!(coordinator.join_episode(), Role::Leader));
        let _w1 = coordinator.join_episode();
        let _w2 = coordinator.join_episode();

        let waiters = coordinator.end_episode();
        assert_eq!(waiters.len(), 2);

        // A failure after settlement starts a fresh episode.
        assert!(matches!(coordinator.join_episode(), Role::Leader));
    }

    #[tokio::test]
    async fn test_dropped_leader_settles_episode() {
        let coordinator = test_coordinator();
        assert!(matches!(coordinator.join_episode(), Role::Leader));
        let waiter = match coordinator.join_episode() {
            Role::Waiter(rx) => rx,
            Role::Leader => panic!("expected a waiter"),
        };

        // An armed guard dropping stands in for the leader being cancelled
        // at its refresh await.
        drop(EpisodeGuard::new(&coordinator));

        match waiter.await {
            Ok(Err(message)) => assert_eq!(message, REFRESH_ABANDONED),
            other => panic!("unexpected outcome: {other:?}"),
        }
        // The coordinator is idle again, not wedged.
        assert!(matches!(coordinator.join_episode(), Role::Leader));
    }

    #[test]
    fn test_refresh_url_is_derived_from_base() {
        let coordinator = test_coordinator();
        assert_eq!(
            coordinator.refresh_url,
            "http://localhost:8000/api/auth/refresh"
        );
    }
}
