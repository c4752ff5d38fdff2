//! High-level API client with transparent credential refresh.
//!
//! Every request runs through [`ApiClient::execute`]: dispatch, inspect the
//! response, and on a 401 wait for the (single-flight) refresh before
//! replaying. A request is replayed at most once; a replay that still fails
//! is returned to the caller as-is rather than re-entering the coordinator,
//! which is what rules out retry loops.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::{Credential, CredentialStore};
use crate::config::ClientConfig;
use crate::models::{NewUser, TokenResponse, User};

use super::dispatch::Dispatcher;
use super::refresh::{RefreshCoordinator, SessionExpiredHook};
use super::request::{Attempt, Part, RequestSpec};
use super::ApiError;

pub struct ApiClient {
    dispatcher: Dispatcher,
    coordinator: RefreshCoordinator,
    store: Arc<CredentialStore>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, store: Arc<CredentialStore>) -> Result<Self, ApiError> {
        Self::with_session_expired_hook(
            config,
            store,
            Box::new(|| warn!("Session expired and no handler is installed")),
        )
    }

    /// Create a client with a hook that fires once per failed refresh
    /// episode, e.g. to navigate the embedding application to its login view.
    pub fn with_session_expired_hook(
        config: &ClientConfig,
        store: Arc<CredentialStore>,
        on_session_expired: SessionExpiredHook,
    ) -> Result<Self, ApiError> {
        let dispatcher = Dispatcher::new(
            config.base_url.clone(),
            config.request_timeout_secs,
            store.clone(),
        )?;
        let coordinator = RefreshCoordinator::new(
            dispatcher.http().clone(),
            &config.base_url,
            Duration::from_secs(config.refresh_timeout_secs),
            store.clone(),
            on_session_expired,
        );
        Ok(Self {
            dispatcher,
            coordinator,
            store,
        })
    }

    /// Send a request through the full pipeline and return the raw response.
    ///
    /// Network errors propagate unchanged; only a 401 on a not-yet-replayed
    /// request enters the refresh coordinator.
    pub async fn execute(&self, request: RequestSpec) -> Result<Response, ApiError> {
        let mut attempt = Attempt::new(request);
        loop {
            let response = self.dispatcher.send(&attempt.request).await?;

            if response.status() != StatusCode::UNAUTHORIZED || attempt.retried {
                return Ok(response);
            }

            attempt.retried = true;
            debug!(path = %attempt.request.path, "Request rejected with 401, awaiting refresh");
            self.coordinator.handle_auth_failure().await?;
            // Loop replays once; the marker makes the next 401 terminal.
        }
    }

    // ===== Generic JSON helpers =====

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.execute(RequestSpec::get(path)).await?;
        Self::read_json(response).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let spec = RequestSpec::json(Method::POST, path, body)?;
        let response = self.execute(spec).await?;
        Self::read_json(response).await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let spec = RequestSpec::json(Method::PUT, path, body)?;
        let response = self.execute(spec).await?;
        Self::read_json(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.execute(RequestSpec::new(Method::DELETE, path)).await?;
        Self::check_response(response).await?;
        Ok(())
    }

    /// Upload a multipart form, e.g. an app screenshot or avatar image.
    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<Part>,
    ) -> Result<T, ApiError> {
        let spec = RequestSpec::multipart(Method::POST, path, parts);
        let response = self.execute(spec).await?;
        Self::read_json(response).await
    }

    // ===== Auth flows =====

    /// Log in and store the returned credential.
    ///
    /// Goes around the refresh pipeline: a 401 here means bad credentials,
    /// not an expired session.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, ApiError> {
        let spec = RequestSpec::json(
            Method::POST,
            "/auth/login",
            &serde_json::json!({ "username": username, "password": password }),
        )?;
        let response = self.dispatcher.send(&spec).await?;
        let response = Self::check_response(response).await?;
        let tokens: TokenResponse = response.json().await?;

        let credential = Credential::new(tokens.access_token, tokens.token_type);
        self.remember(credential.clone());
        Ok(credential)
    }

    /// Register a new account. Does not log in; callers follow up with
    /// [`ApiClient::login`].
    pub async fn register(&self, new_user: &NewUser) -> Result<User, ApiError> {
        let spec = RequestSpec::json(Method::POST, "/auth/register", new_user)?;
        let response = self.dispatcher.send(&spec).await?;
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }

    /// The authenticated user's profile. Runs through the full pipeline, so
    /// an expired token is refreshed transparently.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        self.get_json("/auth/me").await
    }

    /// Store a token obtained out-of-band, e.g. from an OAuth callback URL.
    pub fn adopt_token(&self, access_token: impl Into<String>) {
        self.remember(Credential::bearer(access_token));
    }

    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store");
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    fn remember(&self, credential: Credential) {
        // Persistence failure leaves a usable in-memory credential; the next
        // restart just needs a fresh login.
        if let Err(e) = self.store.set(credential) {
            warn!(error = %e, "Failed to persist credential");
        }
    }

    /// Map non-success statuses to the error taxonomy.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let response = Self::check_response(response).await?;
        Ok(response.json().await?)
    }
}
