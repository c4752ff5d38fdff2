//! Client library for the App Showcase API.
//!
//! The centerpiece is the authenticated request pipeline: every outbound
//! request carries the stored bearer token, an expired token is detected by
//! its 401 response, and any number of concurrent failures collapse into a
//! single refresh call whose outcome is shared by every waiting request.
//! Each failed request is then replayed exactly once with the renewed token;
//! if the refresh itself fails, the session ends and every waiter receives
//! the same error.
//!
//! ```no_run
//! use std::sync::Arc;
//! use showcase_client::{ApiClient, ClientConfig, CredentialStore};
//!
//! # async fn run() -> Result<(), showcase_client::ApiError> {
//! let config = ClientConfig::load();
//! let store = Arc::new(CredentialStore::open(
//!     ClientConfig::credential_dir().expect("no data directory"),
//! ));
//! let client = ApiClient::new(&config, store)?;
//!
//! client.login("alice", "hunter2").await?;
//! let me = client.current_user().await?;
//! println!("logged in as {}", me.username);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, RequestSpec};
pub use auth::{Credential, CredentialStore};
pub use config::ClientConfig;
