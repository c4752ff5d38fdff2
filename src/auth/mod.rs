//! Credential storage for authenticated requests.
//!
//! The store owns the current bearer token and persists it across restarts.
//! It deliberately does no expiry tracking: an expired token is discovered
//! only when a request comes back 401 and enters the refresh pipeline.

pub mod credentials;

pub use credentials::{Credential, CredentialStore};
