//! Authenticated HTTP pipeline for the App Showcase API.
//!
//! Requests flow caller -> dispatcher (attaches credential) -> transport,
//! and responses flow back through an interception step in `ApiClient` that
//! detects an expired credential (HTTP 401) and routes the request into the
//! single-flight refresh coordinator before replaying it once.

pub mod client;
pub mod error;
pub mod request;

mod dispatch;
mod refresh;

pub use client::ApiClient;
pub use error::ApiError;
pub use refresh::SessionExpiredHook;
pub use request::{Part, RequestBody, RequestSpec};
