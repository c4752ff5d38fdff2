//! The raw request transport.
//!
//! The dispatcher reads the current credential from the store, attaches it as
//! a bearer `Authorization` header, and sends the request. It is purely
//! mechanical: it never retries and never interprets status codes. Transport
//! failures surface as `ApiError::Network` and never enter the refresh
//! coordinator.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{multipart, Client, Response};
use tracing::debug;

use crate::auth::CredentialStore;

use super::request::{Part, RequestBody, RequestSpec};
use super::ApiError;

pub(crate) struct Dispatcher {
    http: Client,
    base_url: String,
    store: Arc<CredentialStore>,
}

impl Dispatcher {
    pub fn new(
        base_url: String,
        timeout_secs: u64,
        store: Arc<CredentialStore>,
    ) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url,
            store,
        })
    }

    /// Send a request with the current credential attached.
    pub async fn send(&self, spec: &RequestSpec) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, spec.path);
        let mut builder = self.http.request(spec.method.clone(), &url);

        if let Some(credential) = self.store.get() {
            builder = builder.bearer_auth(&credential.access_token);
        }
        for (name, value) in &spec.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &spec.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            // Content type (with boundary) is left to the transport here.
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        debug!(method = %spec.method, path = %spec.path, "Dispatching request");
        Ok(builder.send().await?)
    }

    /// The underlying client, shared so the refresh call reuses the
    /// connection pool.
    pub fn http(&self) -> &Client {
        &self.http
    }
}

fn build_form(parts: &[Part]) -> Result<multipart::Form, ApiError> {
    let mut form = multipart::Form::new();
    for part in parts {
        form = match part {
            Part::Text { name, value } => form.text(name.clone(), value.clone()),
            Part::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let file = multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(mime)
                    .map_err(|e| ApiError::InvalidRequest(format!("Bad MIME type: {}", e)))?;
                form.part(name.clone(), file)
            }
        };
    }
    Ok(form)
}
