//! Request descriptors for the dispatch pipeline.
//!
//! Descriptors are plain data and cloneable, so a request that failed with
//! an expired credential can be rebuilt and replayed after a refresh.

use reqwest::Method;
use serde::Serialize;

use super::ApiError;

#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<Part>),
}

/// One field of a multipart form. File parts carry their bytes so the form
/// can be rebuilt on replay.
#[derive(Debug, Clone)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn json<B: Serialize>(
        method: Method,
        path: impl Into<String>,
        body: &B,
    ) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        let mut spec = Self::new(method, path);
        spec.body = RequestBody::Json(value);
        Ok(spec)
    }

    pub fn multipart(method: Method, path: impl Into<String>, parts: Vec<Part>) -> Self {
        let mut spec = Self::new(method, path);
        spec.body = RequestBody::Multipart(parts);
        spec
    }

    /// Add an extra header to the request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A request plus its replay marker.
///
/// The marker lives on this wrapper rather than on the descriptor itself, so
/// retry state can never leak between independent calls that happen to share
/// a descriptor.
#[derive(Debug)]
pub(crate) struct Attempt {
    pub request: RequestSpec,
    pub retried: bool,
}

impl Attempt {
    pub fn new(request: RequestSpec) -> Self {
        Self {
            request,
            retried: false,
        }
    }
}
