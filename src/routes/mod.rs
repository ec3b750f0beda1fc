//! JSON API handlers, grouped by caller.
//!
//! Each submodule exposes a `router()` that [`api_router`] mounts under its
//! prefix. Authorization is expressed through the extractor a handler takes
//! (see [`crate::auth`]), so a router never needs middleware of its own.

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Router,
};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ApiError;
use crate::server::AppState;
use crate::uploads::PendingUpload;

pub mod admin;
pub mod assistant;
pub mod auth;
pub mod content;
pub mod student;
pub mod teacher;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .merge(content::router())
        .merge(assistant::router())
        .nest("/student", student::router())
        .nest("/teacher", teacher::router())
        .nest("/admin", admin::router())
}

// ============ Response envelopes ============

/// `{ "data": ... }`
#[derive(Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// `{ "message": ..., "data": ... }`; `data` is omitted when absent.
#[derive(Serialize)]
pub struct Message<T = ()> {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl Message {
    pub fn text(message: &'static str) -> Self {
        Self {
            message,
            data: None,
        }
    }
}

impl<T> Message<T> {
    pub fn with(message: &'static str, data: T) -> Self {
        Self {
            message,
            data: Some(data),
        }
    }
}

// ============ Request bodies ============

/// A request body as raw fields, from JSON or `multipart/form-data`.
///
/// Multipart text parts become string fields. A part named `tags[]`, or a
/// repeated name, becomes an array. The part named `file` becomes the upload.
/// An empty body is an empty object.
#[derive(Debug, Default)]
pub struct Fields {
    pub fields: Map<String, Value>,
    pub upload: Option<PendingUpload>,
}

impl Fields {
    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    fn push(&mut self, name: &str, value: String) {
        let (key, always_array) = match name.strip_suffix("[]") {
            Some(key) => (key, true),
            None => (name, false),
        };
        match self.fields.get_mut(key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None if always_array => {
                self.fields
                    .insert(key.to_string(), Value::Array(vec![Value::String(value)]));
            }
            None => {
                self.fields.insert(key.to_string(), Value::String(value));
            }
        }
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut out = Fields::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.body_text()))?;
                // Browsers send an empty part when no file was picked.
                if name == "file" && !(file_name.is_empty() && bytes.is_empty()) {
                    out.upload = Some(PendingUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            out.push(&name, text);
        }
        Ok(out)
    }
}

impl FromRequest<AppState> for Fields {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, ApiError> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return Fields::from_multipart(multipart).await;
        }

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Fields::default());
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::bad_request(format!("Malformed JSON body: {}", e)))?;
        Ok(Fields {
            fields: match value {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            upload: None,
        })
    }
}
