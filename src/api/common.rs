//! Common API utilities and shared types
//!
//! This module contains shared utilities used across multiple API endpoints.

use axum::{extract::Multipart, Router};
use serde::Serialize;
use std::collections::HashMap;

use crate::api::middleware::{ApiError, AppState};
use crate::services::UploadedFile;

/// Largest request body accepted; the services apply the per-endpoint limits
pub const MAX_REQUEST_BODY_BYTES: usize = 25 * 1024 * 1024;

/// `{ "message": ... }`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Multipart form with at most one file
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    /// Read every part of `multipart`; the part named `file_field` becomes the file.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, ApiError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation_error(format!("Failed to read multipart: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == file_field && form.file.is_none() {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read file: {}", e)))?;
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("Failed to read field: {}", e)))?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim())
    }

    /// The uploaded file, or an empty one when no file part was sent
    pub fn take_file(&mut self) -> UploadedFile {
        self.file.take().unwrap_or_default()
    }
}

/// Mount `router` below `/api/{name}` and its lowercase alias
pub fn controller(name: &str, router: Router<AppState>) -> Router<AppState> {
    let lower = name.to_lowercase();
    let app = Router::new().nest(&format!("/api/{name}"), router.clone());
    if lower == name {
        return app;
    }
    app.nest(&format!("/api/{lower}"), router)
}
