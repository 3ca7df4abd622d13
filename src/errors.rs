// src/errors.rs
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Every rule a request failed, in the order the rules were checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl ValidationErrors {
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(FieldError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field == field)
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[derive(Error, Debug)]
pub enum SnapscribeError {
    #[error("Invalid request: {0}")]
    InvalidRequest(ValidationErrors),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Multipart error: {0}")]
    Multipart(String),

    #[error("LLM service error: {message}")]
    LLM { message: String, status: Option<u16> },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),
}

impl SnapscribeError {
    pub fn llm(message: impl Into<String>) -> Self {
        SnapscribeError::LLM {
            message: message.into(),
            status: None,
        }
    }

    pub fn llm_status(status: u16, message: impl Into<String>) -> Self {
        SnapscribeError::LLM {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Rate limits, upstream 5xx and transport failures are worth another
    /// attempt; everything else will fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            SnapscribeError::LLM {
                status: Some(code), ..
            } => *code == 429 || (500..=599).contains(code),
            SnapscribeError::LLM { status: None, .. } => true,
            _ => false,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            SnapscribeError::InvalidRequest(_) => "Validation error",
            SnapscribeError::ImageProcessing(_) => "Image processing error",
            SnapscribeError::Multipart(_) => "Upload error",
            SnapscribeError::LLM { .. } => "AI service error",
            SnapscribeError::Configuration(_) => "Configuration error",
            SnapscribeError::InvalidProvider(_) => "Invalid provider",
        }
    }
}

impl From<ValidationErrors> for SnapscribeError {
    fn from(errors: ValidationErrors) -> Self {
        SnapscribeError::InvalidRequest(errors)
    }
}

impl ResponseError for SnapscribeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SnapscribeError::InvalidRequest(_)
            | SnapscribeError::ImageProcessing(_)
            | SnapscribeError::Multipart(_)
            | SnapscribeError::InvalidProvider(_) => StatusCode::BAD_REQUEST,
            SnapscribeError::LLM { .. } => StatusCode::SERVICE_UNAVAILABLE,
            SnapscribeError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut body = serde_json::json!({
            "error": self.category(),
            "message": self.to_string()
        });
        if let SnapscribeError::InvalidRequest(errors) = self {
            body["details"] = serde_json::json!(errors);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}
