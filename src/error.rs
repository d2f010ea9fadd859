// src/error.rs

//! Unified error handling for the devart tools.

use std::fmt;

use thiserror::Error;

/// Result type alias for devart operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Login rejected or session could not be established
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network failure, HTTP error status or a failed DiFi call
    #[error("Upstream unavailable ({context}): {message}")]
    UpstreamUnavailable { context: String, message: String },

    /// Upstream answered with a shape we do not understand
    #[error("Parse error ({context}): {message}")]
    Parse { context: String, message: String },

    /// The external notification command failed
    #[error("Notification delivery failed: {0}")]
    NotificationDelivery(String),

    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization of local state failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create an upstream error with context.
    pub fn upstream(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a parse error with context.
    pub fn parse(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a notification delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::NotificationDelivery(message.into())
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Errors that must stop a long-running monitor.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Authentication(_)
                | Self::Config(_)
                | Self::Validation(_)
                | Self::Toml(_)
                | Self::Selector { .. }
        )
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse { .. })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        let context = error
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "request".to_string());
        if error.is_decode() {
            Self::parse(context, error)
        } else {
            Self::upstream(context, error)
        }
    }
}
