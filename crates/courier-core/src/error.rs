// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the courier fleet scheduler.

use thiserror::Error;

/// The primary error type used across all courier crates.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, bad ranges).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, query failure, migration failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Driver errors (launch failure, broken wire, protocol violation).
    #[error("driver error: {message}")]
    Driver {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No healthy proxy could be assigned to the profile.
    #[error("proxy pool exhausted for profile {profile_id}")]
    ProxyExhausted { profile_id: String },

    /// No active message templates exist for the group.
    #[error("no active messages for group {group_id}")]
    NoMessages { group_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wrap any error as a storage error.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        CourierError::Storage {
            source: Box::new(source),
        }
    }

    /// Build a driver error from a message alone.
    pub fn driver(message: impl Into<String>) -> Self {
        CourierError::Driver {
            message: message.into(),
            source: None,
        }
    }
}
