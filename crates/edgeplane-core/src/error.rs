//! # Error Types
//!
//! Validation errors for edgeplane-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  edgeplane-core errors (this file)                                     │
//! │  └── ValidationError  - Malformed identity fields                      │
//! │                                                                         │
//! │  edgeplane-agent errors (separate crate)                               │
//! │  └── AgentError       - Config, credentials, control plane, runtime    │
//! │                                                                         │
//! │  Flow: ValidationError → AgentError → anyhow (daemon exit)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Input validation errors.
///
/// Raised when a value coming from config, disk or the control plane
/// cannot be used as part of a device identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    EmptyField { field: &'static str },

    /// The field contains whitespace or control characters.
    ///
    /// Identity values travel in HTTP headers and file contents, so they
    /// must be a single printable token.
    #[error("{field} contains whitespace or control characters")]
    InvalidCharacters { field: &'static str },

    /// The field is used as a directory name and is not a single path segment.
    #[error("{field} '{value}' is not a valid path segment")]
    InvalidPathSegment { field: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ValidationError::InvalidPathSegment {
            field: "project_id",
            value: "../etc".into(),
        };
        assert!(err.to_string().contains("project_id"));
        assert!(err.to_string().contains("../etc"));
    }
}
