//! Domain validation errors for core deployment types.
//!
//! These errors are returned by `parse`/`normalize` constructors and by
//! document mutations that would break a domain invariant.
//!
//! # Examples
//!
//! ```
//! use uc_deploy::domain::error::DomainError;
//! use uc_deploy::domain::id::DeploymentName;
//!
//! let result = DeploymentName::parse("Feature/X");
//! assert!(matches!(result, Err(DomainError::InvalidName { .. })));
//! ```

use thiserror::Error;

/// Errors that occur when domain invariants are violated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Deployment names must be RFC-1123 labels.
    #[error("invalid deployment name '{name}': {reason}")]
    InvalidName {
        /// The rejected input.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Image tags must be valid OCI tags.
    #[error("invalid image tag '{tag}': {reason}")]
    InvalidTag {
        /// The rejected input.
        tag: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A record with this name is already registered.
    #[error("deployment '{name}' is already registered")]
    DuplicateDeployment {
        /// The conflicting name.
        name: String,
    },

    /// A stored document could not be decoded.
    #[error("malformed {document} document: {reason}")]
    MalformedDocument {
        /// Which document failed to parse.
        document: &'static str,
        /// Parser message.
        reason: String,
    },
}
