//! Domain identifier types with proper encapsulation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::DomainError;

/// Maximum length of an RFC-1123 label.
const MAX_NAME_LEN: usize = 63;

/// Maximum length of an OCI image tag.
const MAX_TAG_LEN: usize = 128;

/// Deployment name - unique key of a registry record.
///
/// Always a valid RFC-1123 label so it can be used directly as a Kubernetes
/// object name, label value and gRPC host name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeploymentName(String);

impl DeploymentName {
    /// Parse an already-normalized name, rejecting anything that is not a
    /// valid RFC-1123 label.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let name = raw.into();
        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.len() > MAX_NAME_LEN {
            Some("must be at most 63 characters")
        } else if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            Some("may only contain lowercase letters, digits and '-'")
        } else if name.starts_with('-') || name.ends_with('-') {
            Some("must start and end with a letter or digit")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(DomainError::InvalidName { name, reason }),
            None => Ok(Self(name)),
        }
    }

    /// Derive a name from free-form input such as a git branch.
    ///
    /// Lowercases, replaces every run of other characters with a single `-`,
    /// trims dashes and truncates to 63 characters.
    pub fn normalize(raw: &str) -> Result<Self, DomainError> {
        let mut name = String::with_capacity(raw.len());
        for c in raw.chars() {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                name.push(c);
            } else if !name.ends_with('-') {
                name.push('-');
            }
        }
        let mut name = name.trim_matches('-').to_string();
        name.truncate(MAX_NAME_LEN);
        let name = name.trim_end_matches('-').to_string();

        if name.is_empty() {
            return Err(DomainError::InvalidName {
                name: raw.to_string(),
                reason: "contains no usable characters",
            });
        }
        Self::parse(name)
    }

    /// Append a suffix, normalizing it first.
    ///
    /// The base is shortened to keep the whole name within 63 characters, so
    /// the suffix always survives and a suffixed name never equals its base.
    pub fn with_suffix(&self, suffix: &str) -> Result<Self, DomainError> {
        if suffix.is_empty() {
            return Ok(self.clone());
        }
        let suffix = Self::normalize(suffix)?;
        let room = MAX_NAME_LEN.saturating_sub(suffix.0.len() + 1);
        let base = self.0[..self.0.len().min(room)].trim_end_matches('-');
        if base.is_empty() {
            return Err(DomainError::InvalidName {
                name: format!("{}-{}", self.0, suffix.0),
                reason: "suffix leaves no room for the base name",
            });
        }
        Self::parse(format!("{base}-{}", suffix.0))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeploymentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DeploymentName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DeploymentName> for String {
    fn from(name: DeploymentName) -> Self {
        name.0
    }
}

/// Container image tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageTag(String);

impl ImageTag {
    /// Parse a tag, enforcing the OCI tag grammar.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let tag = raw.into();
        let valid_rest = tag
            .chars()
            .skip(1)
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        let reason = match tag.chars().next() {
            None => Some("must not be empty"),
            Some(first) if !(first.is_ascii_alphanumeric() || first == '_') => {
                Some("must start with a letter, digit or '_'")
            }
            Some(_) if tag.len() > MAX_TAG_LEN => Some("must be at most 128 characters"),
            Some(_) if !valid_rest => Some("may only contain letters, digits, '_', '.' and '-'"),
            Some(_) => None,
        };

        match reason {
            Some(reason) => Err(DomainError::InvalidTag { tag, reason }),
            None => Ok(Self(tag)),
        }
    }

    /// Generate a fresh tag of the form `<version>-<yyyymmddHHMMSS>`.
    pub fn generate(version: &str, now: DateTime<Utc>) -> Result<Self, DomainError> {
        Self::parse(format!("{version}-{}", now.format("%Y%m%d%H%M%S")))
    }

    /// Get the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ImageTag {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ImageTag> for String {
    fn from(tag: ImageTag) -> Self {
        tag.0
    }
}

/// Opaque token identifying the holder of the deployment lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderToken(String);

impl HolderToken {
    /// Generate a random token for this process.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing token value.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
