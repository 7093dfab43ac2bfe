#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Identity-provider collaborator contract.
//!
//! The engine hands a verifiable presentation, a challenge and a domain to
//! the provider and consumes only the returned verdict and opaque claims.
//! Credential formats and FIDO flows live entirely on the other side of this
//! trait.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse roles attached to authenticated principals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Trustee,
    Voter,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("identity provider call timed out")]
    Timeout,

    #[error("presentation rejected: {0}")]
    Rejected(String),
}

impl IdentityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, IdentityError::Unavailable(_) | IdentityError::Timeout)
    }
}

impl crate::retry::Transient for IdentityError {
    fn is_transient(&self) -> bool {
        IdentityError::is_transient(self)
    }
}

/// Outcome of a presentation verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedPresentation {
    pub verified: bool,
    /// Stable subject identifier, present when `verified`.
    pub subject: Option<String>,
    /// Opaque claims passed through to the caller.
    pub claims: serde_json::Value,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verifies a presentation bound to `challenge` and `domain`.
    async fn verify_presentation(
        &self,
        presentation: &str,
        challenge: &str,
        domain: &str,
    ) -> Result<VerifiedPresentation, IdentityError>;
}

/// In-memory provider holding an enrolled-subject set. A presentation is the
/// subject string itself; anything not enrolled verifies negatively.
#[derive(Default)]
pub struct StaticIdentityProvider {
    subjects: HashSet<String>,
}

impl StaticIdentityProvider {
    pub fn new(subjects: impl IntoIterator<Item = String>) -> Self {
        StaticIdentityProvider {
            subjects: subjects.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn verify_presentation(
        &self,
        presentation: &str,
        _challenge: &str,
        _domain: &str,
    ) -> Result<VerifiedPresentation, IdentityError> {
        if self.subjects.contains(presentation) {
            Ok(VerifiedPresentation {
                verified: true,
                subject: Some(presentation.to_owned()),
                claims: serde_json::json!({ "sub": presentation }),
            })
        } else {
            Ok(VerifiedPresentation {
                verified: false,
                subject: None,
                claims: serde_json::Value::Null,
            })
        }
    }
}
