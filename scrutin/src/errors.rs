#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The error taxonomy surfaced at the engine boundaries.
//!
//! Every variant carries a stable code so transports can map rejections
//! deterministically. The two submit-time proof faults intentionally share
//! one display message: responses must not reveal whether the validity or
//! the eligibility check rejected a ballot.

use crate::{
    election::ElectionStatus,
    identity::IdentityError,
    ledger::LedgerError,
    store::StoreError,
};

/// The main [`std::error::Error`] type returned by engine operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    //--- Input faults: rejected, no state change.
    #[error("proof payload is malformed")]
    MalformedProof,

    #[error("ciphertext payload is malformed")]
    MalformedCiphertext,

    #[error("unknown election")]
    UnknownElection,

    #[error("operation not permitted in election status `{status}`")]
    InvalidStatus { status: ElectionStatus },

    //--- Authorization faults.
    #[error("request is not authenticated")]
    NotAuthenticated,

    #[error("the authenticated principal lacks the required role")]
    InsufficientRole,

    #[error("the presented credential does not belong to a verified voter")]
    NotVerifiedVoter,

    //--- Gating faults.
    #[error("election is not open for voting")]
    ElectionNotActive,

    #[error("voting token has expired")]
    TokenExpired,

    #[error("voting token has already been used")]
    TokenAlreadyUsed,

    #[error("an unused voting token already exists for this voter")]
    TokenAlreadyIssued,

    #[error("a ballot with this nullifier was already recorded")]
    DuplicateNullifier,

    #[error("the ballot limit for this voter has been reached")]
    VoteLimitReached,

    //--- Proof faults. One message for both submit-time proofs.
    #[error("ballot proof rejected")]
    InvalidValidityProof,

    #[error("ballot proof rejected")]
    InvalidEligibilityProof,

    #[error("partial decryption proof rejected")]
    InvalidPartialDecryptionProof,

    //--- Quorum faults.
    #[error("only {available} valid trustee shares available, {required} required")]
    InsufficientTrustees { available: usize, required: usize },

    #[error("key share does not match its public commitment")]
    InvalidKeyShare,

    //--- Upstream faults, surfaced after bounded retries.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("identity provider unavailable: {0}")]
    IdentityProviderUnavailable(String),

    #[error("persistent store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("upstream call timed out")]
    UpstreamTimeout,

    //--- Invariant violations: fatal, reported as internal failures.
    #[error("aggregate plaintext exceeds the discrete-log recovery bound")]
    DlogOutOfRange,

    #[error("state machine invariant violated: {0}")]
    StateMachineInvariantViolated(String),
}

impl EngineError {
    /// Stable machine-readable code for the variant.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::MalformedProof => "MALFORMED_PROOF",
            EngineError::MalformedCiphertext => "MALFORMED_CIPHERTEXT",
            EngineError::UnknownElection => "UNKNOWN_ELECTION",
            EngineError::InvalidStatus { .. } => "INVALID_STATUS",
            EngineError::NotAuthenticated => "NOT_AUTHENTICATED",
            EngineError::InsufficientRole => "INSUFFICIENT_ROLE",
            EngineError::NotVerifiedVoter => "NOT_VERIFIED_VOTER",
            EngineError::ElectionNotActive => "ELECTION_NOT_ACTIVE",
            EngineError::TokenExpired => "TOKEN_EXPIRED",
            EngineError::TokenAlreadyUsed => "TOKEN_ALREADY_USED",
            EngineError::TokenAlreadyIssued => "TOKEN_ALREADY_ISSUED",
            EngineError::DuplicateNullifier => "DUPLICATE_NULLIFIER",
            EngineError::VoteLimitReached => "VOTE_LIMIT_REACHED",
            EngineError::InvalidValidityProof => "INVALID_VALIDITY_PROOF",
            EngineError::InvalidEligibilityProof => "INVALID_ELIGIBILITY_PROOF",
            EngineError::InvalidPartialDecryptionProof => "INVALID_PARTIAL_DECRYPTION_PROOF",
            EngineError::InsufficientTrustees { .. } => "INSUFFICIENT_TRUSTEES",
            EngineError::InvalidKeyShare => "INVALID_KEY_SHARE",
            EngineError::LedgerUnavailable(_) => "LEDGER_UNAVAILABLE",
            EngineError::IdentityProviderUnavailable(_) => "IDENTITY_PROVIDER_UNAVAILABLE",
            EngineError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            EngineError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            EngineError::DlogOutOfRange => "DLOG_OUT_OF_RANGE",
            EngineError::StateMachineInvariantViolated(_) => "STATE_MACHINE_INVARIANT_VIOLATED",
        }
    }

    /// True for the fatal internal-failure family.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            EngineError::DlogOutOfRange | EngineError::StateMachineInvariantViolated(_)
        )
    }
}

impl From<LedgerError> for EngineError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Timeout => EngineError::UpstreamTimeout,
            LedgerError::Unavailable(msg) => EngineError::LedgerUnavailable(msg),
            LedgerError::Rejected(msg) => EngineError::LedgerUnavailable(msg),
        }
    }
}

impl From<IdentityError> for EngineError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Timeout => EngineError::UpstreamTimeout,
            IdentityError::Unavailable(msg) => EngineError::IdentityProviderUnavailable(msg),
            IdentityError::Rejected(_) => EngineError::NotVerifiedVoter,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => EngineError::StoreUnavailable(msg),
            StoreError::DuplicateNullifier => EngineError::DuplicateNullifier,
            StoreError::TokenMissing => EngineError::NotAuthenticated,
            StoreError::TokenAlreadyUsed => EngineError::TokenAlreadyUsed,
            StoreError::ElectionMissing => EngineError::UnknownElection,
        }
    }
}

/// [`Result`](std::result::Result) type with an [`EngineError`].
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn proof_faults_share_one_message() {
        assert_eq!(
            EngineError::InvalidValidityProof.to_string(),
            EngineError::InvalidEligibilityProof.to_string()
        );
        assert_ne!(
            EngineError::InvalidValidityProof.code(),
            EngineError::InvalidEligibilityProof.code()
        );
    }
}
