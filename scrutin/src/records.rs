#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Row types persisted around a submission: tokens, receipts, audit events
//! and participation counters, plus the voter-facing handles.
//!
//! Only hashes of secrets are ever stored. A token row holds `H(raw_token)`;
//! a receipt holds the ciphertext hash, never the ciphertext; nothing in this
//! module links a voter identity to a ballot.

use serde::{Deserialize, Serialize};

use util::csprng::Csprng;

use crate::{
    clock::Timestamp,
    election::ElectionId,
    eligibility::Nullifier,
    hash::{HValue, h, put_str},
};

/// Voting-token time to live.
pub const TOKEN_TTL_SECS: u64 = 30 * 60;

/// Opaque reference to an authenticated voter, derived from the identity
/// provider's subject. Used only to rate-limit token issuance and count
/// participation; deliberately distinct from the identity behind the
/// nullifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoterAuthRef(HValue);

impl VoterAuthRef {
    pub fn derive(subject: &str, election_id: &ElectionId) -> Self {
        let mut v = Vec::with_capacity(subject.len() + election_id.as_str().len() + 16);
        put_str(&mut v, subject);
        put_str(&mut v, election_id.as_str());
        VoterAuthRef(h(&v))
    }

    pub fn as_hvalue(&self) -> &HValue {
        &self.0
    }
}

/// A raw voting token: 256 bits of randomness, hex on the wire. Returned to
/// the voter exactly once and never stored.
#[derive(Clone, PartialEq, Eq)]
pub struct RawToken(String);

impl RawToken {
    pub fn generate(csprng: &mut Csprng) -> Self {
        let mut bytes = [0u8; 32];
        csprng.fill_bytes(&mut bytes);
        RawToken(faster_hex::hex_string(&bytes))
    }

    pub fn from_wire(s: impl Into<String>) -> Self {
        RawToken(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `H(raw_token)`, the only form the store ever sees.
    pub fn hash(&self) -> HValue {
        h(self.0.as_bytes())
    }
}

impl std::fmt::Debug for RawToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RawToken(..)")
    }
}

/// Stored token row. Lifecycle: issued, then either used or expired.
/// `used_at` is written once and never cleared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingToken {
    pub token_hash: HValue,
    pub election_id: ElectionId,
    pub voter_ref: VoterAuthRef,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub used_at: Option<Timestamp>,
}

impl VotingToken {
    pub fn issue(
        raw: &RawToken,
        election_id: ElectionId,
        voter_ref: VoterAuthRef,
        now: Timestamp,
    ) -> Self {
        VotingToken {
            token_hash: raw.hash(),
            election_id,
            voter_ref,
            issued_at: now,
            expires_at: now.plus_secs(TOKEN_TTL_SECS),
            used_at: None,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// An in-force token is unused and unexpired.
    pub fn is_in_force(&self, now: Timestamp) -> bool {
        self.used_at.is_none() && !self.is_expired(now)
    }
}

/// Voter-facing verification code: 16 uppercase hex characters of 8 random
/// bytes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationCode(String);

impl VerificationCode {
    pub fn generate(csprng: &mut Csprng) -> Self {
        let mut bytes = [0u8; 8];
        csprng.fill_bytes(&mut bytes);
        VerificationCode(faster_hex::hex_string_upper(&bytes))
    }

    pub fn from_wire(s: impl Into<String>) -> Self {
        VerificationCode(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for VerificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VerificationCode({})", self.0)
    }
}

/// The receipt handed to a voter at submit time. Contains nothing secret and
/// nothing identifying.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteReceipt {
    pub verification_code: VerificationCode,
    pub election_id: ElectionId,
    pub ciphertext_hash: HValue,
    pub nullifier: Nullifier,
    pub voting_period: u64,
    pub ledger_tx_id: HValue,
    pub block_number: u64,
    pub validity_proof_hash: HValue,
    pub eligibility_proof_hash: HValue,
    pub cast_at: Timestamp,
    pub confirmed_at: Option<Timestamp>,
}

/// Anonymized audit actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    TokenIssued,
    VoteSubmitted,
    StatusChanged,
    TallyStarted,
    TallyCompleted,
}

/// One append-only audit row. Carries an action hash rather than the acted-on
/// data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub election_id: ElectionId,
    pub action: AuditAction,
    pub action_hash: HValue,
    pub at: Timestamp,
}

/// Participation counter per opaque voter reference and period. Counts
/// ballots only; candidate choices stay encrypted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterParticipation {
    pub election_id: ElectionId,
    pub voter_ref: VoterAuthRef,
    pub period: u64,
    pub ballots_cast: u32,
    pub last_ballot_at: Timestamp,
}
