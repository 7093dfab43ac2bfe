#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The vote-submission engine: token issuance and the atomic submit
//! pipeline.
//!
//! `submit` runs under the per-election lock, so the nullifier-uniqueness
//! check, the ledger append and the store commit are serialized against
//! concurrent submissions for the same election. A ledger failure aborts the
//! pipeline before any state changes: the token survives and nothing is
//! persisted.

use std::sync::Arc;

use tracing::{debug, info};

use util::csprng::Csprng;

use crate::{
    ballot::EncryptedBallot,
    clock::{Clock, Timestamp},
    election::{Election, ElectionId, VotingMode},
    eligibility::{EligibilityProof, EligibilityVerifier, Nullifier},
    errors::{EngineError, EngineResult},
    hash::{HValue, h},
    identity::IdentityProvider,
    ledger::{Ledger, RecordedVote},
    lifecycle::ElectionLocks,
    parameters::GroupParameters,
    records::{
        AuditAction, AuditEvent, RawToken, VerificationCode, VoteReceipt, VoterAuthRef,
        VotingToken,
    },
    retry::with_retries,
    store::{Store, SubmissionCommit},
};

/// A freshly issued token. The raw token leaves the engine exactly once.
#[derive(Debug)]
pub struct IssuedToken {
    pub raw_token: RawToken,
    pub expires_at: Timestamp,
}

/// Everything a client submits for one ballot.
#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub election_id: ElectionId,
    pub token: RawToken,
    pub ballot: EncryptedBallot,
    pub nullifier: Nullifier,
    pub eligibility_proof: EligibilityProof,
}

/// The voter-facing result of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub verification_code: VerificationCode,
    pub tx_id: HValue,
    pub block_number: u64,
}

pub struct SubmissionEngine {
    params: Arc<GroupParameters>,
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    identity: Arc<dyn IdentityProvider>,
    eligibility: Arc<dyn EligibilityVerifier>,
    clock: Arc<dyn Clock>,
    locks: Arc<ElectionLocks>,
    csprng: std::sync::Mutex<Csprng>,
}

impl SubmissionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: Arc<GroupParameters>,
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        identity: Arc<dyn IdentityProvider>,
        eligibility: Arc<dyn EligibilityVerifier>,
        clock: Arc<dyn Clock>,
        locks: Arc<ElectionLocks>,
        csprng: Csprng,
    ) -> Self {
        SubmissionEngine {
            params,
            store,
            ledger,
            identity,
            eligibility,
            clock,
            locks,
            csprng: std::sync::Mutex::new(csprng),
        }
    }

    fn with_csprng<T>(&self, f: impl FnOnce(&mut Csprng) -> T) -> T {
        let mut csprng = self
            .csprng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut csprng)
    }

    async fn load_election(&self, id: &ElectionId) -> EngineResult<Election> {
        self.store
            .election(id)
            .await?
            .ok_or(EngineError::UnknownElection)
    }

    /// Verifies a presentation with the identity provider and derives the
    /// opaque per-election voter reference. This reference gates token
    /// issuance and participation counting; it is unrelated to the identity
    /// behind the nullifier.
    pub async fn authenticate_voter(
        &self,
        presentation: &str,
        challenge: &str,
        domain: &str,
        election_id: &ElectionId,
    ) -> EngineResult<VoterAuthRef> {
        let outcome = with_retries("identity verification", || {
            self.identity
                .verify_presentation(presentation, challenge, domain)
        })
        .await?;

        let subject = match (outcome.verified, outcome.subject) {
            (true, Some(subject)) => subject,
            _ => return Err(EngineError::NotVerifiedVoter),
        };

        Ok(VoterAuthRef::derive(&subject, election_id))
    }

    /// Issues a one-time voting token for an authenticated voter. At most one
    /// in-force token exists per voter reference and election.
    pub async fn issue_token(
        &self,
        voter_ref: &VoterAuthRef,
        election_id: &ElectionId,
    ) -> EngineResult<IssuedToken> {
        let election = self.load_election(election_id).await?;
        let now = self.clock.now();

        if !election.is_open_for_votes(now) {
            return Err(EngineError::ElectionNotActive);
        }
        if self
            .store
            .has_unused_token(election_id, voter_ref, now)
            .await?
        {
            return Err(EngineError::TokenAlreadyIssued);
        }

        let raw_token = self.with_csprng(RawToken::generate);
        let token = VotingToken::issue(&raw_token, election_id.clone(), *voter_ref, now);
        self.store.put_token(&token).await?;

        self.store
            .append_audit(&AuditEvent {
                election_id: election_id.clone(),
                action: AuditAction::TokenIssued,
                action_hash: h(token.token_hash.as_bytes()),
                at: now,
            })
            .await?;

        debug!(election = %election_id, "voting token issued");
        Ok(IssuedToken {
            raw_token,
            expires_at: token.expires_at,
        })
    }

    /// The atomic submit pipeline.
    pub async fn submit(&self, req: SubmitRequest) -> EngineResult<SubmitOutcome> {
        let _guard = self.locks.acquire(&req.election_id).await;

        let election = self.load_election(&req.election_id).await?;
        let now = self.clock.now();

        // 1. Token: present, bound to this election, unused, unexpired.
        let token = self
            .store
            .token_by_hash(&req.token.hash())
            .await?
            .ok_or(EngineError::NotAuthenticated)?;
        if token.election_id != req.election_id {
            return Err(EngineError::NotAuthenticated);
        }
        if token.used_at.is_some() {
            return Err(EngineError::TokenAlreadyUsed);
        }
        if token.is_expired(now) {
            return Err(EngineError::TokenExpired);
        }

        // 2. Election state.
        if !election.is_open_for_votes(now) {
            return Err(EngineError::ElectionNotActive);
        }
        let period = election.voting_period(now).unwrap_or(0);

        // 3. Nullifier uniqueness under the mode's bound, plus the per-voter
        //    ballot allowance.
        let max_nullifier_uses = self
            .check_ballot_allowance(&election, &token.voter_ref, &req.nullifier, period)
            .await?;

        // 4. Ballot shape and validity proofs.
        if !req.ballot.is_well_formed() || req.ballot.len() != election.candidates.len() {
            return Err(EngineError::MalformedCiphertext);
        }
        let public_key = election.public_key.as_ref().ok_or_else(|| {
            EngineError::StateMachineInvariantViolated(
                "active election without a public key".to_owned(),
            )
        })?;
        if !req.ballot.verify(&self.params, public_key) {
            return Err(EngineError::InvalidValidityProof);
        }

        // 5. Eligibility proof against the published root.
        let merkle_root = election.merkle_root.as_ref().ok_or_else(|| {
            EngineError::StateMachineInvariantViolated(
                "active election without an eligibility root".to_owned(),
            )
        })?;
        if !self.eligibility.verify(
            &req.eligibility_proof,
            merkle_root,
            &req.election_id,
            &req.nullifier,
        ) {
            return Err(EngineError::InvalidEligibilityProof);
        }

        let validity_proof_hash = hash_of_json(&req.ballot.proofs)?;
        let eligibility_proof_hash = hash_of_json(&req.eligibility_proof)?;

        // 6. Ledger append. A failure here aborts the pipeline: the token is
        //    not consumed and no receipt exists.
        let recorded = RecordedVote {
            ciphertexts: req.ballot.ciphertexts.clone(),
            nullifier: req.nullifier,
            validity_proof_hash,
            eligibility_proof_hash,
        };
        let tx = with_retries("cast vote", || {
            self.ledger.cast_vote(&req.election_id, &recorded)
        })
        .await?;

        // 7.-8. Receipt, token consumption, audit row: one store
        // transaction.
        let verification_code = self.with_csprng(VerificationCode::generate);
        let ciphertext_hash = req.ballot.hash(&self.params);
        let receipt = VoteReceipt {
            verification_code: verification_code.clone(),
            election_id: req.election_id.clone(),
            ciphertext_hash,
            nullifier: req.nullifier,
            voting_period: period,
            ledger_tx_id: tx.tx_id,
            block_number: tx.block_number,
            validity_proof_hash,
            eligibility_proof_hash,
            cast_at: now,
            confirmed_at: Some(tx.timestamp),
        };
        self.store
            .commit_submission(&SubmissionCommit {
                receipt,
                token_hash: token.token_hash,
                used_at: now,
                voter_ref: token.voter_ref,
                audit: AuditEvent {
                    election_id: req.election_id.clone(),
                    action: AuditAction::VoteSubmitted,
                    action_hash: ciphertext_hash,
                    at: now,
                },
                max_nullifier_uses,
            })
            .await?;

        info!(election = %req.election_id, block = tx.block_number, "ballot recorded");
        Ok(SubmitOutcome {
            verification_code,
            tx_id: tx.tx_id,
            block_number: tx.block_number,
        })
    }

    /// Mode-specific uniqueness rules. Returns the nullifier-use bound the
    /// store index enforces as a backstop.
    async fn check_ballot_allowance(
        &self,
        election: &Election,
        voter_ref: &VoterAuthRef,
        nullifier: &Nullifier,
        period: u64,
    ) -> EngineResult<u64> {
        let uses = self
            .store
            .nullifier_count(&election.id, nullifier, period)
            .await?;

        match &election.voting_mode {
            VotingMode::Single | VotingMode::PeriodicReset { .. } => {
                if uses > 0 {
                    return Err(EngineError::DuplicateNullifier);
                }
                Ok(1)
            }
            VotingMode::MultiLimited { max_selections } => {
                let cast = self
                    .store
                    .ballots_cast(&election.id, voter_ref, period)
                    .await?;
                if cast >= *max_selections {
                    return Err(EngineError::VoteLimitReached);
                }
                if uses >= *max_selections as u64 {
                    return Err(EngineError::DuplicateNullifier);
                }
                Ok(*max_selections as u64)
            }
        }
    }
}

fn hash_of_json<T: serde::Serialize>(value: &T) -> EngineResult<HValue> {
    let bytes = serde_json::to_vec(value).map_err(|_| EngineError::MalformedProof)?;
    Ok(h(&bytes))
}
