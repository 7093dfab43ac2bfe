#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Read-only verification façade. All three queries are answered against the
//! ledger, never against a local mirror alone; the store only resolves
//! voter-facing handles (verification codes) into ledger coordinates.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use util::algebra::FieldElement;

use crate::{
    clock::Timestamp,
    election::ElectionId,
    errors::{EngineError, EngineResult},
    hash::HValue,
    ledger::{BulletinEntry, Ledger, VoteLookup},
    parameters::GroupParameters,
    records::{AuditEvent, VoteReceipt},
    retry::with_retries,
    store::Store,
    tally::AggregateBallot,
    threshold::{PartialDecryption, combine_partial_decryptions},
};

/// Cast-as-intended: the receipt exists and the ledger holds a vote with the
/// receipt's nullifier and ciphertext hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastAsIntendedReport {
    pub found: bool,
    pub ledger_confirmed: bool,
    pub receipt: Option<VoteReceipt>,
}

impl CastAsIntendedReport {
    pub fn verified(&self) -> bool {
        self.found && self.ledger_confirmed
    }
}

/// Recorded-as-cast: a ledger vote exists for the ciphertext hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAsCastReport {
    pub found: bool,
    pub record: Option<VoteLookup>,
    pub checked_at: Timestamp,
}

/// Per-candidate sub-checks of the tallied-as-recorded audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateAudit {
    pub aggregate_matches: bool,
    pub decryption_proofs_valid: bool,
    pub count_matches: bool,
}

impl CandidateAudit {
    pub fn passed(&self) -> bool {
        self.aggregate_matches && self.decryption_proofs_valid && self.count_matches
    }
}

/// Tallied-as-recorded: each sub-check reported independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyAuditReport {
    pub tally_published: bool,
    pub aggregate_hash_matches: bool,
    pub total_recorded_ballots: u64,
    pub total_tallied_ballots: u64,
    pub candidates: Vec<CandidateAudit>,
}

impl TallyAuditReport {
    pub fn verified(&self) -> bool {
        self.tally_published
            && self.aggregate_hash_matches
            && self.total_recorded_ballots == self.total_tallied_ballots
            && !self.candidates.is_empty()
            && self.candidates.iter().all(CandidateAudit::passed)
    }
}

pub struct VerificationFacade {
    params: Arc<GroupParameters>,
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn crate::clock::Clock>,
}

impl VerificationFacade {
    pub fn new(
        params: Arc<GroupParameters>,
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn crate::clock::Clock>,
    ) -> Self {
        VerificationFacade {
            params,
            store,
            ledger,
            clock,
        }
    }

    /// Resolves a verification code to its receipt and confirms the vote on
    /// the ledger by nullifier and ciphertext hash.
    pub async fn verify_cast_as_intended(
        &self,
        verification_code: &str,
    ) -> EngineResult<CastAsIntendedReport> {
        let Some(receipt) = self.store.receipt_by_code(verification_code).await? else {
            return Ok(CastAsIntendedReport {
                found: false,
                ledger_confirmed: false,
                receipt: None,
            });
        };

        let ledger_confirmed = with_retries("verify vote", || {
            self.ledger.verify_vote(
                &receipt.election_id,
                &receipt.nullifier,
                &receipt.ciphertext_hash,
            )
        })
        .await?;

        Ok(CastAsIntendedReport {
            found: true,
            ledger_confirmed,
            receipt: Some(receipt),
        })
    }

    /// Looks a ciphertext hash up on the ledger.
    pub async fn verify_recorded_as_cast(
        &self,
        election_id: &ElectionId,
        ciphertext_hash: &HValue,
    ) -> EngineResult<RecordedAsCastReport> {
        let record = with_retries("vote by hash", || {
            self.ledger.vote_by_hash(election_id, ciphertext_hash)
        })
        .await?;

        Ok(RecordedAsCastReport {
            found: record.is_some(),
            record,
            checked_at: self.clock.now(),
        })
    }

    /// Recomputes the homomorphic aggregate from the ledger's votes and
    /// checks the published tally against it: the aggregate per candidate,
    /// every partial-decryption proof, and the re-derivation of each count.
    pub async fn verify_tallied_as_recorded(
        &self,
        election_id: &ElectionId,
    ) -> EngineResult<TallyAuditReport> {
        let election = self
            .store
            .election(election_id)
            .await?
            .ok_or(EngineError::UnknownElection)?;

        let votes = with_retries("read votes", || self.ledger.all_votes(election_id)).await?;
        let recomputed = AggregateBallot::from_votes(&self.params, &election, &votes);

        let Some(published) =
            with_retries("read tally", || self.ledger.tally_result(election_id)).await?
        else {
            return Ok(TallyAuditReport {
                tally_published: false,
                aggregate_hash_matches: false,
                total_recorded_ballots: recomputed.ballot_count,
                total_tallied_ballots: 0,
                candidates: Vec::new(),
            });
        };

        let group = self.params.group();
        let field = self.params.field();

        let mut candidates = Vec::with_capacity(published.candidates.len());
        for (candidate_ix, candidate) in published.candidates.iter().enumerate() {
            let aggregate_matches = recomputed
                .sums
                .get(candidate_ix)
                .is_some_and(|sum| *sum == candidate.aggregate);

            let decryption_proofs_valid = !candidate.shares.is_empty()
                && candidate.shares.iter().all(|share| {
                    let slot = (share.partial.index.get_one_based_u32() as usize).checked_sub(1);
                    slot.and_then(|s| election.trustee_commitments.get(s))
                        .is_some_and(|commitment| {
                            share.proof.verify(
                                &self.params,
                                commitment,
                                &candidate.aggregate,
                                &share.partial,
                            )
                        })
                });

            // Re-derive the count: D from the published partials, then
            // check c2 * D^{-1} == g^count.
            let partials: Vec<PartialDecryption> = candidate
                .shares
                .iter()
                .map(|s| s.partial.clone())
                .collect();
            let count_matches =
                combine_partial_decryptions(&self.params, &partials, election.threshold)
                    .ok()
                    .and_then(|d| d.inv(group))
                    .map(|d_inv| {
                        let g_m = candidate.aggregate.c2.mul(&d_inv, group);
                        g_m == group.g_exp(&FieldElement::from(candidate.count, field))
                    })
                    .unwrap_or(false);

            candidates.push(CandidateAudit {
                aggregate_matches,
                decryption_proofs_valid,
                count_matches,
            });
        }

        Ok(TallyAuditReport {
            tally_published: true,
            aggregate_hash_matches: recomputed.hash(&self.params) == published.aggregate_hash,
            total_recorded_ballots: recomputed.ballot_count,
            total_tallied_ballots: published.ballot_count,
            candidates,
        })
    }

    /// The ordered bulletin board of an election.
    pub async fn bulletin_board(
        &self,
        election_id: &ElectionId,
    ) -> EngineResult<Vec<BulletinEntry>> {
        Ok(with_retries("bulletin board", || {
            self.ledger.bulletin_board(election_id)
        })
        .await?)
    }

    /// Pages through the anonymized audit log.
    pub async fn audit_log(
        &self,
        election_id: &ElectionId,
        limit: usize,
        offset: usize,
    ) -> EngineResult<Vec<AuditEvent>> {
        Ok(self.store.audit_log(election_id, limit, offset).await?)
    }
}
