#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The tally engine: homomorphic aggregation over the ledger's `VOTE`
//! entries, threshold decryption from trustee contributions and publication
//! of the result with its correctness proofs.
//!
//! A trustee whose proofs fail verification is dropped and the remaining
//! quorum carries on; dropping below `k` valid trustees aborts the tally. A
//! discrete-log miss is fatal: it means the aggregate ceiling was
//! misconfigured.

use std::collections::HashMap;
use std::sync::Arc;

use itertools::izip;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use util::{algebra_utils::DiscreteLog, csprng::Csprng};

use crate::{
    cgs::Ciphertext,
    clock::Clock,
    election::{Election, ElectionId, ElectionStatus, VotingMode},
    eligibility::Nullifier,
    errors::{EngineError, EngineResult},
    hash::{HValue, h},
    ledger::{EntryKind, Ledger, RecordedVote},
    parameters::GroupParameters,
    records::{AuditAction, AuditEvent},
    retry::with_retries,
    store::Store,
    threshold::{KeyShare, PartialDecryption, combine_partial_decryptions, partial_decrypt},
    zk::DecryptionProof,
};

/// Per-candidate homomorphic sums over the deduplicated ledger votes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateBallot {
    pub election_id: ElectionId,
    pub sums: Vec<Ciphertext>,
    pub ballot_count: u64,
}

impl AggregateBallot {
    /// Folds the recorded votes into per-candidate sums.
    ///
    /// Votes are deduplicated by nullifier up to the voting mode's bound and
    /// votes whose ballot shape does not match the candidate list are
    /// skipped.
    pub fn from_votes(
        params: &GroupParameters,
        election: &Election,
        votes: &[RecordedVote],
    ) -> Self {
        let candidates = election.candidates.len();
        let nullifier_bound = match &election.voting_mode {
            VotingMode::MultiLimited { max_selections } => *max_selections as u64,
            _ => 1,
        };

        let mut sums = vec![Ciphertext::neutral(); candidates];
        let mut ballot_count = 0u64;
        let mut seen: HashMap<Nullifier, u64> = HashMap::new();

        for vote in votes {
            if vote.ciphertexts.len() != candidates {
                warn!(election = %election.id, "skipping vote with mismatched ballot shape");
                continue;
            }
            let uses = seen.entry(vote.nullifier).or_insert(0);
            if *uses >= nullifier_bound {
                warn!(election = %election.id, nullifier = %vote.nullifier, "skipping duplicate vote");
                continue;
            }
            *uses += 1;

            for (sum, ct) in sums.iter_mut().zip(&vote.ciphertexts) {
                *sum = sum.add(ct, params);
            }
            ballot_count += 1;
        }

        AggregateBallot {
            election_id: election.id.clone(),
            sums,
            ballot_count,
        }
    }

    /// SHA-256 over the concatenated canonical encodings of the sums.
    pub fn hash(&self, params: &GroupParameters) -> HValue {
        let mut v = Vec::with_capacity(self.sums.len() * 2 * params.p_len_bytes());
        for ct in &self.sums {
            v.extend_from_slice(&ct.canonical_bytes(params));
        }
        h(&v)
    }
}

/// One trustee's input to the tally: a partial decryption of every
/// per-candidate aggregate, each with its Chaum-Pedersen proof.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrusteeContribution {
    pub trustee: crate::threshold::TrusteeIndex,
    pub partials: Vec<PartialDecryption>,
    pub proofs: Vec<DecryptionProof>,
}

impl TrusteeContribution {
    /// Computed trustee-side from the key share; the share never travels.
    pub fn compute(
        params: &GroupParameters,
        share: &KeyShare,
        aggregate: &AggregateBallot,
        csprng: &mut Csprng,
    ) -> Self {
        let mut partials = Vec::with_capacity(aggregate.sums.len());
        let mut proofs = Vec::with_capacity(aggregate.sums.len());
        for ct in &aggregate.sums {
            let partial = partial_decrypt(params, ct, share);
            let proof = DecryptionProof::prove(params, share, ct, &partial, csprng);
            partials.push(partial);
            proofs.push(proof);
        }
        TrusteeContribution {
            trustee: share.index(),
            partials,
            proofs,
        }
    }

    /// Verifies shape, index consistency and every per-candidate proof
    /// against the trustee's published commitment.
    pub fn verify(
        &self,
        params: &GroupParameters,
        commitment: &util::algebra::GroupElement,
        aggregate: &AggregateBallot,
    ) -> bool {
        if self.partials.len() != aggregate.sums.len()
            || self.proofs.len() != aggregate.sums.len()
        {
            return false;
        }
        if self.partials.iter().any(|p| p.index != self.trustee) {
            return false;
        }
        izip!(&self.partials, &self.proofs, &aggregate.sums)
            .all(|(partial, proof, ct)| proof.verify(params, commitment, ct, partial))
    }
}

/// A quorum member's published partial decryption with its proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyShareRecord {
    pub partial: PartialDecryption,
    pub proof: DecryptionProof,
}

/// One candidate's published tally: the aggregate ciphertext, the decrypted
/// count and the quorum's partial decryptions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTally {
    pub aggregate: Ciphertext,
    pub count: u64,
    pub shares: Vec<TallyShareRecord>,
}

/// The published result, as stored on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedTally {
    pub election_id: ElectionId,
    pub counts: Vec<u64>,
    pub aggregate_hash: HValue,
    pub ballot_count: u64,
    pub candidates: Vec<CandidateTally>,
}

pub struct TallyEngine {
    params: Arc<GroupParameters>,
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
}

impl TallyEngine {
    pub fn new(
        params: Arc<GroupParameters>,
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        TallyEngine {
            params,
            store,
            ledger,
            clock,
        }
    }

    /// Reads the election's votes from the ledger (not the local store) and
    /// folds them into per-candidate aggregates.
    pub async fn aggregate(&self, election: &Election) -> EngineResult<AggregateBallot> {
        let votes = with_retries("read votes", || self.ledger.all_votes(&election.id)).await?;
        Ok(AggregateBallot::from_votes(&self.params, election, &votes))
    }

    /// Runs the tally of a closed election from trustee contributions.
    pub async fn tally(
        &self,
        election_id: &ElectionId,
        contributions: &[TrusteeContribution],
    ) -> EngineResult<PublishedTally> {
        let mut election = self
            .store
            .election(election_id)
            .await?
            .ok_or(EngineError::UnknownElection)?;
        let now = self.clock.now();
        election.ensure_transition(ElectionStatus::Tallying, now, false)?;

        let aggregate = self.aggregate(&election).await?;

        // Verify every contribution; a bad trustee is dropped, not fatal.
        let required = election.threshold as usize;
        let mut valid = Vec::with_capacity(contributions.len());
        for contribution in contributions {
            let slot = (contribution.trustee.get_one_based_u32() as usize).checked_sub(1);
            let commitment = match slot.and_then(|s| election.trustee_commitments.get(s)) {
                Some(commitment) => commitment,
                None => {
                    warn!(trustee = %contribution.trustee, "contribution from unknown trustee");
                    continue;
                }
            };
            if contribution.verify(&self.params, commitment, &aggregate) {
                valid.push(contribution);
            } else {
                warn!(trustee = %contribution.trustee, "dropping contribution with invalid proof");
            }
        }
        if valid.len() < required {
            return Err(EngineError::InsufficientTrustees {
                available: valid.len(),
                required,
            });
        }

        // Quorum established: enter `tallying` on the board and in the store.
        let aggregate_hash = aggregate.hash(&self.params);
        with_retries("tally start", || {
            self.ledger
                .record_event(election_id, EntryKind::TallyStart, aggregate_hash)
        })
        .await?;
        election.apply_transition(ElectionStatus::Tallying, now, false)?;
        self.store.put_election(&election).await?;
        self.audit(election_id, AuditAction::TallyStarted, aggregate_hash)
            .await?;
        info!(election = %election_id, trustees = valid.len(), "tally started");

        // Per-candidate threshold decryption.
        let dlog = DiscreteLog::from_group(self.params.group(), election.aggregate_ceiling)
            .ok_or_else(|| {
                EngineError::StateMachineInvariantViolated(
                    "discrete-log table construction failed".to_owned(),
                )
            })?;

        let mut counts = Vec::with_capacity(aggregate.sums.len());
        let mut candidates = Vec::with_capacity(aggregate.sums.len());
        for (candidate_ix, ct) in aggregate.sums.iter().enumerate() {
            let partials: Vec<PartialDecryption> = valid
                .iter()
                .map(|c| c.partials[candidate_ix].clone())
                .collect();

            let d = combine_partial_decryptions(&self.params, &partials, election.threshold)?;
            let d_inv = d
                .inv(self.params.group())
                .ok_or(EngineError::MalformedCiphertext)?;
            let g_m = ct.c2.mul(&d_inv, self.params.group());
            let count = dlog
                .find_group_elem(&g_m)
                .ok_or(EngineError::DlogOutOfRange)?;

            counts.push(count);
            candidates.push(CandidateTally {
                aggregate: ct.clone(),
                count,
                shares: valid
                    .iter()
                    .map(|c| TallyShareRecord {
                        partial: c.partials[candidate_ix].clone(),
                        proof: c.proofs[candidate_ix].clone(),
                    })
                    .collect(),
            });
        }

        let result = PublishedTally {
            election_id: election_id.clone(),
            counts,
            aggregate_hash,
            ballot_count: aggregate.ballot_count,
            candidates,
        };

        // Publish, then complete.
        with_retries("store tally result", || {
            self.ledger.store_tally_result(election_id, &result)
        })
        .await?;
        election.apply_transition(ElectionStatus::Completed, now, false)?;
        self.store.put_election(&election).await?;
        self.audit(election_id, AuditAction::TallyCompleted, aggregate_hash)
            .await?;
        info!(election = %election_id, counts = ?result.counts, "tally published");

        Ok(result)
    }

    async fn audit(
        &self,
        election_id: &ElectionId,
        action: AuditAction,
        action_hash: HValue,
    ) -> EngineResult<()> {
        self.store
            .append_audit(&AuditEvent {
                election_id: election_id.clone(),
                action,
                action_hash,
                at: self.clock.now(),
            })
            .await?;
        Ok(())
    }
}
