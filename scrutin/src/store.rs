#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Persistent-store collaborator contract.
//!
//! Row-oriented storage for elections, tokens, receipts, audit entries and
//! participation counters. The store must offer a transactional
//! [`Store::commit_submission`] and a unique index over
//! `(election, nullifier, period)`; everything else is plain reads and
//! writes. [`MemoryStore`] is the in-process reference implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_lock::Mutex;
use async_trait::async_trait;
use thiserror::Error;

use crate::{
    clock::Timestamp,
    election::{Election, ElectionId},
    eligibility::Nullifier,
    hash::HValue,
    records::{AuditEvent, VoteReceipt, VoterAuthRef, VotingToken},
};

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("a receipt with this nullifier already exists")]
    DuplicateNullifier,

    #[error("token row not found")]
    TokenMissing,

    #[error("token is already marked used")]
    TokenAlreadyUsed,

    #[error("election row not found")]
    ElectionMissing,
}

/// The atomic write set of one successful submission. Either all of it is
/// persisted or none: the receipt insert (with the nullifier uniqueness
/// check), the token consumption, the audit row and the participation bump.
#[derive(Clone, Debug)]
pub struct SubmissionCommit {
    pub receipt: VoteReceipt,
    pub token_hash: HValue,
    pub used_at: Timestamp,
    pub voter_ref: VoterAuthRef,
    pub audit: AuditEvent,
    /// Uniqueness bound enforced by the index: 1 for single and periodic
    /// elections, the selection limit for multi-ballot elections.
    pub max_nullifier_uses: u64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn put_election(&self, election: &Election) -> Result<(), StoreError>;

    async fn election(&self, id: &ElectionId) -> Result<Option<Election>, StoreError>;

    async fn put_token(&self, token: &VotingToken) -> Result<(), StoreError>;

    async fn token_by_hash(&self, token_hash: &HValue)
    -> Result<Option<VotingToken>, StoreError>;

    /// True if an in-force token exists for this voter reference.
    async fn has_unused_token(
        &self,
        election_id: &ElectionId,
        voter_ref: &VoterAuthRef,
        now: Timestamp,
    ) -> Result<bool, StoreError>;

    /// Number of receipts recorded for `(election, nullifier, period)`.
    async fn nullifier_count(
        &self,
        election_id: &ElectionId,
        nullifier: &Nullifier,
        period: u64,
    ) -> Result<u64, StoreError>;

    /// Ballots cast by this voter reference in the given period.
    async fn ballots_cast(
        &self,
        election_id: &ElectionId,
        voter_ref: &VoterAuthRef,
        period: u64,
    ) -> Result<u32, StoreError>;

    /// Atomically persists the write set of one submission.
    async fn commit_submission(&self, commit: &SubmissionCommit) -> Result<(), StoreError>;

    async fn receipt_by_code(&self, code: &str) -> Result<Option<VoteReceipt>, StoreError>;

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError>;

    async fn audit_log(
        &self,
        election_id: &ElectionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditEvent>, StoreError>;
}

#[derive(Default)]
struct StoreInner {
    elections: HashMap<ElectionId, Election>,
    tokens: HashMap<HValue, VotingToken>,
    receipts: HashMap<String, VoteReceipt>,
    /// Unique index `(election, nullifier, period) -> receipt count`.
    nullifiers: HashMap<(ElectionId, Nullifier, u64), u64>,
    participation: HashMap<(ElectionId, VoterAuthRef, u64), u32>,
    audit: Vec<AuditEvent>,
}

/// In-memory store used for development and tests. A single mutex stands in
/// for the database transaction boundary.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryStore::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_election(&self, election: &Election) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.elections.insert(election.id.clone(), election.clone());
        Ok(())
    }

    async fn election(&self, id: &ElectionId) -> Result<Option<Election>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.elections.get(id).cloned())
    }

    async fn put_token(&self, token: &VotingToken) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.tokens.insert(token.token_hash, token.clone());
        Ok(())
    }

    async fn token_by_hash(
        &self,
        token_hash: &HValue,
    ) -> Result<Option<VotingToken>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.get(token_hash).cloned())
    }

    async fn has_unused_token(
        &self,
        election_id: &ElectionId,
        voter_ref: &VoterAuthRef,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tokens.values().any(|t| {
            t.election_id == *election_id && t.voter_ref == *voter_ref && t.is_in_force(now)
        }))
    }

    async fn nullifier_count(
        &self,
        election_id: &ElectionId,
        nullifier: &Nullifier,
        period: u64,
    ) -> Result<u64, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .nullifiers
            .get(&(election_id.clone(), *nullifier, period))
            .copied()
            .unwrap_or(0))
    }

    async fn ballots_cast(
        &self,
        election_id: &ElectionId,
        voter_ref: &VoterAuthRef,
        period: u64,
    ) -> Result<u32, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .participation
            .get(&(election_id.clone(), *voter_ref, period))
            .copied()
            .unwrap_or(0))
    }

    async fn commit_submission(&self, commit: &SubmissionCommit) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        // All checks first; the writes below cannot fail.
        let token = inner
            .tokens
            .get(&commit.token_hash)
            .ok_or(StoreError::TokenMissing)?;
        if token.used_at.is_some() {
            return Err(StoreError::TokenAlreadyUsed);
        }

        let receipt = &commit.receipt;
        let nullifier_key = (
            receipt.election_id.clone(),
            receipt.nullifier,
            receipt.voting_period,
        );
        let uses = inner.nullifiers.get(&nullifier_key).copied().unwrap_or(0);
        if uses >= commit.max_nullifier_uses {
            return Err(StoreError::DuplicateNullifier);
        }

        inner
            .receipts
            .insert(receipt.verification_code.as_str().to_owned(), receipt.clone());
        *inner.nullifiers.entry(nullifier_key).or_insert(0) += 1;
        *inner
            .participation
            .entry((
                receipt.election_id.clone(),
                commit.voter_ref,
                receipt.voting_period,
            ))
            .or_insert(0) += 1;
        if let Some(token) = inner.tokens.get_mut(&commit.token_hash) {
            token.used_at = Some(commit.used_at);
        }
        inner.audit.push(commit.audit.clone());

        Ok(())
    }

    async fn receipt_by_code(&self, code: &str) -> Result<Option<VoteReceipt>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.receipts.get(code).cloned())
    }

    async fn append_audit(&self, event: &AuditEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.audit.push(event.clone());
        Ok(())
    }

    async fn audit_log(
        &self,
        election_id: &ElectionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<AuditEvent>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit
            .iter()
            .filter(|e| e.election_id == *election_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::records::{AuditAction, RawToken, VerificationCode};
    use futures_lite::future::block_on;
    use util::csprng::Csprng;

    fn sample_commit(
        csprng: &mut Csprng,
        token_hash: HValue,
        nullifier: Nullifier,
        at: Timestamp,
    ) -> SubmissionCommit {
        let eid = ElectionId::new("e1");
        let voter_ref = VoterAuthRef::derive("subject", &eid);
        SubmissionCommit {
            receipt: VoteReceipt {
                verification_code: VerificationCode::generate(csprng),
                election_id: eid.clone(),
                ciphertext_hash: crate::hash::h(b"ct"),
                nullifier,
                voting_period: 0,
                ledger_tx_id: crate::hash::h(b"tx"),
                block_number: 1,
                validity_proof_hash: crate::hash::h(b"vp"),
                eligibility_proof_hash: crate::hash::h(b"ep"),
                cast_at: at,
                confirmed_at: Some(at),
            },
            token_hash,
            used_at: at,
            voter_ref,
            audit: AuditEvent {
                election_id: eid,
                action: AuditAction::VoteSubmitted,
                action_hash: crate::hash::h(b"ct"),
                at,
            },
            max_nullifier_uses: 1,
        }
    }

    #[test]
    fn commit_consumes_the_token_and_indexes_the_nullifier() {
        block_on(async {
            let store = MemoryStore::new();
            let mut csprng = Csprng::new(b"store commit");
            let now = Timestamp::from_unix_secs(10_000);
            let eid = ElectionId::new("e1");
            let voter_ref = VoterAuthRef::derive("subject", &eid);

            let raw = RawToken::generate(&mut csprng);
            let token = VotingToken::issue(&raw, eid.clone(), voter_ref, now);
            store.put_token(&token).await.unwrap();
            assert!(store.has_unused_token(&eid, &voter_ref, now).await.unwrap());

            let nullifier = Nullifier::derive(b"s", &eid, None);
            let commit = sample_commit(&mut csprng, raw.hash(), nullifier, now);
            store.commit_submission(&commit).await.unwrap();

            assert!(!store.has_unused_token(&eid, &voter_ref, now).await.unwrap());
            assert_eq!(store.nullifier_count(&eid, &nullifier, 0).await.unwrap(), 1);
            assert_eq!(store.ballots_cast(&eid, &voter_ref, 0).await.unwrap(), 1);

            let code = commit.receipt.verification_code.as_str();
            let receipt = store.receipt_by_code(code).await.unwrap().unwrap();
            assert_eq!(receipt, commit.receipt);

            // A used token cannot back a second commit.
            let second = sample_commit(&mut csprng, raw.hash(), nullifier, now);
            assert_eq!(
                store.commit_submission(&second).await.unwrap_err(),
                StoreError::TokenAlreadyUsed
            );
        });
    }

    #[test]
    fn nullifier_unique_index_is_a_backstop() {
        block_on(async {
            let store = MemoryStore::new();
            let mut csprng = Csprng::new(b"store nullifier index");
            let now = Timestamp::from_unix_secs(10_000);
            let eid = ElectionId::new("e1");
            let voter_ref = VoterAuthRef::derive("subject", &eid);
            let nullifier = Nullifier::derive(b"s", &eid, None);

            let first_raw = RawToken::generate(&mut csprng);
            let second_raw = RawToken::generate(&mut csprng);
            for raw in [&first_raw, &second_raw] {
                let token = VotingToken::issue(raw, eid.clone(), voter_ref, now);
                store.put_token(&token).await.unwrap();
            }

            let commit = sample_commit(&mut csprng, first_raw.hash(), nullifier, now);
            store.commit_submission(&commit).await.unwrap();

            let duplicate = sample_commit(&mut csprng, second_raw.hash(), nullifier, now);
            assert_eq!(
                store.commit_submission(&duplicate).await.unwrap_err(),
                StoreError::DuplicateNullifier
            );
            // The second token survived the rejected transaction.
            assert!(store.has_unused_token(&eid, &voter_ref, now).await.unwrap());
        });
    }

    #[test]
    fn commit_requires_a_known_token() {
        block_on(async {
            let store = MemoryStore::new();
            let mut csprng = Csprng::new(b"store unknown token");
            let now = Timestamp::from_unix_secs(10_000);
            let eid = ElectionId::new("e1");

            let commit = sample_commit(
                &mut csprng,
                crate::hash::h(b"missing"),
                Nullifier::derive(b"s", &eid, None),
                now,
            );
            assert_eq!(
                store.commit_submission(&commit).await.unwrap_err(),
                StoreError::TokenMissing
            );
            // Nothing was persisted.
            assert_eq!(
                store
                    .nullifier_count(&eid, &commit.receipt.nullifier, 0)
                    .await
                    .unwrap(),
                0
            );
        });
    }

    #[test]
    fn audit_log_pages_in_order() {
        block_on(async {
            let store = MemoryStore::new();
            let eid = ElectionId::new("e1");
            for i in 0..5u64 {
                store
                    .append_audit(&AuditEvent {
                        election_id: eid.clone(),
                        action: AuditAction::TokenIssued,
                        action_hash: crate::hash::h(&i.to_be_bytes()),
                        at: Timestamp::from_unix_secs(i),
                    })
                    .await
                    .unwrap();
            }

            let page = store.audit_log(&eid, 2, 1).await.unwrap();
            assert_eq!(page.len(), 2);
            assert_eq!(page[0].at, Timestamp::from_unix_secs(1));
            assert_eq!(page[1].at, Timestamp::from_unix_secs(2));
        });
    }
}
