#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Bulletin-board ledger collaborator contract.
//!
//! The ledger is an append-only ordered log with read-back: every
//! election-relevant event lands as an entry with a strictly monotonic
//! sequence number, and the bulletin board is the ordered projection of those
//! entries. Any implementation satisfying this trait is acceptable; the
//! in-memory [`MemoryLedger`] is the development stand-in for a real
//! blockchain network.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_lock::Mutex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    cgs::Ciphertext,
    clock::{Clock, Timestamp},
    election::ElectionId,
    eligibility::Nullifier,
    hash::{HValue, h},
    parameters::GroupParameters,
    retry::Transient,
    tally::PublishedTally,
};

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("ledger call timed out")]
    Timeout,

    #[error("ledger rejected the transaction: {0}")]
    Rejected(String),
}

impl Transient for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_) | LedgerError::Timeout)
    }
}

/// Entry types of the bulletin board.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Open,
    Vote,
    Close,
    TallyStart,
    TallyResult,
    Cancel,
}

/// Receipt of a committed ledger write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub tx_id: HValue,
    pub block_number: u64,
    pub timestamp: Timestamp,
}

/// One ordered bulletin-board entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletinEntry {
    pub seq: u64,
    pub kind: EntryKind,
    pub payload_hash: HValue,
    pub tx_id: HValue,
    pub timestamp: Timestamp,
}

/// The vote payload as recorded on the ledger: the ballot ciphertexts, the
/// nullifier, and hashes of the two submitted proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedVote {
    pub ciphertexts: Vec<Ciphertext>,
    pub nullifier: Nullifier,
    pub validity_proof_hash: HValue,
    pub eligibility_proof_hash: HValue,
}

impl RecordedVote {
    /// SHA-256 over the concatenated canonical ciphertext encodings; equals
    /// the `ciphertext_hash` on the voter's receipt.
    pub fn ciphertext_hash(&self, params: &GroupParameters) -> HValue {
        let mut v = Vec::with_capacity(self.ciphertexts.len() * 2 * params.p_len_bytes());
        for ct in &self.ciphertexts {
            v.extend_from_slice(&ct.canonical_bytes(params));
        }
        h(&v)
    }
}

/// Result of a by-hash vote lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteLookup {
    pub tx: TxRecord,
    pub ciphertext_hash: HValue,
}

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Appends a `VOTE` entry. The write is atomic: either the vote is
    /// ordered with a transaction id, or nothing happened.
    async fn cast_vote(
        &self,
        election_id: &ElectionId,
        vote: &RecordedVote,
    ) -> Result<TxRecord, LedgerError>;

    /// Appends a lifecycle entry (`OPEN`, `CLOSE`, `TALLY_START`, `CANCEL`).
    async fn record_event(
        &self,
        election_id: &ElectionId,
        kind: EntryKind,
        payload_hash: HValue,
    ) -> Result<TxRecord, LedgerError>;

    /// All recorded votes of an election in commit order.
    async fn all_votes(&self, election_id: &ElectionId) -> Result<Vec<RecordedVote>, LedgerError>;

    /// Looks a vote up by its ciphertext hash.
    async fn vote_by_hash(
        &self,
        election_id: &ElectionId,
        ciphertext_hash: &HValue,
    ) -> Result<Option<VoteLookup>, LedgerError>;

    /// Publishes the tally result, appending the `TALLY_RESULT` entry.
    async fn store_tally_result(
        &self,
        election_id: &ElectionId,
        result: &PublishedTally,
    ) -> Result<TxRecord, LedgerError>;

    /// The published tally result, if any.
    async fn tally_result(
        &self,
        election_id: &ElectionId,
    ) -> Result<Option<PublishedTally>, LedgerError>;

    /// The ordered bulletin board of an election.
    async fn bulletin_board(
        &self,
        election_id: &ElectionId,
    ) -> Result<Vec<BulletinEntry>, LedgerError>;

    /// Checks that a vote with this nullifier and ciphertext hash is
    /// recorded.
    async fn verify_vote(
        &self,
        election_id: &ElectionId,
        nullifier: &Nullifier,
        ciphertext_hash: &HValue,
    ) -> Result<bool, LedgerError>;
}

#[derive(Default)]
struct ElectionLog {
    entries: Vec<BulletinEntry>,
    votes: Vec<(RecordedVote, TxRecord)>,
    tally: Option<PublishedTally>,
}

/// In-memory ledger used for development and tests. Sequence numbers are
/// per-election and strictly monotonic; transaction ids are hashes of the
/// entry position and payload.
pub struct MemoryLedger {
    params: Arc<GroupParameters>,
    clock: Arc<dyn Clock>,
    inner: Mutex<HashMap<ElectionId, ElectionLog>>,
    /// Number of upcoming write operations that fail with a transient error.
    inject_write_faults: AtomicU32,
}

impl MemoryLedger {
    pub fn new(params: Arc<GroupParameters>, clock: Arc<dyn Clock>) -> Self {
        MemoryLedger {
            params,
            clock,
            inner: Mutex::new(HashMap::new()),
            inject_write_faults: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` write operations fail with a transient error.
    pub fn inject_write_faults(&self, n: u32) {
        self.inject_write_faults.store(n, Ordering::SeqCst);
    }

    fn take_injected_fault(&self) -> Option<LedgerError> {
        let previous = self
            .inject_write_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok();
        previous.map(|_| LedgerError::Unavailable("injected fault".to_owned()))
    }

    fn append(
        &self,
        log: &mut ElectionLog,
        election_id: &ElectionId,
        kind: EntryKind,
        payload_hash: HValue,
    ) -> (BulletinEntry, TxRecord) {
        let seq = log.entries.len() as u64 + 1;

        let mut v = vec![0x51_u8];
        crate::hash::put_str(&mut v, election_id.as_str());
        crate::hash::put_u64(&mut v, seq);
        v.extend_from_slice(payload_hash.as_bytes());
        let tx_id = h(&v);

        let tx = TxRecord {
            tx_id,
            block_number: seq,
            timestamp: self.clock.now(),
        };
        let entry = BulletinEntry {
            seq,
            kind,
            payload_hash,
            tx_id,
            timestamp: tx.timestamp,
        };
        log.entries.push(entry.clone());
        (entry, tx)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn cast_vote(
        &self,
        election_id: &ElectionId,
        vote: &RecordedVote,
    ) -> Result<TxRecord, LedgerError> {
        if let Some(fault) = self.take_injected_fault() {
            return Err(fault);
        }

        let mut inner = self.inner.lock().await;
        let log = inner.entry(election_id.clone()).or_default();

        let payload_hash = vote.ciphertext_hash(&self.params);
        let (_, tx) = self.append(log, election_id, EntryKind::Vote, payload_hash);
        log.votes.push((vote.clone(), tx.clone()));
        Ok(tx)
    }

    async fn record_event(
        &self,
        election_id: &ElectionId,
        kind: EntryKind,
        payload_hash: HValue,
    ) -> Result<TxRecord, LedgerError> {
        if let Some(fault) = self.take_injected_fault() {
            return Err(fault);
        }

        let mut inner = self.inner.lock().await;
        let log = inner.entry(election_id.clone()).or_default();
        let (_, tx) = self.append(log, election_id, kind, payload_hash);
        Ok(tx)
    }

    async fn all_votes(&self, election_id: &ElectionId) -> Result<Vec<RecordedVote>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(election_id)
            .map(|log| log.votes.iter().map(|(v, _)| v.clone()).collect())
            .unwrap_or_default())
    }

    async fn vote_by_hash(
        &self,
        election_id: &ElectionId,
        ciphertext_hash: &HValue,
    ) -> Result<Option<VoteLookup>, LedgerError> {
        let inner = self.inner.lock().await;
        let Some(log) = inner.get(election_id) else {
            return Ok(None);
        };
        Ok(log
            .votes
            .iter()
            .find(|(v, _)| v.ciphertext_hash(&self.params) == *ciphertext_hash)
            .map(|(_, tx)| VoteLookup {
                tx: tx.clone(),
                ciphertext_hash: *ciphertext_hash,
            }))
    }

    async fn store_tally_result(
        &self,
        election_id: &ElectionId,
        result: &PublishedTally,
    ) -> Result<TxRecord, LedgerError> {
        if let Some(fault) = self.take_injected_fault() {
            return Err(fault);
        }

        let mut inner = self.inner.lock().await;
        let log = inner.entry(election_id.clone()).or_default();
        let (_, tx) = self.append(
            log,
            election_id,
            EntryKind::TallyResult,
            result.aggregate_hash,
        );
        log.tally = Some(result.clone());
        Ok(tx)
    }

    async fn tally_result(
        &self,
        election_id: &ElectionId,
    ) -> Result<Option<PublishedTally>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner.get(election_id).and_then(|log| log.tally.clone()))
    }

    async fn bulletin_board(
        &self,
        election_id: &ElectionId,
    ) -> Result<Vec<BulletinEntry>, LedgerError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .get(election_id)
            .map(|log| log.entries.clone())
            .unwrap_or_default())
    }

    async fn verify_vote(
        &self,
        election_id: &ElectionId,
        nullifier: &Nullifier,
        ciphertext_hash: &HValue,
    ) -> Result<bool, LedgerError> {
        let inner = self.inner.lock().await;
        let Some(log) = inner.get(election_id) else {
            return Ok(false);
        };
        Ok(log.votes.iter().any(|(v, _)| {
            v.nullifier == *nullifier && v.ciphertext_hash(&self.params) == *ciphertext_hash
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::clock::ManualClock;
    use crate::parameters::STANDARD_PARAMETERS;
    use futures_lite::future::block_on;

    fn ledger() -> MemoryLedger {
        let clock = Arc::new(ManualClock::new(Timestamp::from_unix_secs(50_000)));
        MemoryLedger::new(STANDARD_PARAMETERS.clone(), clock)
    }

    fn vote(n: u8) -> RecordedVote {
        RecordedVote {
            ciphertexts: vec![Ciphertext::neutral()],
            nullifier: Nullifier::derive(&[n], &ElectionId::new("e1"), None),
            validity_proof_hash: h(&[n, 1]),
            eligibility_proof_hash: h(&[n, 2]),
        }
    }

    #[test]
    fn sequence_numbers_are_strictly_monotonic() {
        let ledger = ledger();
        let eid = ElectionId::new("e1");
        block_on(async {
            ledger.record_event(&eid, EntryKind::Open, h(b"open")).await.unwrap();
            ledger.cast_vote(&eid, &vote(1)).await.unwrap();
            ledger.cast_vote(&eid, &vote(2)).await.unwrap();
            ledger.record_event(&eid, EntryKind::Close, h(b"close")).await.unwrap();

            let board = ledger.bulletin_board(&eid).await.unwrap();
            let seqs: Vec<_> = board.iter().map(|e| e.seq).collect();
            assert_eq!(seqs, vec![1, 2, 3, 4]);
            assert_eq!(board[0].kind, EntryKind::Open);
            assert_eq!(board[1].kind, EntryKind::Vote);
            assert_eq!(board[3].kind, EntryKind::Close);
        });
    }

    #[test]
    fn votes_are_readable_and_verifiable() {
        let ledger = ledger();
        let eid = ElectionId::new("e1");
        let params = STANDARD_PARAMETERS.clone();
        block_on(async {
            let v = vote(1);
            let tx = ledger.cast_vote(&eid, &v).await.unwrap();

            assert_eq!(ledger.all_votes(&eid).await.unwrap(), vec![v.clone()]);

            let hash = v.ciphertext_hash(&params);
            let lookup = ledger.vote_by_hash(&eid, &hash).await.unwrap().unwrap();
            assert_eq!(lookup.tx, tx);

            assert!(ledger.verify_vote(&eid, &v.nullifier, &hash).await.unwrap());
            assert!(!ledger.verify_vote(&eid, &vote(2).nullifier, &hash).await.unwrap());
            assert!(!ledger.verify_vote(&eid, &v.nullifier, &h(b"other")).await.unwrap());
        });
    }

    #[test]
    fn injected_faults_fail_writes_transiently() {
        let ledger = ledger();
        let eid = ElectionId::new("e1");
        block_on(async {
            ledger.inject_write_faults(1);
            let err = ledger.cast_vote(&eid, &vote(1)).await.unwrap_err();
            assert!(err.is_transient());

            // The failed write left nothing behind, and the fault is spent.
            assert!(ledger.bulletin_board(&eid).await.unwrap().is_empty());
            ledger.cast_vote(&eid, &vote(1)).await.unwrap();
            assert_eq!(ledger.bulletin_board(&eid).await.unwrap().len(), 1);
        });
    }

    #[test]
    fn elections_are_independent() {
        let ledger = ledger();
        block_on(async {
            let e1 = ElectionId::new("e1");
            let e2 = ElectionId::new("e2");
            ledger.cast_vote(&e1, &vote(1)).await.unwrap();
            assert_eq!(ledger.all_votes(&e2).await.unwrap().len(), 0);
            assert!(ledger.bulletin_board(&e2).await.unwrap().is_empty());
        });
    }
}
