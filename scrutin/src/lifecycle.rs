#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Administrative election lifecycle operations.
//!
//! Every committed transition lands on the bulletin board before the store is
//! updated, so the ledger stays the authoritative record. The per-election
//! lock shared with the submission engine makes `close` a drain barrier: no
//! submission can be in flight while the status flips.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use util::algebra::GroupElement;

use crate::{
    cgs::PublicKey,
    clock::Clock,
    election::{Election, ElectionId, ElectionStatus},
    errors::{EngineError, EngineResult},
    hash::{HValue, h, h_cat},
    identity::Role,
    ledger::{EntryKind, Ledger},
    records::{AuditAction, AuditEvent},
    retry::with_retries,
    store::Store,
    parameters::GroupParameters,
};

/// Registry of per-election submission locks. Within one election the lock
/// serializes ballot commits against each other and against `close`; across
/// elections operations stay independent.
#[derive(Default)]
pub struct ElectionLocks {
    inner: std::sync::Mutex<HashMap<ElectionId, Arc<async_lock::Mutex<()>>>>,
}

impl ElectionLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(ElectionLocks::default())
    }

    fn handle(&self, id: &ElectionId) -> Arc<async_lock::Mutex<()>> {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.entry(id.clone()).or_default().clone()
    }

    /// Acquires the election's lock; the guard owns its handle.
    pub async fn acquire(&self, id: &ElectionId) -> async_lock::MutexGuardArc<()> {
        self.handle(id).lock_arc().await
    }
}

/// Administrative side of the lifecycle state machine.
pub struct ElectionAdmin {
    params: Arc<GroupParameters>,
    store: Arc<dyn Store>,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    locks: Arc<ElectionLocks>,
}

impl ElectionAdmin {
    pub fn new(
        params: Arc<GroupParameters>,
        store: Arc<dyn Store>,
        ledger: Arc<dyn Ledger>,
        clock: Arc<dyn Clock>,
        locks: Arc<ElectionLocks>,
    ) -> Self {
        ElectionAdmin {
            params,
            store,
            ledger,
            clock,
            locks,
        }
    }

    fn require_admin(role: Role) -> EngineResult<()> {
        if role == Role::Admin {
            Ok(())
        } else {
            Err(EngineError::InsufficientRole)
        }
    }

    async fn load(&self, id: &ElectionId) -> EngineResult<Election> {
        self.store
            .election(id)
            .await?
            .ok_or(EngineError::UnknownElection)
    }

    /// Stores a new draft election.
    pub async fn create_election(&self, role: Role, election: Election) -> EngineResult<()> {
        Self::require_admin(role)?;
        if election.status != ElectionStatus::Draft {
            return Err(EngineError::InvalidStatus {
                status: election.status,
            });
        }
        if election.threshold < 1 || election.threshold > election.n_trustees {
            return Err(EngineError::StateMachineInvariantViolated(format!(
                "threshold {} of {} trustees",
                election.threshold, election.n_trustees
            )));
        }
        info!(election = %election.id, "created draft election");
        self.store.put_election(&election).await?;
        Ok(())
    }

    /// Attaches the public key, trustee commitments and eligibility root.
    /// Allowed while the election has not been activated.
    pub async fn install_crypto_material(
        &self,
        role: Role,
        id: &ElectionId,
        public_key: PublicKey,
        trustee_commitments: Vec<GroupElement>,
        merkle_root: HValue,
    ) -> EngineResult<()> {
        Self::require_admin(role)?;
        let mut election = self.load(id).await?;

        if !matches!(
            election.status,
            ElectionStatus::Draft | ElectionStatus::Pending
        ) {
            return Err(EngineError::InvalidStatus {
                status: election.status,
            });
        }
        if !public_key.is_valid(&self.params) {
            return Err(EngineError::MalformedCiphertext);
        }
        if trustee_commitments.len() != election.n_trustees as usize
            || trustee_commitments
                .iter()
                .any(|v| !v.is_valid(self.params.group()))
        {
            return Err(EngineError::InvalidKeyShare);
        }

        election.public_key = Some(public_key);
        election.trustee_commitments = trustee_commitments;
        election.merkle_root = Some(merkle_root);
        self.store.put_election(&election).await?;
        info!(election = %id, "installed election crypto material");
        Ok(())
    }

    /// `draft -> pending`.
    pub async fn schedule(&self, role: Role, id: &ElectionId) -> EngineResult<()> {
        Self::require_admin(role)?;
        let mut election = self.load(id).await?;
        election.apply_transition(ElectionStatus::Pending, self.clock.now(), false)?;
        self.store.put_election(&election).await?;
        info!(election = %id, "election scheduled");
        Ok(())
    }

    /// `pending -> active`, appending the `OPEN` entry.
    pub async fn open(&self, role: Role, id: &ElectionId) -> EngineResult<()> {
        Self::require_admin(role)?;
        let mut election = self.load(id).await?;
        let now = self.clock.now();
        election.ensure_transition(ElectionStatus::Active, now, false)?;

        let payload_hash = self.open_payload_hash(&election);
        self.append_event(id, EntryKind::Open, payload_hash).await?;

        election.apply_transition(ElectionStatus::Active, now, false)?;
        self.store.put_election(&election).await?;
        self.audit_status(id, &election).await?;
        info!(election = %id, "election opened");
        Ok(())
    }

    /// `active -> closed` behind the drain barrier, appending the `CLOSE`
    /// entry. `force` closes before the scheduled end time.
    pub async fn close(&self, role: Role, id: &ElectionId, force: bool) -> EngineResult<()> {
        Self::require_admin(role)?;

        let _barrier = self.locks.acquire(id).await;

        let mut election = self.load(id).await?;
        let now = self.clock.now();
        election.ensure_transition(ElectionStatus::Closed, now, force)?;

        self.append_event(id, EntryKind::Close, h(id.as_str().as_bytes()))
            .await?;

        election.apply_transition(ElectionStatus::Closed, now, force)?;
        self.store.put_election(&election).await?;
        self.audit_status(id, &election).await?;
        info!(election = %id, force, "election closed");
        Ok(())
    }

    /// Terminal cancellation, appending the `CANCEL` entry.
    pub async fn cancel(&self, role: Role, id: &ElectionId) -> EngineResult<()> {
        Self::require_admin(role)?;

        let _barrier = self.locks.acquire(id).await;

        let mut election = self.load(id).await?;
        let now = self.clock.now();
        election.ensure_transition(ElectionStatus::Cancelled, now, false)?;

        self.append_event(id, EntryKind::Cancel, h(id.as_str().as_bytes()))
            .await?;

        election.apply_transition(ElectionStatus::Cancelled, now, false)?;
        self.store.put_election(&election).await?;
        self.audit_status(id, &election).await?;
        info!(election = %id, "election cancelled");
        Ok(())
    }

    /// `OPEN` payload: hash of the public key, eligibility root and trustee
    /// commitments the election runs under.
    fn open_payload_hash(&self, election: &Election) -> HValue {
        let len = self.params.p_len_bytes();
        let mut v = Vec::new();
        if let Some(pk) = &election.public_key {
            v.extend_from_slice(&pk.canonical_bytes(&self.params));
        }
        if let Some(root) = &election.merkle_root {
            v.extend_from_slice(root.as_bytes());
        }
        for commitment in &election.trustee_commitments {
            v.extend_from_slice(&commitment.to_be_bytes_left_pad(len));
        }
        h(&v)
    }

    async fn append_event(
        &self,
        id: &ElectionId,
        kind: EntryKind,
        payload_hash: HValue,
    ) -> EngineResult<()> {
        with_retries("ledger event", || {
            self.ledger.record_event(id, kind, payload_hash)
        })
        .await?;
        Ok(())
    }

    async fn audit_status(&self, id: &ElectionId, election: &Election) -> EngineResult<()> {
        self.store
            .append_audit(&AuditEvent {
                election_id: id.clone(),
                action: AuditAction::StatusChanged,
                action_hash: h_cat(&[id.as_str().as_bytes(), election.status.to_string().as_bytes()]),
                at: self.clock.now(),
            })
            .await?;
        Ok(())
    }
}
