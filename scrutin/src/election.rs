#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Election records and the lifecycle state machine that gates every other
//! engine operation.

use serde::{Deserialize, Serialize};

use util::algebra::GroupElement;

use crate::{
    cgs::PublicKey,
    clock::Timestamp,
    errors::{EngineError, EngineResult},
    hash::HValue,
};

/// Opaque election identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElectionId(String);

impl ElectionId {
    pub fn new(id: impl Into<String>) -> Self {
        ElectionId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for ElectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ElectionId({})", self.0)
    }
}

/// Lifecycle states. `Cancelled` is terminal and reachable from every state
/// before `Closed`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ElectionStatus {
    Draft,
    Pending,
    Active,
    Closed,
    Tallying,
    Completed,
    Cancelled,
}

/// How often one voter may cast a ballot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingMode {
    /// At most one ballot per voter per election.
    Single,

    /// Up to `max_selections` ballots per voter in total. Each ballot marks
    /// at most one candidate, so no candidate can receive more than
    /// `max_selections` from one voter either.
    MultiLimited { max_selections: u32 },

    /// One ballot per voter per window of `reset_interval_secs`; earlier
    /// ballots stay valid. The nullifier derivation includes the window
    /// index.
    PeriodicReset { reset_interval_secs: u64 },
}

impl VotingMode {
    /// The nullifier period key for this mode at the given instant.
    pub fn period(&self, start_time: Timestamp, now: Timestamp) -> Option<u64> {
        match self {
            VotingMode::PeriodicReset {
                reset_interval_secs,
            } if *reset_interval_secs > 0 => {
                Some(now.secs_since(start_time) / reset_interval_secs)
            }
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub party: Option<String>,
    pub display_order: u32,
}

/// The election record as persisted and gated by the state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Election {
    pub id: ElectionId,
    pub title: String,
    pub status: ElectionStatus,
    pub voting_mode: VotingMode,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub candidates: Vec<Candidate>,

    /// Threshold parameters: `threshold` of `n_trustees` shares decrypt.
    pub n_trustees: u32,
    pub threshold: u32,

    /// Populated between `draft` and `active`.
    pub public_key: Option<PublicKey>,
    pub merkle_root: Option<HValue>,
    pub trustee_commitments: Vec<GroupElement>,

    /// Aggregate-vote ceiling for discrete-log recovery, set per election as
    /// electorate size times ballots per voter.
    pub aggregate_ceiling: u64,
}

impl Election {
    /// A fresh draft with no cryptographic material attached yet.
    #[allow(clippy::too_many_arguments)]
    pub fn draft(
        id: ElectionId,
        title: impl Into<String>,
        voting_mode: VotingMode,
        start_time: Timestamp,
        end_time: Timestamp,
        candidates: Vec<Candidate>,
        n_trustees: u32,
        threshold: u32,
        aggregate_ceiling: u64,
    ) -> Self {
        Election {
            id,
            title: title.into(),
            status: ElectionStatus::Draft,
            voting_mode,
            start_time,
            end_time,
            candidates,
            n_trustees,
            threshold,
            public_key: None,
            merkle_root: None,
            trustee_commitments: Vec::new(),
            aggregate_ceiling,
        }
    }

    /// True while ballots are accepted: `active` and inside the window.
    pub fn is_open_for_votes(&self, now: Timestamp) -> bool {
        self.status == ElectionStatus::Active && self.start_time <= now && now < self.end_time
    }

    /// The current nullifier period key.
    pub fn voting_period(&self, now: Timestamp) -> Option<u64> {
        self.voting_mode.period(self.start_time, now)
    }

    /// Checks the guard for a transition without applying it. `force` lets an
    /// administrator close an election before its scheduled end.
    pub fn ensure_transition(
        &self,
        to: ElectionStatus,
        now: Timestamp,
        force: bool,
    ) -> EngineResult<()> {
        use ElectionStatus::*;

        let guard_ok = match (self.status, to) {
            (Draft, Pending) => {
                self.candidates.len() >= 2 && now < self.start_time && self.start_time < self.end_time
            }
            (Pending, Active) => {
                self.public_key.is_some()
                    && self.merkle_root.is_some()
                    && self.trustee_commitments.len() == self.n_trustees as usize
                    && now >= self.start_time
            }
            (Active, Closed) => force || now >= self.end_time,
            (Closed, Tallying) => true,
            (Tallying, Completed) => true,
            (Draft, Cancelled) | (Pending, Cancelled) | (Active, Cancelled) => true,
            _ => {
                return Err(EngineError::InvalidStatus {
                    status: self.status,
                });
            }
        };

        if guard_ok {
            Ok(())
        } else {
            Err(EngineError::InvalidStatus {
                status: self.status,
            })
        }
    }

    /// Applies a guarded transition, leaving the record unchanged on
    /// rejection.
    pub fn apply_transition(
        &mut self,
        to: ElectionStatus,
        now: Timestamp,
        force: bool,
    ) -> EngineResult<()> {
        self.ensure_transition(to, now, force)?;
        self.status = to;
        Ok(())
    }
}
