#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Encrypted ballots: one bit ciphertext and one validity proof per
//! candidate.

use serde::{Deserialize, Serialize};

use util::csprng::Csprng;

use crate::{
    cgs::{self, Ciphertext, PublicKey},
    errors::{EngineError, EngineResult},
    hash::{HValue, h},
    parameters::GroupParameters,
    zk::BallotProof,
};

/// A voter's ballot for `L` candidates: the `L`-tuple of bit encryptions with
/// their disjunctive Chaum-Pedersen proofs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBallot {
    pub ciphertexts: Vec<Ciphertext>,
    pub proofs: Vec<BallotProof>,
}

impl EncryptedBallot {
    /// Encrypts a single-choice ballot: bit 1 at `choice`, 0 elsewhere.
    pub fn encrypt(
        params: &GroupParameters,
        pk: &PublicKey,
        choice: usize,
        num_candidates: usize,
        csprng: &mut Csprng,
    ) -> EngineResult<EncryptedBallot> {
        if num_candidates < 1 || choice >= num_candidates {
            return Err(EngineError::MalformedCiphertext);
        }

        let mut ciphertexts = Vec::with_capacity(num_candidates);
        let mut proofs = Vec::with_capacity(num_candidates);
        for candidate in 0..num_candidates {
            let bit = candidate == choice;
            let (ct, nonce) =
                cgs::encrypt(params, pk, bit as u64, csprng).map_err(EngineError::from)?;
            let proof = BallotProof::prove(params, pk, &ct, bit, &nonce, csprng)
                .ok_or(EngineError::MalformedProof)?;
            ciphertexts.push(ct);
            proofs.push(proof);
        }

        Ok(EncryptedBallot {
            ciphertexts,
            proofs,
        })
    }

    /// Number of candidate slots.
    pub fn len(&self) -> usize {
        self.ciphertexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertexts.is_empty()
    }

    /// Structural check: one proof per ciphertext, at least one slot.
    pub fn is_well_formed(&self) -> bool {
        !self.ciphertexts.is_empty() && self.ciphertexts.len() == self.proofs.len()
    }

    /// Verifies every per-candidate validity proof.
    pub fn verify(&self, params: &GroupParameters, pk: &PublicKey) -> bool {
        self.is_well_formed()
            && self
                .ciphertexts
                .iter()
                .zip(&self.proofs)
                .all(|(ct, proof)| proof.verify(params, pk, ct))
    }

    /// The canonical encoding: the concatenated `c1 ‖ c2` of every slot.
    pub fn canonical_bytes(&self, params: &GroupParameters) -> Vec<u8> {
        let mut v = Vec::with_capacity(self.ciphertexts.len() * 2 * params.p_len_bytes());
        for ct in &self.ciphertexts {
            v.extend_from_slice(&ct.canonical_bytes(params));
        }
        v
    }

    /// SHA-256 of the canonical encoding, the `ciphertext_hash` that receipts
    /// and ledger lookups key on.
    pub fn hash(&self, params: &GroupParameters) -> HValue {
        h(&self.canonical_bytes(params))
    }
}
