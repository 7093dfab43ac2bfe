#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Eligibility side of a submission: voter commitments, nullifiers and the
//! verifier for client-supplied eligibility proofs.
//!
//! The proof demonstrates knowledge of a secret `s_v` such that
//! `H(id_v ‖ s_v)` hashes up a published Merkle path to the election's root
//! and that the nullifier equals `H(s_v ‖ election_id)`. The engine only
//! verifies these proofs; it never produces them.

use serde::{Deserialize, Serialize};

use crate::{
    election::ElectionId,
    hash::{HValue, h, put_str, put_u64},
};

/// One-way voter-and-election-specific tag. Its uniqueness within an
/// election enforces one ballot per voter without revealing identity.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nullifier(HValue);

impl Nullifier {
    /// `N = H(s_v ‖ election_id)`, extended with the period index for
    /// periodic-reset elections.
    pub fn derive(voter_secret: &[u8], election_id: &ElectionId, period: Option<u64>) -> Self {
        let mut v = Vec::with_capacity(voter_secret.len() + 32);
        v.extend_from_slice(&(voter_secret.len() as u32).to_be_bytes());
        v.extend_from_slice(voter_secret);
        put_str(&mut v, election_id.as_str());
        if let Some(period) = period {
            put_u64(&mut v, period);
        }
        Nullifier(h(&v))
    }

    pub fn as_hvalue(&self) -> &HValue {
        &self.0
    }

    /// Lowercase hex, the wire form.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        HValue::from_hex(s).map(Nullifier)
    }
}

impl std::fmt::Display for Nullifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Nullifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nullifier({})", self.to_hex())
    }
}

/// `C_v = H(id_v ‖ s_v)`, the leaf a voter registers in the eligibility
/// tree. The secret stays with the voter.
pub fn voter_commitment(voter_id: &str, voter_secret: &[u8]) -> HValue {
    let mut v = Vec::with_capacity(voter_id.len() + voter_secret.len() + 8);
    put_str(&mut v, voter_id);
    v.extend_from_slice(&(voter_secret.len() as u32).to_be_bytes());
    v.extend_from_slice(voter_secret);
    h(&v)
}

/// Groth16-shaped eligibility proof: a G1 point `a`, a G2 point `b`, a G1
/// point `c`, coordinates as hex strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityProof {
    pub a: [String; 2],
    pub b: [[String; 2]; 2],
    pub c: [String; 2],
}

/// Verifier for client-supplied eligibility proofs against the public inputs
/// `(merkle_root, election_id, nullifier)`.
///
/// Implementations range from the structural reference check to a full
/// pairing-based verifier; the engine treats them interchangeably.
pub trait EligibilityVerifier: Send + Sync {
    fn verify(
        &self,
        proof: &EligibilityProof,
        merkle_root: &HValue,
        election_id: &ElectionId,
        nullifier: &Nullifier,
    ) -> bool;
}

/// Reference verifier accepting structurally well-formed proofs: every
/// coordinate must be non-empty hex of at most 64 digits and the points must
/// not be all-zero.
pub struct StructuralVerifier;

impl StructuralVerifier {
    fn coordinate_ok(s: &str) -> bool {
        !s.is_empty() && s.len() <= 64 && s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    fn point_nonzero<'a>(coords: impl IntoIterator<Item = &'a String>) -> bool {
        coords
            .into_iter()
            .any(|c| c.bytes().any(|b| b != b'0'))
    }
}

impl EligibilityVerifier for StructuralVerifier {
    fn verify(
        &self,
        proof: &EligibilityProof,
        _merkle_root: &HValue,
        _election_id: &ElectionId,
        _nullifier: &Nullifier,
    ) -> bool {
        let coords = proof
            .a
            .iter()
            .chain(proof.b.iter().flatten())
            .chain(proof.c.iter());
        for coord in coords.clone() {
            if !Self::coordinate_ok(coord) {
                return false;
            }
        }

        Self::point_nonzero(proof.a.iter())
            && Self::point_nonzero(proof.b.iter().flatten())
            && Self::point_nonzero(proof.c.iter())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn election(id: &str) -> ElectionId {
        ElectionId::new(id)
    }

    fn sample_proof() -> EligibilityProof {
        EligibilityProof {
            a: ["1a2b".into(), "3c4d".into()],
            b: [
                ["5e6f".into(), "7a8b".into()],
                ["9c0d".into(), "1e2f".into()],
            ],
            c: ["3a4b".into(), "5c6d".into()],
        }
    }

    #[test]
    fn nullifier_is_deterministic_and_separated() {
        let n1 = Nullifier::derive(b"secret", &election("e1"), None);
        let n2 = Nullifier::derive(b"secret", &election("e1"), None);
        assert_eq!(n1, n2);

        // Distinct elections, distinct secrets, distinct periods.
        assert_ne!(n1, Nullifier::derive(b"secret", &election("e2"), None));
        assert_ne!(n1, Nullifier::derive(b"secret2", &election("e1"), None));
        assert_ne!(n1, Nullifier::derive(b"secret", &election("e1"), Some(0)));
        assert_ne!(
            Nullifier::derive(b"secret", &election("e1"), Some(0)),
            Nullifier::derive(b"secret", &election("e1"), Some(1))
        );
    }

    #[test]
    fn nullifier_wire_form() {
        let n = Nullifier::derive(b"secret", &election("e1"), None);
        let hex = n.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()));
        assert_eq!(Nullifier::from_hex(&hex), Some(n));
    }

    #[test]
    fn commitments_bind_identity_and_secret() {
        let c = voter_commitment("alice", b"secret");
        assert_eq!(c, voter_commitment("alice", b"secret"));
        assert_ne!(c, voter_commitment("bob", b"secret"));
        assert_ne!(c, voter_commitment("alice", b"other"));
    }

    #[test]
    fn structural_verifier_accepts_well_formed_proofs() {
        let root = h(b"root");
        let n = Nullifier::derive(b"secret", &election("e1"), None);
        assert!(StructuralVerifier.verify(&sample_proof(), &root, &election("e1"), &n));
    }

    #[test]
    fn structural_verifier_rejects_bad_shapes() {
        let root = h(b"root");
        let n = Nullifier::derive(b"secret", &election("e1"), None);
        let e = election("e1");

        let mut empty_coord = sample_proof();
        empty_coord.a[0] = String::new();
        assert!(!StructuralVerifier.verify(&empty_coord, &root, &e, &n));

        let mut non_hex = sample_proof();
        non_hex.b[1][0] = "xyz".into();
        assert!(!StructuralVerifier.verify(&non_hex, &root, &e, &n));

        let mut oversized = sample_proof();
        oversized.c[1] = "f".repeat(65);
        assert!(!StructuralVerifier.verify(&oversized, &root, &e, &n));

        let mut zero_point = sample_proof();
        zero_point.a = ["0".into(), "00".into()];
        assert!(!StructuralVerifier.verify(&zero_point, &root, &e, &n));
    }
}
