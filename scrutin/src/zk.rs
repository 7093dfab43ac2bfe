#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Non-interactive zero-knowledge proofs, made non-interactive by the
//! Fiat-Shamir transform over SHA-256.
//!
//! [`BallotProof`] shows that a ciphertext encrypts a bit without revealing
//! which one (disjunctive Chaum-Pedersen). [`DecryptionProof`] shows that a
//! trustee's partial decryption was computed with the share behind its
//! published commitment (Chaum-Pedersen equality of discrete logs).

use serde::{Deserialize, Serialize};

use util::{
    algebra::{FieldElement, GroupElement},
    csprng::Csprng,
};

use crate::{
    cgs::{Ciphertext, PublicKey},
    hash::h,
    parameters::GroupParameters,
    threshold::{KeyShare, PartialDecryption},
};

// Hash domain separators.
const DOMAIN_BALLOT: u8 = 0x21;
const DOMAIN_DECRYPTION: u8 = 0x31;

/// Disjunctive Chaum-Pedersen proof that a ciphertext encrypts 0 or 1.
///
/// The transcript is `(e_0, e_1, z_0, z_1)`; the verifier reconstructs the
/// four commitments and checks `e_0 + e_1 == c` for the recomputed challenge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BallotProof {
    pub e0: FieldElement,
    pub e1: FieldElement,
    pub z0: FieldElement,
    pub z1: FieldElement,
}

impl BallotProof {
    /// `c = H(pk ‖ c1 ‖ c2 ‖ A_0 ‖ B_0 ‖ A_1 ‖ B_1) mod q`
    fn challenge(
        params: &GroupParameters,
        pk: &PublicKey,
        ct: &Ciphertext,
        commitments: [&GroupElement; 4],
    ) -> FieldElement {
        let len = params.p_len_bytes();

        let mut v = vec![DOMAIN_BALLOT];
        v.extend_from_slice(&pk.canonical_bytes(params));
        v.extend_from_slice(&ct.c1.to_be_bytes_left_pad(len));
        v.extend_from_slice(&ct.c2.to_be_bytes_left_pad(len));
        for commitment in commitments {
            v.extend_from_slice(&commitment.to_be_bytes_left_pad(len));
        }

        FieldElement::from_bytes_be(h(&v).as_bytes(), params.field())
    }

    /// Proves that `ct` encrypts `bit`, given the encryption nonce `r`.
    ///
    /// The true branch gets an honest commitment `(g^w, h^w)`; the other
    /// branch is simulated from random `(e, z)` before the joint challenge is
    /// derived.
    pub fn prove(
        params: &GroupParameters,
        pk: &PublicKey,
        ct: &Ciphertext,
        bit: bool,
        nonce: &FieldElement,
        csprng: &mut Csprng,
    ) -> Option<BallotProof> {
        let field = params.field();
        let group = params.group();

        let w = field.random_field_elem(csprng);
        let e_sim = field.random_field_elem(csprng);
        let z_sim = field.random_field_elem(csprng);

        let a_true = group.g_exp(&w);
        let b_true = pk.h().exp(&w, group);

        let g_inv = group.generator().inv(group)?;

        // Simulated commitments for the branch that is not being proven:
        // A = g^z * c1^e, B = h^z * (c2 / g^{1-b})^e.
        let a_sim = group
            .g_exp(&z_sim)
            .mul(&ct.c1.exp(&e_sim, group), group);
        let b_sim_base = if bit {
            // false branch is m = 0, statement uses c2 directly
            ct.c2.clone()
        } else {
            // false branch is m = 1, statement uses c2 / g
            ct.c2.mul(&g_inv, group)
        };
        let b_sim = pk
            .h()
            .exp(&z_sim, group)
            .mul(&b_sim_base.exp(&e_sim, group), group);

        let (a0, b0, a1, b1) = if bit {
            (&a_sim, &b_sim, &a_true, &b_true)
        } else {
            (&a_true, &b_true, &a_sim, &b_sim)
        };
        let c = Self::challenge(params, pk, ct, [a0, b0, a1, b1]);

        let e_true = c.sub(&e_sim, field);
        let z_true = w.sub(&e_true.mul(nonce, field), field);

        Some(if bit {
            BallotProof {
                e0: e_sim,
                e1: e_true,
                z0: z_sim,
                z1: z_true,
            }
        } else {
            BallotProof {
                e0: e_true,
                e1: e_sim,
                z0: z_true,
                z1: z_sim,
            }
        })
    }

    /// Verifies the proof against a ciphertext and public key.
    pub fn verify(&self, params: &GroupParameters, pk: &PublicKey, ct: &Ciphertext) -> bool {
        let field = params.field();
        let group = params.group();

        if !ct.is_valid(params) {
            return false;
        }
        for e in [&self.e0, &self.e1, &self.z0, &self.z1] {
            if !e.is_valid(field) {
                return false;
            }
        }

        let Some(g_inv) = group.generator().inv(group) else {
            return false;
        };

        let a0 = group
            .g_exp(&self.z0)
            .mul(&ct.c1.exp(&self.e0, group), group);
        let b0 = pk
            .h()
            .exp(&self.z0, group)
            .mul(&ct.c2.exp(&self.e0, group), group);
        let a1 = group
            .g_exp(&self.z1)
            .mul(&ct.c1.exp(&self.e1, group), group);
        let c2_over_g = ct.c2.mul(&g_inv, group);
        let b1 = pk
            .h()
            .exp(&self.z1, group)
            .mul(&c2_over_g.exp(&self.e1, group), group);

        let c = Self::challenge(params, pk, ct, [&a0, &b0, &a1, &b1]);
        self.e0.add(&self.e1, field) == c
    }
}

/// Chaum-Pedersen proof that a partial decryption `d_i = c1^{s_i}` matches
/// the trustee's published commitment `V_i = g^{s_i}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionProof {
    pub challenge: FieldElement,
    pub response: FieldElement,
}

impl DecryptionProof {
    /// `c = H(V_i ‖ d_i ‖ g^w ‖ c1^w) mod q`
    fn derive_challenge(
        params: &GroupParameters,
        commitment_v: &GroupElement,
        partial_d: &GroupElement,
        a: &GroupElement,
        b: &GroupElement,
    ) -> FieldElement {
        let len = params.p_len_bytes();

        let mut v = vec![DOMAIN_DECRYPTION];
        v.extend_from_slice(&commitment_v.to_be_bytes_left_pad(len));
        v.extend_from_slice(&partial_d.to_be_bytes_left_pad(len));
        v.extend_from_slice(&a.to_be_bytes_left_pad(len));
        v.extend_from_slice(&b.to_be_bytes_left_pad(len));

        FieldElement::from_bytes_be(h(&v).as_bytes(), params.field())
    }

    /// Proves correctness of `partial` for `ct` under the trustee's share.
    pub fn prove(
        params: &GroupParameters,
        share: &KeyShare,
        ct: &Ciphertext,
        partial: &PartialDecryption,
        csprng: &mut Csprng,
    ) -> DecryptionProof {
        let field = params.field();
        let group = params.group();

        let w = field.random_field_elem(csprng);
        let a = group.g_exp(&w);
        let b = ct.c1.exp(&w, group);

        let challenge =
            Self::derive_challenge(params, share.commitment(), &partial.d, &a, &b);
        let response = w.sub(&challenge.mul(share.secret(), field), field);

        DecryptionProof {
            challenge,
            response,
        }
    }

    /// Verifies the proof against the published commitment `V_i`, the
    /// ciphertext and the claimed partial decryption.
    pub fn verify(
        &self,
        params: &GroupParameters,
        commitment_v: &GroupElement,
        ct: &Ciphertext,
        partial: &PartialDecryption,
    ) -> bool {
        let field = params.field();
        let group = params.group();

        if !commitment_v.is_valid(group) || !partial.d.is_valid(group) {
            return false;
        }
        if !self.challenge.is_valid(field) || !self.response.is_valid(field) {
            return false;
        }

        // a = g^z * V^c, b = c1^z * d^c
        let a = group
            .g_exp(&self.response)
            .mul(&commitment_v.exp(&self.challenge, group), group);
        let b = ct
            .c1
            .exp(&self.response, group)
            .mul(&partial.d.exp(&self.challenge, group), group);

        self.challenge == Self::derive_challenge(params, commitment_v, &partial.d, &a, &b)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::cgs::{encrypt, keygen};
    use crate::parameters::STANDARD_PARAMETERS;
    use crate::threshold::{partial_decrypt, split};

    #[test]
    fn honest_ballot_proofs_verify() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"zk honest ballots");
        let (pk, _) = keygen(&params, &mut csprng);

        for bit in [false, true] {
            let (ct, nonce) = encrypt(&params, &pk, bit as u64, &mut csprng).unwrap();
            let proof =
                BallotProof::prove(&params, &pk, &ct, bit, &nonce, &mut csprng).unwrap();
            assert!(proof.verify(&params, &pk, &ct));
        }
    }

    #[test]
    fn proof_for_wrong_ciphertext_fails() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"zk wrong ciphertext");
        let (pk, _) = keygen(&params, &mut csprng);

        let (ct, nonce) = encrypt(&params, &pk, 1, &mut csprng).unwrap();
        let proof = BallotProof::prove(&params, &pk, &ct, true, &nonce, &mut csprng).unwrap();

        let (other_ct, _) = encrypt(&params, &pk, 1, &mut csprng).unwrap();
        assert!(!proof.verify(&params, &pk, &other_ct));
    }

    #[test]
    fn perturbed_ballot_proof_fails() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"zk perturbed");
        let (pk, _) = keygen(&params, &mut csprng);

        let (ct, nonce) = encrypt(&params, &pk, 0, &mut csprng).unwrap();
        let proof = BallotProof::prove(&params, &pk, &ct, false, &nonce, &mut csprng).unwrap();
        assert!(proof.verify(&params, &pk, &ct));

        let one = util::algebra::ScalarField::one();
        let field = params.field();
        for victim in 0..4 {
            let mut bad = proof.clone();
            match victim {
                0 => bad.e0 = bad.e0.add(&one, field),
                1 => bad.e1 = bad.e1.add(&one, field),
                2 => bad.z0 = bad.z0.add(&one, field),
                _ => bad.z1 = bad.z1.add(&one, field),
            }
            assert!(!bad.verify(&params, &pk, &ct), "perturbation {victim}");
        }
    }

    #[test]
    fn a_bit_of_two_is_not_provable() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"zk non-bit");
        let (pk, _) = keygen(&params, &mut csprng);

        // Encrypt 2 and try to pass it off as a bit. Whatever branch the
        // prover claims, the verifier must refuse.
        let (ct, nonce) = encrypt(&params, &pk, 2, &mut csprng).unwrap();
        for bit in [false, true] {
            let proof =
                BallotProof::prove(&params, &pk, &ct, bit, &nonce, &mut csprng).unwrap();
            assert!(!proof.verify(&params, &pk, &ct));
        }
    }

    #[test]
    fn decryption_proofs_verify_and_bind() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"zk decryption");
        let (pk, sk) = keygen(&params, &mut csprng);
        let shares = split(&params, &sk, 2, 3, &mut csprng).unwrap();

        let (ct, _) = encrypt(&params, &pk, 1, &mut csprng).unwrap();
        let partial = partial_decrypt(&params, &ct, &shares[0]);
        let proof = DecryptionProof::prove(&params, &shares[0], &ct, &partial, &mut csprng);

        assert!(proof.verify(&params, shares[0].commitment(), &ct, &partial));

        // Wrong commitment, wrong partial, tampered transcript all fail.
        assert!(!proof.verify(&params, shares[1].commitment(), &ct, &partial));

        let other_partial = partial_decrypt(&params, &ct, &shares[1]);
        assert!(!proof.verify(&params, shares[0].commitment(), &ct, &other_partial));

        let mut bad = proof.clone();
        bad.response = bad
            .response
            .add(&util::algebra::ScalarField::one(), params.field());
        assert!(!bad.verify(&params, shares[0].commitment(), &ct, &partial));
    }
}
