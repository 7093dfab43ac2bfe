#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! The CGS encryption scheme: exponential ElGamal over the deployment group.
//!
//! A plaintext `m` is encrypted as `(g^r, h^r * g^m)`, so the component-wise
//! product of two ciphertexts encrypts the sum of their plaintexts. Plaintexts
//! are recovered by a bounded discrete logarithm, which is what limits `m` to
//! small values (per-candidate tallies bounded by the electorate).

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use util::{
    algebra::{FieldElement, Group, GroupElement},
    algebra_utils::{DiscreteLog, to_be_bytes_left_pad},
    csprng::Csprng,
};

use crate::{
    errors::EngineError,
    hash::{HValue, h},
    parameters::GroupParameters,
};

/// Upper bound accepted for a single encryption. Aggregates may grow beyond
/// this up to the per-election discrete-log ceiling.
pub const MAX_PLAINTEXT: u64 = 1 << 20;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum CgsError {
    #[error("plaintext {m} exceeds the maximum of {max}")]
    PlaintextOutOfRange { m: u64, max: u64 },

    #[error("ciphertext components are not group members")]
    InvalidCiphertext,

    #[error("plaintext not found within the discrete-log ceiling")]
    DlogOutOfRange,
}

impl From<CgsError> for EngineError {
    fn from(e: CgsError) -> Self {
        match e {
            CgsError::PlaintextOutOfRange { .. } | CgsError::InvalidCiphertext => {
                EngineError::MalformedCiphertext
            }
            CgsError::DlogOutOfRange => EngineError::DlogOutOfRange,
        }
    }
}

/// The election public key `h = g^x`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    h: GroupElement,
}

impl PublicKey {
    pub fn from_h(h: GroupElement) -> Self {
        PublicKey { h }
    }

    pub fn h(&self) -> &GroupElement {
        &self.h
    }

    /// Membership check for untrusted key material.
    pub fn is_valid(&self, params: &GroupParameters) -> bool {
        self.h.is_valid(params.group())
    }

    /// The canonical encoding `p ‖ q ‖ g ‖ h`, each component left-padded to
    /// the fixed integer width.
    pub fn canonical_bytes(&self, params: &GroupParameters) -> Vec<u8> {
        let len = params.p_len_bytes();
        let group = params.group();
        let mut v = Vec::with_capacity(4 * len);
        v.extend_from_slice(&to_be_bytes_left_pad(group.modulus(), len));
        v.extend_from_slice(&to_be_bytes_left_pad(group.order(), len));
        v.extend_from_slice(&group.generator().to_be_bytes_left_pad(len));
        v.extend_from_slice(&self.h.to_be_bytes_left_pad(len));
        v
    }
}

/// The election secret key `x`. In production this value exists only as
/// threshold shares; a reconstructed copy is zeroized on drop.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretKey {
    x: FieldElement,
}

impl SecretKey {
    pub fn new(x: FieldElement) -> Self {
        SecretKey { x }
    }

    pub fn x(&self) -> &FieldElement {
        &self.x
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl Zeroize for SecretKey {
    fn zeroize(&mut self) {
        self.x.zeroize();
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for SecretKey {}

/// An exponential-ElGamal ciphertext `(c1, c2) = (g^r, h^r * g^m)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ciphertext {
    pub c1: GroupElement,
    pub c2: GroupElement,
}

impl Ciphertext {
    /// The neutral element of homomorphic addition, an encryption of zero
    /// with nonce zero.
    pub fn neutral() -> Self {
        Ciphertext {
            c1: Group::one(),
            c2: Group::one(),
        }
    }

    /// Homomorphic addition: the component-wise product encrypts the sum of
    /// the plaintexts.
    pub fn add(&self, other: &Ciphertext, params: &GroupParameters) -> Ciphertext {
        let group = params.group();
        Ciphertext {
            c1: self.c1.mul(&other.c1, group),
            c2: self.c2.mul(&other.c2, group),
        }
    }

    /// Membership check for untrusted ciphertexts.
    pub fn is_valid(&self, params: &GroupParameters) -> bool {
        self.c1.is_valid(params.group()) && self.c2.is_valid(params.group())
    }

    /// The canonical encoding `c1 ‖ c2`.
    pub fn canonical_bytes(&self, params: &GroupParameters) -> Vec<u8> {
        let len = params.p_len_bytes();
        let mut v = Vec::with_capacity(2 * len);
        v.extend_from_slice(&self.c1.to_be_bytes_left_pad(len));
        v.extend_from_slice(&self.c2.to_be_bytes_left_pad(len));
        v
    }

    /// SHA-256 of the canonical encoding.
    pub fn hash(&self, params: &GroupParameters) -> HValue {
        h(&self.canonical_bytes(params))
    }
}

/// Generates a fresh keypair: `x` uniform in `[2, q - 1]`, `h = g^x`.
pub fn keygen(params: &GroupParameters, csprng: &mut Csprng) -> (PublicKey, SecretKey) {
    let x = params.field().random_exponent(csprng);
    let h = params.group().g_exp(&x);
    (PublicKey::from_h(h), SecretKey::new(x))
}

/// Encrypts `m` under `pk` with the given nonce. Deterministic; used by
/// provers that need the nonce afterwards and by tests with fixed randomness.
pub fn encrypt_with_nonce(
    params: &GroupParameters,
    pk: &PublicKey,
    m: u64,
    nonce: &FieldElement,
) -> Result<Ciphertext, CgsError> {
    if m > MAX_PLAINTEXT {
        return Err(CgsError::PlaintextOutOfRange {
            m,
            max: MAX_PLAINTEXT,
        });
    }

    let group = params.group();
    let field = params.field();

    let c1 = group.g_exp(nonce);
    let h_r = pk.h.exp(nonce, group);
    let g_m = group.g_exp(&FieldElement::from(m, field));
    let c2 = h_r.mul(&g_m, group);

    Ok(Ciphertext { c1, c2 })
}

/// Encrypts `m` under `pk` with a fresh nonce uniform in `[2, q - 1]`.
/// Returns the nonce so the caller can produce validity proofs.
pub fn encrypt(
    params: &GroupParameters,
    pk: &PublicKey,
    m: u64,
    csprng: &mut Csprng,
) -> Result<(Ciphertext, FieldElement), CgsError> {
    let nonce = params.field().random_exponent(csprng);
    let ct = encrypt_with_nonce(params, pk, m, &nonce)?;
    Ok((ct, nonce))
}

/// Decrypts a ciphertext with the full secret key: `g^m = c2 * (c1^x)^{-1}`,
/// then a bounded discrete logarithm over the provided table.
pub fn decrypt(
    params: &GroupParameters,
    ct: &Ciphertext,
    sk: &SecretKey,
    dlog: &DiscreteLog,
) -> Result<u64, CgsError> {
    let group = params.group();

    let u = ct.c1.exp(&sk.x, group);
    let u_inv = u.inv(group).ok_or(CgsError::InvalidCiphertext)?;
    let g_m = ct.c2.mul(&u_inv, group);

    dlog.find_group_elem(&g_m).ok_or(CgsError::DlogOutOfRange)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::parameters::STANDARD_PARAMETERS;
    use util::algebra_utils::DiscreteLog;

    #[test]
    fn encrypt_decrypt_round_trip() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"cgs round trip");
        let (pk, sk) = keygen(&params, &mut csprng);
        let dlog = DiscreteLog::from_group(params.group(), 1_000).unwrap();

        for m in [0u64, 1, 2, 17, 999] {
            let (ct, _nonce) = encrypt(&params, &pk, m, &mut csprng).unwrap();
            assert!(ct.is_valid(&params));
            assert_eq!(decrypt(&params, &ct, &sk, &dlog).unwrap(), m);
        }
    }

    #[test]
    fn encryption_is_deterministic_under_a_fixed_nonce() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"cgs fixed nonce");
        let (pk, _) = keygen(&params, &mut csprng);

        let nonce = params.field().random_exponent(&mut csprng);
        let a = encrypt_with_nonce(&params, &pk, 1, &nonce).unwrap();
        let b = encrypt_with_nonce(&params, &pk, 1, &nonce).unwrap();
        assert_eq!(a, b);

        let other = encrypt_with_nonce(&params, &pk, 0, &nonce).unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn homomorphic_addition() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"cgs homomorphism");
        let (pk, sk) = keygen(&params, &mut csprng);
        let dlog = DiscreteLog::from_group(params.group(), 1_000).unwrap();

        let mut sum_ct = Ciphertext::neutral();
        let mut sum = 0u64;
        for m in [3u64, 5, 11, 0, 42] {
            let (ct, _) = encrypt(&params, &pk, m, &mut csprng).unwrap();
            sum_ct = sum_ct.add(&ct, &params);
            sum += m;
        }
        assert_eq!(decrypt(&params, &sum_ct, &sk, &dlog).unwrap(), sum);
    }

    #[test]
    fn plaintext_bound_enforced() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"cgs bound");
        let (pk, _sk) = keygen(&params, &mut csprng);

        let err = encrypt(&params, &pk, MAX_PLAINTEXT + 1, &mut csprng).unwrap_err();
        assert!(matches!(err, CgsError::PlaintextOutOfRange { .. }));
    }

    #[test]
    fn dlog_ceiling_is_fatal() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"cgs dlog ceiling");
        let (pk, sk) = keygen(&params, &mut csprng);
        let dlog = DiscreteLog::from_group(params.group(), 10).unwrap();

        let (ct, _) = encrypt(&params, &pk, 200, &mut csprng).unwrap();
        assert_eq!(
            decrypt(&params, &ct, &sk, &dlog).unwrap_err(),
            CgsError::DlogOutOfRange
        );
    }

    #[test]
    fn ciphertext_serde_round_trip() {
        let params = STANDARD_PARAMETERS.clone();
        let mut csprng = Csprng::new(b"cgs serde");
        let (pk, _) = keygen(&params, &mut csprng);

        let (ct, _) = encrypt(&params, &pk, 1, &mut csprng).unwrap();
        let json = serde_json::to_string(&ct).unwrap();
        assert_eq!(serde_json::from_str::<Ciphertext>(&json).unwrap(), ct);

        let pk_json = serde_json::to_string(&pk).unwrap();
        assert_eq!(serde_json::from_str::<PublicKey>(&pk_json).unwrap(), pk);
    }
}
