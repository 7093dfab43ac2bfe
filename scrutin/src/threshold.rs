#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! (k, n) threshold sharing of the election secret key.
//!
//! The dealer samples a degree-(k-1) polynomial `f` with `f(0) = x` and hands
//! trustee `i` the share `s_i = f(i)` together with the public commitment
//! `V_i = g^{s_i}`. Any k shares recover `x` by Lagrange interpolation at
//! zero; ciphertexts can equally be decrypted without ever reconstructing `x`
//! by combining partial decryptions `c1^{s_i}` in the exponent.
//!
//! The polynomial coefficients are zeroized as soon as the shares exist; only
//! shares persist.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use util::{
    algebra::{FieldElement, GroupElement, ScalarField},
    algebra_utils::{DiscreteLog, field_lagrange_at_zero, group_lagrange_at_zero},
    csprng::Csprng,
};

use crate::{
    cgs::{Ciphertext, SecretKey},
    errors::{EngineError, EngineResult},
    parameters::GroupParameters,
};

/// One-based trustee index, `1 ..= n`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TrusteeIndex(u32);

impl TrusteeIndex {
    /// Accepts one-based values only.
    pub fn new(ix: u32) -> Option<Self> {
        (ix >= 1).then_some(TrusteeIndex(ix))
    }

    pub fn get_one_based_u32(&self) -> u32 {
        self.0
    }

    pub fn to_field_elem(&self, field: &ScalarField) -> FieldElement {
        FieldElement::from(self.0, field)
    }
}

impl std::fmt::Display for TrusteeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("invalid threshold parameters: k={k}, n={n}")]
    InvalidParameters { k: u32, n: u32 },

    #[error("only {available} shares given, but at least {required} required")]
    NotEnoughShares { available: usize, required: usize },

    #[error("trustee {0} is represented more than once")]
    DuplicateTrustee(TrusteeIndex),

    #[error("share of trustee {0} does not match its public commitment")]
    CommitmentMismatch(TrusteeIndex),

    #[error("could not compute the polynomial interpolation")]
    InterpolationFailure,
}

impl From<ThresholdError> for EngineError {
    fn from(e: ThresholdError) -> Self {
        match e {
            ThresholdError::NotEnoughShares {
                available,
                required,
            } => EngineError::InsufficientTrustees {
                available,
                required,
            },
            ThresholdError::DuplicateTrustee(_) | ThresholdError::CommitmentMismatch(_) => {
                EngineError::InvalidKeyShare
            }
            ThresholdError::InvalidParameters { .. } | ThresholdError::InterpolationFailure => {
                EngineError::StateMachineInvariantViolated(e.to_string())
            }
        }
    }
}

/// Trustee `i`'s share `(i, s_i, V_i)`. The secret evaluation `s_i` is
/// zeroized on drop; the commitment `V_i` is published.
#[derive(Clone, Serialize, Deserialize)]
pub struct KeyShare {
    index: TrusteeIndex,
    s: FieldElement,
    v: GroupElement,
}

impl KeyShare {
    pub fn index(&self) -> TrusteeIndex {
        self.index
    }

    pub fn secret(&self) -> &FieldElement {
        &self.s
    }

    pub fn commitment(&self) -> &GroupElement {
        &self.v
    }

    /// Accepts the share iff `g^{s_i} == V_i`.
    pub fn verify(&self, params: &GroupParameters) -> bool {
        params.group().g_exp(&self.s) == self.v
    }
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyShare {{ index: {}, .. }}", self.index)
    }
}

impl Zeroize for KeyShare {
    fn zeroize(&mut self) {
        self.s.zeroize();
    }
}

impl Drop for KeyShare {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl ZeroizeOnDrop for KeyShare {}

/// Splits `x` into `n` shares with threshold `k`.
///
/// Coefficients `a_1 .. a_{k-1}` are sampled uniformly from `[0, q)`; the
/// constant term is `x`. Shares are the Horner evaluations `f(1) .. f(n)`.
pub fn split(
    params: &GroupParameters,
    sk: &SecretKey,
    k: u32,
    n: u32,
    csprng: &mut Csprng,
) -> Result<Vec<KeyShare>, ThresholdError> {
    if k < 1 || k > n {
        return Err(ThresholdError::InvalidParameters { k, n });
    }

    let field = params.field();
    let group = params.group();

    let mut coefficients = Vec::with_capacity(k as usize);
    coefficients.push(sk.x().clone());
    for _ in 1..k {
        coefficients.push(field.random_field_elem(csprng));
    }

    let shares = (1..=n)
        .filter_map(TrusteeIndex::new)
        .map(|index| {
            let t = index.to_field_elem(field);
            let mut s = ScalarField::zero();
            for coeff in coefficients.iter().rev() {
                s = s.mul(&t, field).add(coeff, field);
            }
            let v = group.g_exp(&s);
            KeyShare { index, s, v }
        })
        .collect();

    for coeff in coefficients.iter_mut() {
        coeff.zeroize();
    }

    Ok(shares)
}

fn check_quorum<T>(
    items: &[T],
    k: u32,
    index_of: impl Fn(&T) -> TrusteeIndex,
) -> Result<(), ThresholdError> {
    if items.len() < k as usize {
        return Err(ThresholdError::NotEnoughShares {
            available: items.len(),
            required: k as usize,
        });
    }
    let mut seen = Vec::with_capacity(items.len());
    for item in items {
        let ix = index_of(item);
        if seen.contains(&ix) {
            return Err(ThresholdError::DuplicateTrustee(ix));
        }
        seen.push(ix);
    }
    Ok(())
}

/// Recovers the secret key from at least `k` verified shares.
///
/// Every share is checked against its public commitment before it enters the
/// interpolation.
pub fn combine(
    params: &GroupParameters,
    shares: &[KeyShare],
    k: u32,
) -> Result<SecretKey, ThresholdError> {
    check_quorum(shares, k, |s| s.index)?;

    for share in shares {
        if !share.verify(params) {
            return Err(ThresholdError::CommitmentMismatch(share.index));
        }
    }

    let field = params.field();
    let xs: Vec<_> = shares.iter().map(|s| s.index.to_field_elem(field)).collect();
    let ys: Vec<_> = shares.iter().map(|s| s.s.clone()).collect();

    let x = field_lagrange_at_zero(&xs, &ys, field)
        .ok_or(ThresholdError::InterpolationFailure)?;
    Ok(SecretKey::new(x))
}

/// A trustee's partial decryption `d_i = c1^{s_i}` of one ciphertext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialDecryption {
    pub index: TrusteeIndex,
    pub d: GroupElement,
}

/// Computes trustee `i`'s partial decryption of a ciphertext.
pub fn partial_decrypt(
    params: &GroupParameters,
    ct: &Ciphertext,
    share: &KeyShare,
) -> PartialDecryption {
    PartialDecryption {
        index: share.index,
        d: ct.c1.exp(&share.s, params.group()),
    }
}

/// Combines at least `k` partial decryptions into `D = c1^x` by Lagrange
/// interpolation in the exponent.
pub fn combine_partial_decryptions(
    params: &GroupParameters,
    partials: &[PartialDecryption],
    k: u32,
) -> Result<GroupElement, ThresholdError> {
    check_quorum(partials, k, |p| p.index)?;

    let field = params.field();
    let xs: Vec<_> = partials
        .iter()
        .map(|p| p.index.to_field_elem(field))
        .collect();
    let ys: Vec<_> = partials.iter().map(|p| p.d.clone()).collect();

    group_lagrange_at_zero(&xs, &ys, field, params.group())
        .ok_or(ThresholdError::InterpolationFailure)
}

/// Decrypts a ciphertext from partial decryptions without reconstructing the
/// secret key: `g^m = c2 * D^{-1}`, then a bounded discrete logarithm.
pub fn threshold_combine_decrypt(
    params: &GroupParameters,
    ct: &Ciphertext,
    partials: &[PartialDecryption],
    k: u32,
    dlog: &DiscreteLog,
) -> EngineResult<u64> {
    let group = params.group();

    let d = combine_partial_decryptions(params, partials, k)?;
    let d_inv = d.inv(group).ok_or(EngineError::MalformedCiphertext)?;
    let g_m = ct.c2.mul(&d_inv, group);

    dlog.find_group_elem(&g_m).ok_or(EngineError::DlogOutOfRange)
}
