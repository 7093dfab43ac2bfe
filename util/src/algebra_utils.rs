#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Utility functions for field and group elements: byte encodings, modular
//! inverses, bounded discrete logarithms, and Lagrange interpolation.

use std::{borrow::Borrow, collections::HashMap, iter::zip, mem};

use itertools::Itertools;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};

use crate::algebra::{FieldElement, Group, GroupElement, ScalarField};

/// Returns the number of bits required to represent the given number.
pub fn cnt_bits_repr<T: Borrow<BigUint>>(n: &T) -> usize {
    let n: &BigUint = n.borrow();
    if n.is_zero() { 1 } else { n.bits() as usize }
}

/// Encodes a `BigUint` big-endian as a left-padded byte string of length
/// `len`. Values wider than `len` bytes keep their full width.
pub fn to_be_bytes_left_pad<T: Borrow<BigUint>>(n: &T, len: usize) -> Vec<u8> {
    let n: &BigUint = n.borrow();

    let mut v = n.to_bytes_be();
    if v.len() < len {
        let left_pad = len - v.len();
        v.resize(len, 0);
        v.rotate_right(left_pad);
    }
    v
}

/// Computes the inverse of `a_u` modulo `m_u` via the extended Euclidean
/// algorithm. Returns `Some` iff `gcd(a_u, m_u) == 1`.
pub fn mod_inverse(a_u: &BigUint, m_u: &BigUint) -> Option<BigUint> {
    if m_u.is_zero() {
        return None;
    }
    let m = BigInt::from_biguint(Sign::Plus, m_u.clone());
    let mut t = (BigInt::zero(), BigInt::one());
    let mut r = (m.clone(), BigInt::from_biguint(Sign::Plus, a_u.clone()));
    while !r.1.is_zero() {
        let quotient = &r.0 / &r.1;
        let step = |mut pair: (BigInt, BigInt)| {
            mem::swap(&mut pair.0, &mut pair.1);
            pair.1 -= &quotient * &pair.0;
            pair
        };
        r = step(r);
        t = step(t);
    }
    if !r.0.is_one() {
        return None;
    }
    if t.0 < BigInt::zero() {
        Some((t.0 + m).magnitude().clone())
    } else {
        Some(t.0.magnitude().clone())
    }
}

/// Baby-step/giant-step table for discrete logarithms with respect to a fixed
/// base and modulus, bounded by a configured ceiling.
///
/// The table holds `m = ⌈√(ceiling + 1)⌉` baby steps, so lookups cover
/// exponents in `[0, ceiling]` and fail beyond it.
pub struct DiscreteLog {
    table: HashMap<BigUint, u64>,
    modulus: BigUint,
    /// `base^{-m} mod modulus`
    giant_step: BigUint,
    m: u64,
}

impl DiscreteLog {
    /// Constructs a pre-computation table for the given base, modulus and
    /// exponent ceiling. The base must be invertible mod the modulus.
    pub fn new(base: &BigUint, modulus: &BigUint, ceiling: u64) -> Option<Self> {
        let m = ((ceiling + 1) as f64).sqrt().ceil() as u64;

        let mut table = HashMap::with_capacity(m as usize);
        let mut k = BigUint::one();
        for j in 0..m {
            table.insert(k.clone(), j);
            k = (k * base) % modulus;
        }

        let base_to_m = base.modpow(&BigUint::from(m), modulus);
        let giant_step = mod_inverse(&base_to_m, modulus)?;

        Some(DiscreteLog {
            table,
            modulus: modulus.clone(),
            giant_step,
            m,
        })
    }

    /// Constructs a table over the group generator.
    pub fn from_group(group: &Group, ceiling: u64) -> Option<Self> {
        Self::new(group.generator().as_biguint(), group.modulus(), ceiling)
    }

    /// Finds `x` such that `base^x == y (mod modulus)`, if `x` is within the
    /// configured ceiling.
    pub fn find(&self, y: &BigUint) -> Option<u64> {
        let mut gamma = y % &self.modulus;
        for i in 0..self.m {
            if let Some(j) = self.table.get(&gamma) {
                return Some(i * self.m + j);
            }
            gamma = (gamma * &self.giant_step) % &self.modulus;
        }
        None
    }

    /// Typed variant of [`DiscreteLog::find`] for group elements.
    pub fn find_group_elem(&self, y: &GroupElement) -> Option<u64> {
        self.find(y.as_biguint())
    }
}

/// Computes the Lagrange coefficient at zero for node `i` of the node set
/// `xs`, i.e. `λ_i = Π_{l != i} l / (l - i) mod q`.
///
/// Returns `None` if `i` is not in `xs` or the nodes are not unique.
pub fn lagrange_coefficient_at_zero(
    xs: &[FieldElement],
    i: &FieldElement,
    field: &ScalarField,
) -> Option<FieldElement> {
    if !xs.contains(i) || !xs.iter().all_unique() {
        return None;
    }
    Some(lagrange_coefficient_at_zero_unchecked(xs, i, field))
}

fn lagrange_coefficient_at_zero_unchecked(
    xs: &[FieldElement],
    i: &FieldElement,
    field: &ScalarField,
) -> FieldElement {
    xs.iter()
        .filter_map(|l| {
            let l_minus_i = l.sub(i, field);
            let inv = l_minus_i.inv(field)?;
            Some(l.mul(&inv, field))
        })
        .fold(ScalarField::one(), |acc, s| acc.mul(&s, field))
}

/// Interpolates the polynomial through `(xs, ys)` at zero in `Z_q`.
///
/// Returns `None` if the nodes are not unique or the lists differ in length.
pub fn field_lagrange_at_zero(
    xs: &[FieldElement],
    ys: &[FieldElement],
    field: &ScalarField,
) -> Option<FieldElement> {
    if xs.len() != ys.len() || !xs.iter().all_unique() {
        return None;
    }
    let y0 = zip(xs, ys)
        .map(|(x, y)| lagrange_coefficient_at_zero_unchecked(xs, x, field).mul(y, field))
        .fold(ScalarField::zero(), |acc, s| acc.add(&s, field));
    Some(y0)
}

/// Interpolates at zero in the exponent: given `ys_i = B^{f(x_i)}`, computes
/// `B^{f(0)}` as `Π ys_i^{λ_i}`.
///
/// Returns `None` if the nodes are not unique or the lists differ in length.
pub fn group_lagrange_at_zero(
    xs: &[FieldElement],
    ys: &[GroupElement],
    field: &ScalarField,
    group: &Group,
) -> Option<GroupElement> {
    if xs.len() != ys.len() || !xs.iter().all_unique() {
        return None;
    }
    let y0 = zip(xs, ys)
        .map(|(x, y)| y.exp(&lagrange_coefficient_at_zero_unchecked(xs, x, field), group))
        .fold(Group::one(), |acc, s| acc.mul(&s, group));
    Some(y0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn test_cnt_bits_repr() {
        for (n, expected) in [1, 1, 2, 2, 3, 3, 3, 3, 4].into_iter().enumerate() {
            assert_eq!(cnt_bits_repr(&BigUint::from(n)), expected);
        }
    }

    #[test]
    fn test_to_be_bytes_left_pad() {
        let x = BigUint::from(0xff_usize);
        assert_eq!(to_be_bytes_left_pad(&x, 0), vec![0xff]);
        assert_eq!(to_be_bytes_left_pad(&x, 1), vec![0xff]);
        assert_eq!(to_be_bytes_left_pad(&x, 3), vec![0x00, 0x00, 0xff]);
    }

    #[test]
    fn test_mod_inverse() {
        assert_eq!(
            mod_inverse(&BigUint::from(3_u8), &BigUint::from(11_u8)),
            Some(BigUint::from(4_u8))
        );
        assert_eq!(mod_inverse(&BigUint::from(0_u8), &BigUint::from(11_u8)), None);
        assert_eq!(mod_inverse(&BigUint::from(3_u8), &BigUint::from(12_u8)), None);
    }

    fn toy_algebras() -> (ScalarField, Group) {
        (
            ScalarField::new_unchecked(BigUint::from(113_u8)),
            Group::new_unchecked(
                BigUint::from(227_u32),
                BigUint::from(113_u8),
                BigUint::from(4_u8),
            ),
        )
    }

    #[test]
    fn discrete_log_within_ceiling() {
        let (field, group) = toy_algebras();
        let dl = DiscreteLog::from_group(&group, 112).unwrap();

        for x in 0u64..113 {
            let y = group.g_exp(&FieldElement::from(x, &field));
            assert_eq!(dl.find_group_elem(&y), Some(x));
        }
    }

    #[test]
    fn discrete_log_fails_beyond_ceiling() {
        let (_, group) = toy_algebras();

        // Ceiling 20 gives m = 5, so the table covers exponents below 25.
        let dl = DiscreteLog::new(group.generator().as_biguint(), group.modulus(), 20).unwrap();
        for x in 0u64..=20 {
            let y = group.generator().pow(x, &group);
            assert_eq!(dl.find(y.as_biguint()), Some(x));
        }
        for x in 30u64..35 {
            let y = group.generator().pow(x, &group);
            assert_eq!(dl.find(y.as_biguint()), None);
        }
    }

    #[test]
    fn lagrange_interpolation() {
        let (field, group) = toy_algebras();

        // f(t) = t^2 - 1, so f(0) = -1 = 112 mod 113.
        let xs = [
            FieldElement::from(1_u8, &field),
            FieldElement::from(2_u8, &field),
            FieldElement::from(3_u8, &field),
        ];
        let ys = [
            FieldElement::from(0_u8, &field),
            FieldElement::from(3_u8, &field),
            FieldElement::from(8_u8, &field),
        ];
        let group_ys: Vec<_> = ys.iter().map(|y| group.g_exp(y)).collect();

        let f0 = FieldElement::from(112_u8, &field);
        assert_eq!(field_lagrange_at_zero(&xs, &ys, &field), Some(f0.clone()));
        assert_eq!(
            group_lagrange_at_zero(&xs, &group_ys, &field, &group),
            Some(group.g_exp(&f0))
        );

        // Length mismatch and duplicated nodes are rejected.
        assert_eq!(field_lagrange_at_zero(&xs[0..2], &ys, &field), None);
        assert_eq!(group_lagrange_at_zero(&xs, &group_ys[0..2], &field, &group), None);
        let dup = [
            FieldElement::from(1_u8, &field),
            FieldElement::from(2_u8, &field),
            FieldElement::from(2_u8, &field),
        ];
        assert_eq!(field_lagrange_at_zero(&dup, &ys, &field), None);
    }

    #[test]
    fn single_lagrange_coefficient() {
        let (field, _) = toy_algebras();
        let xs = [
            FieldElement::from(1_u8, &field),
            FieldElement::from(2_u8, &field),
            FieldElement::from(3_u8, &field),
        ];

        // λ_1 over {1,2,3} is 3.
        let l1 = lagrange_coefficient_at_zero(&xs, &FieldElement::from(1_u8, &field), &field);
        assert_eq!(l1, Some(FieldElement::from(3_u8, &field)));

        // Nodes outside the set are rejected.
        let l4 = lagrange_coefficient_at_zero(&xs, &FieldElement::from(4_u8, &field), &field);
        assert_eq!(l4, None);
    }
}
