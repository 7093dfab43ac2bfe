#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Wrappers around `BigUint` separating elements of the exponent field `Z_q`
//! from elements of the multiplicative subgroup of `Z_p^*`.
//!
//! The deployment parameters use a safe prime `p = 2q + 1`, so the subgroup of
//! order `q` is exactly the set of quadratic residues mod `p`.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    algebra_utils::{cnt_bits_repr, mod_inverse, to_be_bytes_left_pad},
    csprng::Csprng,
    prime::is_prime,
};

/// An element of the exponent field `Z_q` defined by a [`ScalarField`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldElement(
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_2048_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_2048_bits"
    )]
    BigUint,
);

/// The prime field `Z_q` of exponents.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScalarField {
    /// Subgroup order.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_2048_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_2048_bits"
    )]
    q: BigUint,
}

impl FieldElement {
    /// The numeric value of the field element. Guaranteed to be `< q` for
    /// elements produced through [`ScalarField`] operations.
    pub fn value(&self) -> &BigUint {
        &self.0
    }

    /// Computes `(self + other) % q`.
    pub fn add(&self, other: &FieldElement, field: &ScalarField) -> Self {
        FieldElement((&self.0 + &other.0) % &field.q)
    }

    /// Computes `(self - other) % q`, wrapping below zero.
    pub fn sub(&self, other: &FieldElement, field: &ScalarField) -> Self {
        if self.0 >= other.0 {
            FieldElement((&self.0 - &other.0) % &field.q)
        } else {
            FieldElement(&field.q - (&other.0 - &self.0) % &field.q)
        }
    }

    /// Computes `(self * other) % q`.
    pub fn mul(&self, other: &FieldElement, field: &ScalarField) -> Self {
        FieldElement((&self.0 * &other.0) % &field.q)
    }

    /// Computes the multiplicative inverse in `Z_q` if it exists, i.e. iff
    /// `gcd(self, q) == 1`.
    pub fn inv(&self, field: &ScalarField) -> Option<Self> {
        mod_inverse(&self.0, &field.q).map(FieldElement)
    }

    /// Creates a field element from an unsigned integer, reduced mod `q`.
    pub fn from<T>(x: T, field: &ScalarField) -> Self
    where
        BigUint: From<T>,
    {
        FieldElement(BigUint::from(x) % &field.q)
    }

    /// Creates a field element from a big-endian byte string, reduced mod `q`.
    pub fn from_bytes_be(x: &[u8], field: &ScalarField) -> Self {
        FieldElement(BigUint::from_bytes_be(x) % &field.q)
    }

    /// Returns the big-endian encoding of the field element, left-padded to
    /// the canonical integer width of the deployment (`⌈log_256 p⌉` bytes).
    pub fn to_be_bytes_left_pad(&self, len: usize) -> Vec<u8> {
        to_be_bytes_left_pad(&self.0, len)
    }

    pub fn is_zero(&self) -> bool {
        BigUint::is_zero(&self.0)
    }

    /// Returns true iff `0 <= self < q`.
    pub fn is_valid(&self, field: &ScalarField) -> bool {
        self.0 < field.q
    }
}

impl Zeroize for FieldElement {
    fn zeroize(&mut self) {
        self.0.set_zero();
    }
}

impl ScalarField {
    /// Constructs the exponent field of a given prime order without checking
    /// primality. Use [`ScalarField::is_valid`] for trust-on-first-use
    /// parameter validation.
    pub fn new_unchecked(order: BigUint) -> Self {
        ScalarField { q: order }
    }

    /// Checks that the field order is prime. Expensive.
    pub fn is_valid(&self, csprng: &mut Csprng) -> bool {
        is_prime(&self.q, csprng)
    }

    /// One, the neutral element of multiplication.
    pub fn one() -> FieldElement {
        FieldElement(BigUint::one())
    }

    /// Zero, the neutral element of addition.
    pub fn zero() -> FieldElement {
        FieldElement(BigUint::zero())
    }

    /// Returns a uniform random element of `[0, q)`.
    pub fn random_field_elem(&self, csprng: &mut Csprng) -> FieldElement {
        FieldElement(csprng.next_biguint_lt(&self.q))
    }

    /// Returns a uniform random exponent in `[2, q - 1]`, the range used for
    /// secret keys and encryption nonces.
    pub fn random_exponent(&self, csprng: &mut Csprng) -> FieldElement {
        let two = BigUint::from(2u8);
        FieldElement(csprng.next_biguint_range(&two, &self.q))
    }

    /// The field order `q`.
    pub fn order(&self) -> &BigUint {
        &self.q
    }

    /// The length of the byte representation of `q`.
    pub fn q_len_bytes(&self) -> usize {
        cnt_bits_repr(&self.q).div_ceil(8)
    }
}

/// An element of the order-`q` multiplicative subgroup defined by a [`Group`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct GroupElement(
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_2048_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_2048_bits"
    )]
    BigUint,
);

/// The multiplicative subgroup of `Z_p^*` of prime order `q`, where
/// `p = 2q + 1` is a safe prime and `g` generates the subgroup.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    /// Prime modulus `p`.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_2048_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_2048_bits"
    )]
    p: BigUint,

    /// Subgroup generator `g`.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_2048_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_2048_bits"
    )]
    g: BigUint,

    /// Subgroup order `q`.
    #[serde(
        serialize_with = "crate::biguint_serde::biguint_serialize_2048_bits",
        deserialize_with = "crate::biguint_serde::biguint_deserialize_2048_bits"
    )]
    q: BigUint,
}

impl GroupElement {
    /// Computes `(self * other) mod p`.
    pub fn mul(&self, other: &GroupElement, group: &Group) -> GroupElement {
        GroupElement((&self.0 * &other.0) % &group.p)
    }

    /// Computes the multiplicative inverse mod `p`. Always exists for valid
    /// group elements.
    pub fn inv(&self, group: &Group) -> Option<Self> {
        mod_inverse(&self.0, &group.p).map(GroupElement)
    }

    /// Raises the group element to a field-element exponent.
    pub fn exp(&self, exponent: &FieldElement, group: &Group) -> GroupElement {
        GroupElement(self.0.modpow(&exponent.0, &group.p))
    }

    /// Raises the group element to an integer exponent.
    pub fn pow(&self, exponent: impl Into<BigUint>, group: &Group) -> GroupElement {
        GroupElement(self.0.modpow(&exponent.into(), &group.p))
    }

    /// Returns true iff `0 < self < p` and `self^q % p == 1`, i.e. the value
    /// is a member of the order-`q` subgroup.
    pub fn is_valid(&self, group: &Group) -> bool {
        !self.0.is_zero() && self.0 < group.p && self.0.modpow(&group.q, &group.p).is_one()
    }

    /// Returns the big-endian encoding of the group element, left-padded to
    /// the canonical integer width of the deployment.
    pub fn to_be_bytes_left_pad(&self, len: usize) -> Vec<u8> {
        to_be_bytes_left_pad(&self.0, len)
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }
}

impl Group {
    /// Constructs a group from `(p, q, g)` without validity checks. Use
    /// [`Group::is_valid`] for trust-on-first-use parameter validation.
    pub fn new_unchecked(modulus: BigUint, order: BigUint, generator: BigUint) -> Self {
        Group {
            p: modulus,
            g: generator,
            q: order,
        }
    }

    /// Checks that the group parameters describe a safe-prime group:
    /// `p` and `q` prime, `p == 2q + 1`, and `g` a generator of the order-`q`
    /// subgroup. Expensive.
    pub fn is_valid(&self, csprng: &mut Csprng) -> bool {
        let two_q_plus_1 = BigUint::from(2u8) * &self.q + BigUint::one();
        if self.p != two_q_plus_1 {
            return false;
        }
        if self.g.is_one() || self.g.is_zero() || !self.g.modpow(&self.q, &self.p).is_one() {
            return false;
        }
        is_prime(&self.q, csprng) && is_prime(&self.p, csprng)
    }

    /// Returns generator `g` raised to a field-element exponent.
    pub fn g_exp(&self, x: &FieldElement) -> GroupElement {
        GroupElement(self.g.modpow(&x.0, &self.p))
    }

    /// One, the neutral element.
    pub fn one() -> GroupElement {
        GroupElement(BigUint::one())
    }

    /// Returns a uniform random group element, `g^x` for uniform `x` in
    /// `[0, q)`.
    pub fn random_group_elem(&self, csprng: &mut Csprng) -> GroupElement {
        self.g_exp(&FieldElement(csprng.next_biguint_lt(&self.q)))
    }

    pub fn order(&self) -> &BigUint {
        &self.q
    }

    pub fn modulus(&self) -> &BigUint {
        &self.p
    }

    pub fn generator(&self) -> GroupElement {
        GroupElement(self.g.clone())
    }

    /// The length of the byte representation of modulus `p`. This is the
    /// canonical fixed integer width of the deployment; `256` for MODP-2048.
    pub fn p_len_bytes(&self) -> usize {
        cnt_bits_repr(&self.p).div_ceil(8)
    }

    /// Checks that the group order matches the field order.
    pub fn matches_field(&self, field: &ScalarField) -> bool {
        self.q == field.q
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    // p = 2q + 1 = 227 with q = 113; 4 = 2^2 generates the quadratic
    // residues.
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
    fn field_operations() {
        let (field, _) = toy_algebras();

        let a = FieldElement::from(100_u8, &field);
        let b = FieldElement::from(20_u8, &field);

        assert_eq!(a.add(&b, &field), FieldElement::from(7_u8, &field));
        assert_eq!(a.sub(&b, &field), FieldElement::from(80_u8, &field));
        assert_eq!(b.sub(&a, &field), FieldElement::from(33_u8, &field));
        assert_eq!(b.sub(&b, &field), ScalarField::zero());
        // 2000 mod 113 = 79
        assert_eq!(a.mul(&b, &field), FieldElement::from(79_u8, &field));

        let a_inv = a.inv(&field).unwrap();
        assert_eq!(a.mul(&a_inv, &field), ScalarField::one());
    }

    #[test]
    fn group_operations() {
        let mut csprng = Csprng::new(b"group operations");
        let (field, group) = toy_algebras();

        assert!(group.is_valid(&mut csprng));
        assert!(group.matches_field(&field));

        let x = FieldElement::from(7_u8, &field);
        let y = FieldElement::from(9_u8, &field);
        let gx = group.g_exp(&x);
        let gy = group.g_exp(&y);
        let gxy = group.g_exp(&x.add(&y, &field));
        assert_eq!(gx.mul(&gy, &group), gxy);

        let gx_inv = gx.inv(&group).unwrap();
        assert_eq!(gx.mul(&gx_inv, &group), Group::one());

        for _ in 0..50 {
            assert!(group.random_group_elem(&mut csprng).is_valid(&group));
        }

        // 2 is a non-residue mod 227 and not in the subgroup.
        let non_member = GroupElement(BigUint::from(2_u8));
        assert!(!non_member.is_valid(&group));
        assert!(!GroupElement(BigUint::zero()).is_valid(&group));
    }

    #[test]
    fn invalid_groups_fail_validation() {
        let mut csprng = Csprng::new(b"group validation");

        // p != 2q + 1
        let not_safe = Group::new_unchecked(
            BigUint::from(229_u32),
            BigUint::from(113_u8),
            BigUint::from(4_u8),
        );
        assert!(!not_safe.is_valid(&mut csprng));

        // generator of the full group rather than the subgroup
        let bad_generator = Group::new_unchecked(
            BigUint::from(227_u32),
            BigUint::from(113_u8),
            BigUint::from(2_u8),
        );
        assert!(!bad_generator.is_valid(&mut csprng));

        // composite order
        let bad_order = Group::new_unchecked(
            BigUint::from(231_u32),
            BigUint::from(115_u8),
            BigUint::from(4_u8),
        );
        assert!(!bad_order.is_valid(&mut csprng));
    }

    #[test]
    fn byte_encodings() {
        let (field, _) = toy_algebras();

        let u = FieldElement::from_bytes_be(b"A", &field);
        assert_eq!(u, FieldElement::from(65_u8, &field));
        assert_eq!(u.to_be_bytes_left_pad(4), vec![0, 0, 0, 65]);

        let zeroed = {
            let mut z = u.clone();
            z.zeroize();
            z
        };
        assert!(zeroed.is_zero());
    }
}
