#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]
#![cfg_attr(rustfmt, rustfmt_skip)]

//! The fixed group parameters of a deployment.
//!
//! The default parameters are the 2048-bit MODP group of RFC 3526 (group 14):
//! a safe prime `p`, subgroup order `q = (p - 1) / 2`, generator `g = 2`.
//! They are process-wide immutable state, initialized once at startup.

use std::sync::Arc;

use anyhow::{Result, ensure};
use hex_literal::hex;
use lazy_static::lazy_static;
use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

use util::{
    algebra::{Group, ScalarField},
    csprng::Csprng,
};

/// RFC 3526, section 3: the 2048-bit MODP group modulus.
const MODP_2048_P: [u8; 256] = hex!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74"
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437"
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED"
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE45B3DC2007CB8A163BF05"
    "98DA48361C55D39A69163FA8FD24CF5F83655D23DCA3AD961C62F356208552BB"
    "9ED529077096966D670C354E4ABC9804F1746C08CA18217C32905E462E36CE3B"
    "E39E772C180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718"
    "3995497CEA956AE515D2261898FA051015728E5A8AACAA68FFFFFFFFFFFFFFFF"
);

const MODP_2048_G: u8 = 2;

/// The field `Z_q` and group `Z_p^r` of one deployment, plus derived sizes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParameters {
    field: ScalarField,
    group: Group,
}

impl GroupParameters {
    /// Assembles parameters from a safe prime and generator without
    /// validation. `q` is derived as `(p - 1) / 2`.
    pub fn from_safe_prime_unchecked(p: BigUint, g: BigUint) -> Self {
        let q: BigUint = (&p - BigUint::one()) >> 1;
        GroupParameters {
            field: ScalarField::new_unchecked(q.clone()),
            group: Group::new_unchecked(p, q, g),
        }
    }

    pub fn field(&self) -> &ScalarField {
        &self.field
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    /// The canonical fixed width of integers in hash inputs and wire
    /// encodings: `⌈log_256 p⌉` bytes. `256` for MODP-2048.
    pub fn p_len_bytes(&self) -> usize {
        self.group.p_len_bytes()
    }

    /// Validates primality of `p` and `q`, the safe-prime relation and the
    /// generator order. Expensive; intended for startup, not per request.
    pub fn validate(&self, csprng: &mut Csprng) -> Result<()> {
        ensure!(self.group.is_valid(csprng), "group parameters are invalid");
        ensure!(
            self.group.matches_field(&self.field),
            "field order does not match group order"
        );
        Ok(())
    }
}

lazy_static! {
    /// The MODP-2048 deployment parameters.
    pub static ref STANDARD_PARAMETERS: Arc<GroupParameters> =
        Arc::new(GroupParameters::from_safe_prime_unchecked(
            BigUint::from_bytes_be(&MODP_2048_P),
            BigUint::from(MODP_2048_G),
        ));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;

    #[test]
    fn standard_parameter_sizes() {
        let params = STANDARD_PARAMETERS.clone();
        assert_eq!(params.p_len_bytes(), 256);
        assert_eq!(params.group().modulus().bits(), 2048);
        assert_eq!(params.field().order().bits(), 2047);
    }

    #[test]
    fn generator_is_a_subgroup_member() {
        let params = STANDARD_PARAMETERS.clone();
        assert!(params.group().generator().is_valid(params.group()));
    }

    // Full Miller-Rabin over p and q runs multiple seconds; the relation
    // checks below are the cheap part of validate().
    #[test]
    fn safe_prime_relation_holds() {
        let params = STANDARD_PARAMETERS.clone();
        let p = params.group().modulus();
        let q = params.field().order();
        assert_eq!(p - BigUint::one(), q * 2u8);
    }
}
