#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Serde helpers encoding `BigUint` as fixed-width hex strings.
//!
//! Field and group elements of the MODP-2048 deployment parameters both fit
//! 2048 bits, so a single width is used throughout.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serializer};

use crate::base16::{biguint_from_str_hex_bits, to_string_uppercase_hex_bits};

pub fn biguint_serialize_2048_bits<S>(u: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    use serde::ser::Error;

    let s = to_string_uppercase_hex_bits(u, 2048).map_err(S::Error::custom)?;
    serializer.serialize_str(&s)
}

pub fn biguint_deserialize_2048_bits<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let s = String::deserialize(deserializer)?;
    biguint_from_str_hex_bits(&s, 2048).map_err(D::Error::custom)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, PartialEq, Eq, Debug)]
    struct Wrapper(
        #[serde(
            serialize_with = "biguint_serialize_2048_bits",
            deserialize_with = "biguint_deserialize_2048_bits"
        )]
        BigUint,
    );

    #[test]
    fn round_trip() {
        let w = Wrapper(BigUint::from(0xDEADBEEF_u32));
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json.len(), 2048 / 4 + 2);
        assert_eq!(serde_json::from_str::<Wrapper>(&json).unwrap(), w);
    }
}
