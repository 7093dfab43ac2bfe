#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::manual_assert)]

//! Seedable CSPRNG backed by the SHAKE256 XOF.
//!
//! A [`Csprng`] is either seeded explicitly (deterministic, for tests and
//! reproducible key ceremonies) or from operating-system entropy.

use num_bigint::BigUint;
use num_traits::Zero;
use sha3::{
    Shake256, Shake256Reader,
    digest::{ExtendableOutput, Update, XofReader},
};

pub struct Csprng(Shake256Reader);

impl Csprng {
    /// Creates a deterministic `Csprng` from the given seed bytes.
    ///
    /// The seed is absorbed length-prefixed after a fixed domain label, so
    /// distinct seeds can never alias each other.
    pub fn new(seed: &[u8]) -> Csprng {
        let mut hasher = Shake256::default();

        let label = b"scrutin csprng";
        hasher.update(&(label.len() as u64).to_le_bytes());
        hasher.update(label);

        hasher.update(&(seed.len() as u64).to_le_bytes());
        hasher.update(seed);

        Csprng(hasher.finalize_xof())
    }

    /// Creates a `Csprng` seeded with 32 bytes of operating-system entropy.
    pub fn from_os_entropy() -> Csprng {
        use rand::RngCore;
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        Csprng::new(&seed)
    }

    /// Fills `dest` with output of the XOF.
    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.read(dest);
    }

    /// Returns a uniformly random `u8`.
    pub fn next_u8(&mut self) -> u8 {
        let mut buf = [0u8];
        self.0.read(&mut buf);
        buf[0]
    }

    /// Returns a uniformly random `u32`.
    pub fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.read(&mut buf);
        u32::from_le_bytes(buf)
    }

    /// Returns a uniformly random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.read(&mut buf);
        u64::from_le_bytes(buf)
    }

    /// Returns a uniformly random `bool`.
    pub fn next_bool(&mut self) -> bool {
        self.next_u8() & 1 != 0
    }

    /// Returns a random number chosen uniformly from `0 <= n < 2^bits`.
    /// `bits` must be greater than `0`.
    pub fn next_biguint(&mut self, bits: usize) -> BigUint {
        assert!(0 < bits, "bits must be greater than 0");

        let cnt_bytes = bits.div_ceil(8);
        let mut buf = vec![0u8; cnt_bytes];
        self.0.read(buf.as_mut_slice());

        // Mask off the bit positions above `bits`.
        let cnt_extra_bits = cnt_bytes * 8 - bits;
        if 0 < cnt_extra_bits {
            buf[0] &= 0xff_u8 >> cnt_extra_bits;
        }

        BigUint::from_bytes_be(buf.as_slice())
    }

    /// Returns a random number chosen uniformly from `0 <= n < end` by
    /// rejection sampling. `end` must be greater than `0`.
    pub fn next_biguint_lt(&mut self, end: &BigUint) -> BigUint {
        assert!(!end.is_zero(), "end must be greater than 0");

        let bits = end.bits() as usize;
        loop {
            let n = self.next_biguint(bits);
            if &n < end {
                break n;
            }
        }
    }

    /// Returns a random number chosen uniformly from `start <= n < end`.
    /// `start` must be less than `end`.
    pub fn next_biguint_range(&mut self, start: &BigUint, end: &BigUint) -> BigUint {
        assert!(start < end, "start must be less than end");
        start + self.next_biguint_lt(&(end - start))
    }
}
