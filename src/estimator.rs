//! HyperLogLog cardinality estimator.
//!
//! Keys are hashed with SHA-1 truncated to `digest_size` bits. The top
//! `bit_sample_size` bits select a register; the register keeps the
//! largest rank (1-based position of the first set bit) seen in the
//! remaining bits. Memory use is `2^bit_sample_size` bytes regardless of
//! how many keys are inserted.

use crate::error::MiniError;
use sha1::{Digest, Sha1};

pub const DEFAULT_BIT_SAMPLE_SIZE: u8 = 12;
pub const DEFAULT_DIGEST_SIZE: u16 = 128;

const MAX_DIGEST_SIZE: u16 = 160;
const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Debug, Clone)]
pub struct Estimator {
    bit_sample_size: u8,
    digest_size: u16,
    registers: Vec<u8>,
}

impl Estimator {
    pub fn new(bit_sample_size: u8, digest_size: u16) -> Result<Self, MiniError> {
        if !(4..=16).contains(&bit_sample_size) {
            return Err(MiniError::Invalid(format!(
                "bit sample size must be between 4 and 16, got {bit_sample_size}"
            )));
        }
        if digest_size % 8 != 0
            || digest_size > MAX_DIGEST_SIZE
            || digest_size < 32
            || digest_size <= u16::from(bit_sample_size)
        {
            return Err(MiniError::Invalid(format!(
                "digest size must be a multiple of 8 between 32 and {MAX_DIGEST_SIZE}, got {digest_size}"
            )));
        }
        Ok(Self {
            bit_sample_size,
            digest_size,
            registers: vec![0; 1 << bit_sample_size],
        })
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    pub fn insert(&mut self, key: &[u8]) {
        let digest = Sha1::digest(key);
        let bytes = &digest[..usize::from(self.digest_size / 8)];
        let p = usize::from(self.bit_sample_size);

        let head = (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]);
        let index = (head >> (24 - p)) as usize;

        let total = usize::from(self.digest_size);
        let rank = (p..total)
            .position(|bit| bytes[bit / 8] & (0x80 >> (bit % 8)) != 0)
            .map_or(total - p + 1, |offset| offset + 1);
        let rank = u8::try_from(rank).unwrap_or(u8::MAX);

        let slot = &mut self.registers[index];
        if rank > *slot {
            *slot = rank;
        }
    }

    pub fn estimate(&self) -> f64 {
        let m = self.registers.len() as f64;
        let alpha = match self.registers.len() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };
        let sum: f64 = self
            .registers
            .iter()
            .map(|&r| 2f64.powi(-i32::from(r)))
            .sum();
        let raw = alpha * m * m / sum;

        if raw <= 2.5 * m {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count();
            if zeros > 0 {
                // Linear counting is more accurate for small cardinalities.
                return m * (m / zeros as f64).ln();
            }
            return raw;
        }
        if self.digest_size <= 32 && raw > TWO_POW_32 / 30.0 {
            return -TWO_POW_32 * (1.0 - raw / TWO_POW_32).ln();
        }
        raw
    }
}

impl Default for Estimator {
    fn default() -> Self {
        Self {
            bit_sample_size: DEFAULT_BIT_SAMPLE_SIZE,
            digest_size: DEFAULT_DIGEST_SIZE,
            registers: vec![0; 1 << DEFAULT_BIT_SAMPLE_SIZE],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn relative_error(estimate: f64, actual: usize) -> f64 {
        (estimate - actual as f64).abs() / actual as f64
    }

    #[test]
    fn rejects_bad_parameters() {
        assert!(Estimator::new(3, 128).is_err());
        assert!(Estimator::new(17, 128).is_err());
        assert!(Estimator::new(12, 100).is_err());
        assert!(Estimator::new(12, 168).is_err());
        assert!(Estimator::new(12, 128).is_ok());
    }

    #[test]
    fn empty_estimator_is_zero() {
        let est = Estimator::default();
        assert_eq!(est.register_count(), 4096);
        assert_eq!(est.estimate(), 0.0);
    }

    #[test]
    fn duplicates_do_not_inflate_the_estimate() {
        let mut est = Estimator::default();
        for _ in 0..10_000 {
            est.insert(b"same-key");
        }
        assert!((est.estimate() - 1.0).abs() < 0.01, "{}", est.estimate());
    }

    #[test]
    fn small_cardinalities_are_close() {
        let mut est = Estimator::default();
        for i in 0..1_000 {
            est.insert(format!("row-{i}").as_bytes());
        }
        let e = est.estimate();
        assert!(relative_error(e, 1_000) < 0.05, "estimate {e}");
    }

    #[test]
    fn large_cardinalities_stay_within_five_percent() {
        const N: usize = 100_000;
        for seed in [1u64, 7, 42] {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut est = Estimator::new(DEFAULT_BIT_SAMPLE_SIZE, DEFAULT_DIGEST_SIZE).unwrap();
            for i in 0..N {
                let salt: u64 = rng.gen();
                est.insert(format!("{i}|{salt}").as_bytes());
            }
            let e = est.estimate();
            assert!(relative_error(e, N) < 0.05, "seed {seed}: estimate {e}");
        }
    }

    #[test]
    fn estimate_is_deterministic() {
        let mut a = Estimator::default();
        let mut b = Estimator::default();
        for i in 0..5_000 {
            let key = format!("{{\"id\":\"{i}\"}}");
            a.insert(key.as_bytes());
            b.insert(key.as_bytes());
        }
        assert_eq!(a.estimate(), b.estimate());
    }
}
