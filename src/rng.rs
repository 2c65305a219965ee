//! Deterministic pseudo-random generator.
//!
//! [`Lfsr113`] is L'Ecuyer's four-component combined Tausworthe generator. It
//! is passed explicitly to everything that needs randomness (weight
//! initialization, batch shuffling) so a run is reproducible from its seed.
//!
//! It also implements [`rand::RngCore`] and [`rand::SeedableRng`], so it can
//! drive any `rand` distribution when exact reproducibility of a particular
//! draw sequence is not required.

use rand::{RngCore, SeedableRng};

/// Seed used when none is configured.
pub const DEFAULT_SEED: u32 = 987_654_321;

/// 2^-32: maps a 32-bit draw onto [0, 1).
const U32_TO_UNIT: f32 = 1.0 / 4_294_967_296.0;

/// Largest `f32` strictly below 1.
const ONE_BELOW: f32 = 1.0 - f32::EPSILON / 2.0;

/// lfsr113 generator with a cached Gaussian spare.
#[derive(Debug, Clone, PartialEq)]
pub struct Lfsr113 {
    z1: u32,
    z2: u32,
    z3: u32,
    z4: u32,
    spare: Option<f32>,
}

impl Lfsr113 {
    /// Seed all four components with `seed`.
    ///
    /// Components must exceed 1, 7, 15 and 127 respectively, so seeds of 127
    /// or less are bumped by 127.
    pub fn new(seed: u32) -> Self {
        let seed = if seed <= 127 { seed + 127 } else { seed };
        Self {
            z1: seed,
            z2: seed,
            z3: seed,
            z4: seed,
            spare: None,
        }
    }

    /// Advance every component once and return their XOR.
    #[inline]
    pub fn next_word(&mut self) -> u32 {
        let b = ((self.z1 << 6) ^ self.z1) >> 13;
        self.z1 = ((self.z1 & 0xffff_fffe) << 18) ^ b;
        let b = ((self.z2 << 2) ^ self.z2) >> 27;
        self.z2 = ((self.z2 & 0xffff_fff8) << 2) ^ b;
        let b = ((self.z3 << 13) ^ self.z3) >> 21;
        self.z3 = ((self.z3 & 0xffff_fff0) << 7) ^ b;
        let b = ((self.z4 << 3) ^ self.z4) >> 12;
        self.z4 = ((self.z4 & 0xffff_ff80) << 13) ^ b;
        self.z1 ^ self.z2 ^ self.z3 ^ self.z4
    }

    /// Uniform draw in [0, 1).
    #[inline]
    pub fn uniform01(&mut self) -> f32 {
        // Draws within 128 of u32::MAX round up to 2^32 in f32.
        let value = self.next_word() as f32 * U32_TO_UNIT;
        if value < 1.0 { value } else { ONE_BELOW }
    }

    /// Normal draw with the given mean and standard deviation.
    ///
    /// Uses the polar method: each accepted point yields two independent
    /// values. The second is cached and returned by the next call without
    /// consuming any draws.
    pub fn gaussian(&mut self, mean: f32, standard_deviation: f32) -> f32 {
        if let Some(spare) = self.spare.take() {
            return mean + standard_deviation * spare;
        }

        let (u, v, s) = loop {
            let u = 2.0 * self.uniform01() - 1.0;
            let v = 2.0 * self.uniform01() - 1.0;
            let s = u * u + v * v;
            if s < 1.0 && s > 0.0 {
                break (u, v, s);
            }
        };

        let scale = ((-2.0 * s.ln()) / s).sqrt();
        self.spare = Some(v * scale);
        (u * scale) * standard_deviation + mean
    }

    /// Uniform integer in `[lower, upper)`.
    #[inline]
    pub fn uniform_u32_in_range(&mut self, lower: u32, upper: u32) -> u32 {
        debug_assert!(lower < upper, "empty range {lower}..{upper}");
        let range = upper - lower;
        let offset = (self.uniform01() * range as f32) as u32;
        offset.min(range - 1) + lower
    }

    /// True if the next [`gaussian`](Self::gaussian) call will use the cached
    /// spare.
    #[inline]
    pub fn has_spare(&self) -> bool {
        self.spare.is_some()
    }
}

impl Default for Lfsr113 {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl RngCore for Lfsr113 {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let lo = u64::from(self.next_word());
        let hi = u64::from(self.next_word());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_word().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Lfsr113 {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn default_seed_sequence_is_stable() {
        let mut rng = Lfsr113::default();
        let words: Vec<u32> = (0..4).map(|_| rng.next_word()).collect();
        assert_eq!(words, vec![3952563604, 1192989748, 2423800670, 1230242343]);
    }

    #[test]
    fn small_seeds_are_bumped() {
        let mut a = Lfsr113::new(5);
        let mut b = Lfsr113::new(132);
        assert_eq!(a, b);
        for _ in 0..3 {
            assert_eq!(a.next_word(), b.next_word());
        }
        assert_eq!(Lfsr113::new(5).next_word(), 33571329);
    }

    #[test]
    fn uniform01_stays_in_unit_interval() {
        let mut rng = Lfsr113::new(12345);
        for _ in 0..10_000 {
            let x = rng.uniform01();
            assert!((0.0..1.0).contains(&x), "{x}");
        }
    }

    #[test]
    fn uniform_range_is_closed_open() {
        let mut rng = Lfsr113::new(777);
        let mut seen = [false; 5];
        for _ in 0..2_000 {
            let x = rng.uniform_u32_in_range(3, 8);
            assert!((3..8).contains(&x));
            seen[(x - 3) as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn gaussian_pairs_share_one_rejection_sample() {
        let mut rng = Lfsr113::new(2024);
        let first = rng.gaussian(0.0, 1.0);
        assert!(rng.has_spare());

        // The second call must not advance the generator.
        let state = rng.clone();
        let second = rng.gaussian(0.0, 1.0);
        assert!(!rng.has_spare());
        let mut after = rng.clone();
        let mut expected = state;
        assert_eq!(after.next_word(), expected.next_word());
        assert!(first.is_finite() && second.is_finite());
    }

    #[test]
    fn gaussian_spare_is_rescaled_per_call() {
        let mut a = Lfsr113::new(99);
        let mut b = Lfsr113::new(99);
        a.gaussian(0.0, 1.0);
        b.gaussian(0.0, 1.0);

        let unit = a.gaussian(0.0, 1.0);
        let shifted = b.gaussian(3.0, 2.0);
        assert!((shifted - (3.0 + 2.0 * unit)).abs() < 1e-6);
    }

    #[test]
    fn gaussian_moments_are_plausible() {
        let mut rng = Lfsr113::default();
        let n = 20_000;
        let samples: Vec<f32> = (0..n).map(|_| rng.gaussian(0.5, 0.1)).collect();
        let mean = samples.iter().sum::<f32>() / n as f32;
        let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / n as f32;
        assert!((mean - 0.5).abs() < 0.01, "mean {mean}");
        assert!((var.sqrt() - 0.1).abs() < 0.01, "stddev {}", var.sqrt());
    }

    #[test]
    fn plugs_into_rand_traits() {
        let mut a = Lfsr113::from_seed(DEFAULT_SEED.to_le_bytes());
        let mut b = Lfsr113::default();
        assert_eq!(a.next_u32(), b.next_word());

        let x: f64 = a.gen_range(-1.0..1.0);
        assert!((-1.0..1.0).contains(&x));

        let mut bytes = [0_u8; 6];
        a.fill_bytes(&mut bytes);
    }
}
