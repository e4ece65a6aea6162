//! Noise sources for exciters, crackle and tape beds.

/// xorshift32 white noise in `[-1, 1)`. Deterministic for a given seed.
#[derive(Copy, Clone, Debug)]
pub struct WhiteNoise {
    state: u32,
}

impl WhiteNoise {
    #[inline]
    pub fn new(seed: u32) -> Self {
        // zero is a fixed point of xorshift
        Self { state: if seed == 0 { 0x9E37_79B9 } else { seed } }
    }

    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform sample in `[0, 1)`.
    #[inline]
    pub fn next01(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 * (1.0 / 16_777_216.0)
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.next01() * 2.0 - 1.0
    }
}

/// Leaky-integrated white noise: dark, rumbly "dust" for the tape bed.
#[derive(Copy, Clone, Debug)]
pub struct DustNoise {
    white: WhiteNoise,
    last: f32,
}

impl DustNoise {
    #[inline]
    pub fn new(seed: u32) -> Self {
        Self { white: WhiteNoise::new(seed), last: 0.0 }
    }

    #[inline]
    pub fn next(&mut self) -> f32 {
        self.last = self.last * 0.985 + self.white.next() * 0.05;
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_noise_is_bounded_and_centred() {
        let mut n = WhiteNoise::new(7);
        let mut sum = 0.0_f64;
        for _ in 0..100_000 {
            let v = n.next();
            assert!((-1.0..1.0).contains(&v));
            sum += f64::from(v);
        }
        assert!((sum / 100_000.0).abs() < 0.02);
    }

    #[test]
    fn zero_seed_still_produces_noise() {
        let mut n = WhiteNoise::new(0);
        assert_ne!(n.next_u32(), 0);
    }

    #[test]
    fn dust_stays_small() {
        let mut d = DustNoise::new(3);
        for _ in 0..48_000 {
            assert!(d.next().abs() < 4.0);
        }
    }
}
