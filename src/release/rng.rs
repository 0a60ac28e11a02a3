//! Deterministic RNG for the stochastic release policy.
//!
//! Uses xorshift64* for speed and stable output across platforms. Release
//! decisions must be reproducible from an explicit seed, so the generator is
//! always injected by the caller and never drawn from a global source. This
//! is not cryptographically secure.

/// Deterministic RNG with a single 64-bit state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseRng {
    state: u64,
}

impl ReleaseRng {
    /// Create a new RNG. A zero seed is remapped to a non-zero constant to
    /// avoid the xorshift lockup state.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let s = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state: s }
    }

    /// Next 64-bit value from xorshift64*.
    #[inline(always)]
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform sample in `[0, 1)` from the top 53 bits.
    #[inline(always)]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }
}
