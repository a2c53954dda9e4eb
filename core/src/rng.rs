//! Deterministic random number generation.
//!
//! RULE: Nothing in the core may call a platform RNG while computing.
//! All randomness flows through StreamRng instances derived from one
//! explicit seed passed in by the caller.
//!
//! Each consumer gets its own stream, seeded from
//! (seed XOR (slot, index) mix). This means:
//!   - Splitting a simulation into more chunks never changes earlier chunks.
//!   - Each stream is fully reproducible in isolation.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A deterministic RNG for a single stream.
pub struct StreamRng {
    inner: Pcg64Mcg,
}

impl StreamRng {
    /// Create a stream RNG from the master seed and a stable stream index.
    pub fn new(master_seed: u64, stream_index: u64) -> Self {
        let derived_seed = master_seed ^ (stream_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Standard normal draw (Box-Muller, one value per call).
    pub fn standard_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-12);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }

    /// Log-normal draw whose median is `median`.
    /// sigma: log-space spread (higher = longer right tail).
    pub fn lognormal(&mut self, median: f64, sigma: f64) -> f64 {
        median * (sigma * self.standard_normal()).exp()
    }

    /// Exponential draw with the given mean.
    pub fn exponential(&mut self, mean: f64) -> f64 {
        let u = self.next_f64().max(1e-12);
        -mean * u.ln()
    }
}

/// Hands out streams for one explicit seed.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    /// Stream `index` within `slot`. Slots keep consumers apart so that
    /// chunk 3 of a simulation never shares a stream with restart 3 of
    /// a clustering run on the same seed.
    pub fn for_stream(&self, slot: StreamSlot, index: u64) -> StreamRng {
        let stream = ((slot as u64) << 48) | (index & 0xFFFF_FFFF_FFFF);
        StreamRng::new(self.master_seed, stream)
    }
}

/// Stable stream slot assignments.
/// NEVER reorder or remove entries, only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StreamSlot {
    LogisticsChunk = 1,
    SegmentationRestart = 2,
}
