//! Per-run RNG seeding with ChaCha8.
//!
//! Run `n` of a driver gets a ChaCha8Rng seeded from `(base_seed + n)`. Same
//! base seed, same operation order, as long as the operations themselves are
//! deterministic.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Seed used for run number `run_number` under `base_seed`.
pub fn run_seed(base_seed: u64, run_number: u64) -> u64 {
    base_seed.wrapping_add(run_number)
}

/// Create a deterministic RNG for a given base seed and run number.
pub fn run_rng(base_seed: u64, run_number: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(run_seed(base_seed, run_number))
}
