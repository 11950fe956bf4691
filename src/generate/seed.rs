//! Sub-seed derivation for random cases.
//!
//! Every random value is a pure function of (base seed, scope, index,
//! attempt), so cases can be generated on any thread in any order.

use rand::SeedableRng;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};

/// Hash the inputs into a 64-bit seed.
pub fn derive_seed(base: u64, scope: &str, index: usize, attempt: u32) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(base.to_le_bytes());
    hasher.update((scope.len() as u64).to_le_bytes());
    hasher.update(scope.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(attempt.to_le_bytes());
    let digest = hasher.finalize();
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Deterministic generator for one (scope, index, attempt).
pub fn case_rng(base: u64, scope: &str, index: usize, attempt: u32) -> StdRng {
    StdRng::seed_from_u64(derive_seed(base, scope, index, attempt))
}
