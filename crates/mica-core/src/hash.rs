//! Structural hashing primitives.
//!
//! Descriptor hashes are a rolling `h * 33 + x` combine over 64-bit value
//! hashes. Equal hashes let reconciliation skip a subtree outright, so
//! individual values are hashed with `ahash` before being folded in to keep
//! collisions negligible for realistic tree sizes.

use core::hash::Hash;
use std::hash::Hasher;

pub use ahash::AHasher as DefaultHasher;

/// Seed of the rolling combine.
pub const HASH_SEED: u64 = 5381;

/// One combine step.
#[inline]
pub fn combine(h: u64, x: u64) -> u64 {
    h.wrapping_mul(33).wrapping_add(x)
}

/// Hash a single value with the default hasher.
#[inline]
pub fn hash_one<T: Hash>(v: &T) -> u64 {
    let mut h = DefaultHasher::default();
    v.hash(&mut h);
    h.finish()
}

#[inline]
pub fn hash_str(s: &str) -> u64 {
    hash_one(&s)
}
