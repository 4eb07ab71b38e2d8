//! This module provides deterministic `HashMap` and `HashSet` variants and the seed hashing used
//! by [`crate::random`]. The hashing data structures in the standard library are not
//! deterministic:
//!
//! > By default, HashMap uses a hashing algorithm selected to provide
//! > resistance against HashDoS attacks. The algorithm is randomly seeded, and a
//! > reasonable best-effort is made to generate this seed from a high quality,
//! > secure source of randomness provided by the host without blocking the program.
//!
//! Use `HashMap::default()` to create a new map with the default hasher. The `HashMapExt` and
//! `HashSetExt` traits provide `new` and `with_capacity` if you want the standard API.
//!
//! Iteration order of these maps is still arbitrary. Anything that consumes random numbers
//! iterates in sorted id order instead.

use xxhash_rust::xxh3::{xxh3_64, xxh3_64_with_seed};

pub use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub trait HashMapExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<K, V> HashMapExt for HashMap<K, V> {
    fn new() -> Self {
        HashMap::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
    }
}

pub trait HashSetExt {
    fn new() -> Self;
    fn with_capacity(capacity: usize) -> Self;
}

impl<T> HashSetExt for HashSet<T> {
    fn new() -> Self {
        HashSet::default()
    }

    fn with_capacity(capacity: usize) -> Self {
        HashSet::with_capacity_and_hasher(capacity, rustc_hash::FxBuildHasher)
    }
}

/// A convenience method to compute the hash of a `&str`.
pub fn hash_str(data: &str) -> u64 {
    xxh3_64(data.as_bytes())
}

/// Hashes a label together with a sequence of integer keys under `seed`. Used to derive
/// independent random streams for (stream, day, container) and similar key tuples.
pub fn hash_keys(seed: u64, label: &str, keys: &[u64]) -> u64 {
    let mut buffer = Vec::with_capacity(label.len() + keys.len() * 8);
    buffer.extend_from_slice(label.as_bytes());
    for key in keys {
        buffer.extend_from_slice(&key.to_le_bytes());
    }
    xxh3_64_with_seed(&buffer, seed)
}

/// Maps a hash onto `[0, 1)` using its upper 53 bits.
#[allow(clippy::cast_precision_loss)]
pub fn hash_to_unit(hash: u64) -> f64 {
    (hash >> 11) as f64 / (1u64 << 53) as f64
}
