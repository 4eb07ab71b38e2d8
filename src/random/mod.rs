//! Named, independently seeded random number streams.
//!
//! Streams are never carried from one day to the next. Each call to
//! [`RandomStreams::get_rng`] derives a fresh generator from the base seed, the stream name and
//! a tuple of keys (typically the simulation day and, for contact draws, the container id). A run
//! restored from a day-boundary snapshot therefore draws exactly the numbers the uninterrupted
//! run would have drawn, and containers could be processed in any order without changing their
//! draws.
mod macros;

pub use macros::define_rng;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::hashing::hash_keys;
use crate::rand::SeedableRng;

pub trait RngId: Copy + Clone {
    type RngType: SeedableRng;
    fn get_name() -> &'static str;
}

/// The per-run source of every random stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomStreams {
    base_seed: u64,
}

impl RandomStreams {
    #[must_use]
    pub fn new(base_seed: u64) -> Self {
        RandomStreams { base_seed }
    }

    #[must_use]
    pub fn base_seed(&self) -> u64 {
        self.base_seed
    }

    /// Returns the generator for `R` keyed by `keys`. Equal keys always yield equal streams.
    pub fn get_rng<R: RngId>(&self, _rng_id: R, keys: &[u64]) -> R::RngType {
        let seed = hash_keys(self.base_seed, R::get_name(), keys);
        trace!(
            "creating RNG {} (base seed={}, keys={:?})",
            R::get_name(),
            self.base_seed,
            keys
        );
        R::RngType::seed_from_u64(seed)
    }

    /// The stream for `R` on simulation day `day`.
    pub fn day_rng<R: RngId>(&self, rng_id: R, day: u32) -> R::RngType {
        self.get_rng(rng_id, &[u64::from(day)])
    }
}
