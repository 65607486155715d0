//! Candidate id generation

use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Produces candidate id strings. Uniqueness is checked by the caller.
pub trait IdGenerator: Send {
    fn candidate(&mut self) -> String;
}

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Lowercase alphanumeric ids of a fixed length.
#[derive(Debug)]
pub struct RandomIdGenerator {
    rng: StdRng,
    length: usize,
    index: Uniform<usize>,
}

impl RandomIdGenerator {
    pub const DEFAULT_LENGTH: usize = 12;

    pub fn new(length: usize) -> Self {
        Self::from_rng(StdRng::from_entropy(), length)
    }

    /// Deterministic generator for reproducible tests.
    pub fn seeded(seed: u64, length: usize) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed), length)
    }

    fn from_rng(rng: StdRng, length: usize) -> Self {
        Self {
            rng,
            length,
            index: Uniform::from(0..ALPHABET.len()),
        }
    }
}

impl Default for RandomIdGenerator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LENGTH)
    }
}

impl IdGenerator for RandomIdGenerator {
    fn candidate(&mut self) -> String {
        (0..self.length)
            .map(|_| ALPHABET[self.index.sample(&mut self.rng)] as char)
            .collect()
    }
}
