//! Pseudorandom ASCII payloads for the blast tests.
//!
//! Each worker task constructs its own generator: the letters-fast
//! algorithm consumes 63-bit random words incrementally and is not safe
//! for concurrent use.

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

// 6 bits index the 52-letter alphabet; a 63-bit word holds 10 indices.
const LETTER_IDX_BITS: u32 = 6;
const LETTER_IDX_MASK: u64 = (1 << LETTER_IDX_BITS) - 1;
const LETTER_IDX_MAX: u32 = 63 / LETTER_IDX_BITS;

/// Seedable source of random ASCII payloads. Single-producer: create one
/// per task that needs payloads.
#[derive(Debug)]
pub struct PayloadGenerator {
    rng: SmallRng,
}

impl PayloadGenerator {
    /// Create a generator seeded from the wall clock.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Self::with_seed(seed)
    }

    /// Create a generator with an explicit seed (deterministic tests).
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Generate `n` bytes drawn uniformly from the 52 ASCII letters.
    ///
    /// Uses the mask-and-discard optimisation: every 63-bit random word
    /// yields up to 10 six-bit candidate indices, and candidates >= 52
    /// are rejected rather than folded, which keeps the draw uniform.
    pub fn letters_fast(&mut self, n: usize) -> Vec<u8> {
        let mut out = vec![0u8; n];
        let mut cache = self.rng.next_u64() >> 1;
        let mut remain = LETTER_IDX_MAX;
        let mut i = 0;
        while i < n {
            if remain == 0 {
                cache = self.rng.next_u64() >> 1;
                remain = LETTER_IDX_MAX;
            }
            let idx = (cache & LETTER_IDX_MASK) as usize;
            if idx < LETTERS.len() {
                out[i] = LETTERS[idx];
                i += 1;
            }
            cache >>= LETTER_IDX_BITS;
            remain -= 1;
        }
        out
    }

    /// Generate `n` bytes drawn from an arbitrary `alphabet`, one modulo
    /// per byte. Slower than [`PayloadGenerator::letters_fast`] but works
    /// with any non-empty alphabet.
    ///
    /// # Panics
    ///
    /// Panics if `alphabet` is empty.
    pub fn from_alphabet(&mut self, n: usize, alphabet: &[u8]) -> Vec<u8> {
        assert!(!alphabet.is_empty(), "alphabet must not be empty");
        (0..n)
            .map(|_| alphabet[(self.rng.next_u64() % alphabet.len() as u64) as usize])
            .collect()
    }
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new()
    }
}
