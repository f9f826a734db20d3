//! Zobrist keys for incremental position hashing.
//!
//! Keys are generated deterministically by chaining the standard library
//! hasher from a fixed seed, so hashes are stable across runs and
//! processes built from the same source.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use once_cell::sync::Lazy;

/// Largest supported board side.
pub const MAX_SIZE: usize = 25;

const POINTS: usize = MAX_SIZE * MAX_SIZE;

pub struct ZobristKeys {
    /// Keys indexed by [point][stone color].
    pub stones: [[u64; 2]; POINTS],
    /// XORed in when White is to move.
    pub white_to_move: u64,
}

impl ZobristKeys {
    fn new() -> Self {
        let mut seed = 0x5173_a9d3_0b1e_77c4u64;
        let mut next_key = || {
            let mut hasher = DefaultHasher::new();
            seed.hash(&mut hasher);
            seed = hasher.finish();
            seed
        };

        let mut keys = ZobristKeys {
            stones: [[0; 2]; POINTS],
            white_to_move: 0,
        };
        for point in 0..POINTS {
            for color in 0..2 {
                keys.stones[point][color] = next_key();
            }
        }
        keys.white_to_move = next_key();
        keys
    }
}

pub static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for point in 0..POINTS {
            for color in 0..2 {
                assert!(seen.insert(ZOBRIST.stones[point][color]));
            }
        }
        assert!(seen.insert(ZOBRIST.white_to_move));
    }
}
