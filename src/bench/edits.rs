//! Random edit material.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::config::DelayRange;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// Seedable source of words, positions and delays.
#[derive(Debug, Clone)]
pub struct WordGen {
    rng: StdRng,
}

impl WordGen {
    /// Deterministic when `seed` is set, entropy-seeded otherwise.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// An independent generator for another task.
    pub fn fork(&mut self) -> Self {
        Self {
            rng: StdRng::seed_from_u64(self.rng.next_u64()),
        }
    }

    /// `len` random lowercase letters.
    pub fn word(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| char::from(LETTERS[self.rng.gen_range(0..LETTERS.len())]))
            .collect()
    }

    /// A word whose length is drawn from `lo..=hi`.
    pub fn word_between(&mut self, lo: usize, hi: usize) -> String {
        let len = self.rng.gen_range(lo..=hi);
        self.word(len)
    }

    /// Space-separated words, exactly `len` characters long.
    pub fn text(&mut self, len: usize) -> String {
        let mut text = String::with_capacity(len + 10);
        while text.len() < len {
            if !text.is_empty() {
                text.push(' ');
            }
            let word = self.word_between(1, 10);
            text.push_str(&word);
        }
        text.truncate(len);
        text
    }

    /// A cursor position in a text of `len` characters.
    pub fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..=len)
    }

    pub fn delay(&mut self, range: DelayRange) -> Duration {
        Duration::from_millis(self.rng.gen_range(range.lo..=range.hi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generators_repeat() {
        let mut a = WordGen::new(Some(9));
        let mut b = WordGen::new(Some(9));
        assert_eq!(a.text(100), b.text(100));
        assert_eq!(a.fork().word(5), b.fork().word(5));
    }

    #[test]
    fn test_lengths() {
        let mut words = WordGen::new(Some(1));
        assert_eq!(words.text(100).chars().count(), 100);
        assert_eq!(words.text(0), "");
        assert_eq!(words.word(50_000).len(), 50_000);
        for _ in 0..100 {
            let w = words.word_between(1, 10);
            assert!((1..=10).contains(&w.len()));
            assert!(w.bytes().all(|b| b.is_ascii_lowercase()));
            assert!(words.index(3) <= 3);
        }
    }

    #[test]
    fn test_delay_within_range() {
        let mut words = WordGen::new(Some(3));
        let range = DelayRange { lo: 100, hi: 400 };
        for _ in 0..50 {
            let d = words.delay(range);
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(400));
        }
        assert_eq!(words.delay(DelayRange { lo: 0, hi: 0 }), Duration::ZERO);
    }
}
