use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of randomness for shuffles and mix draws.
///
/// Implementations only need `next_f64`; everything else derives from it so a
/// scripted source can force exact outcomes in tests.
pub trait RandomSource: Send {
    /// Uniform draw in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Uniform index in `0..upper`. `upper` must be non-zero.
    fn next_below(&mut self, upper: usize) -> usize {
        let scaled = (self.next_f64() * upper as f64) as usize;
        scaled.min(upper.saturating_sub(1))
    }
}

/// `StdRng`-backed source used in production.
#[derive(Debug, Clone)]
pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_os_rng() -> Self {
        Self(StdRng::from_os_rng())
    }

    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_os_rng(),
        }
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&mut self) -> f64 {
        self.0.random::<f64>()
    }

    fn next_below(&mut self, upper: usize) -> usize {
        self.0.random_range(0..upper.max(1))
    }
}

/// Replays a fixed list of draws, cycling when it runs out.
///
/// Values are clamped into `[0, 1)`.
#[derive(Debug, Clone)]
pub struct SequenceRandom {
    values: Vec<f64>,
    next: usize,
}

impl SequenceRandom {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        let mut values = values.into();
        if values.is_empty() {
            values.push(0.0);
        }
        Self { values, next: 0 }
    }

    /// `count` evenly spaced draws `0/count, 1/count, ..`, which makes the
    /// long-run frequency of any threshold test exact.
    pub fn evenly_spaced(count: usize) -> Self {
        let count = count.max(1);
        Self::new(
            (0..count)
                .map(|k| k as f64 / count as f64)
                .collect::<Vec<_>>(),
        )
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&mut self) -> f64 {
        let value = self.values[self.next % self.values.len()];
        self.next = self.next.wrapping_add(1);
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }
}

/// Fisher-Yates shuffle driven by a `RandomSource`.
pub fn shuffle<T>(items: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = rng.next_below(i + 1);
        items.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_shuffle_is_exact() {
        // i = 2 draws index 2 (stay), i = 1 draws index 0 (swap first two).
        let mut rng = SequenceRandom::new(vec![0.9, 0.0]);
        let mut items = vec!['a', 'b', 'c'];
        shuffle(&mut items, &mut rng);
        assert_eq!(items, vec!['b', 'a', 'c']);
    }

    #[test]
    fn seeded_shuffle_is_reproducible() {
        let mut a: Vec<u32> = (0..32).collect();
        let mut b = a.clone();
        shuffle(&mut a, &mut StdRandom::seeded(11));
        shuffle(&mut b, &mut StdRandom::seeded(11));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..32).collect::<Vec<_>>());
    }

    #[test]
    fn next_below_stays_in_range() {
        let mut rng = SequenceRandom::new(vec![0.0, 0.5, 0.999_999, 1.0]);
        for _ in 0..8 {
            assert!(rng.next_below(3) < 3);
        }
    }
}
