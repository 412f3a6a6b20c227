use anyhow::{Result, ensure};

use crate::events::Category;
use crate::random::RandomSource;

/// Percentage of ticks that draw from the memory pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixRatio(u8);

impl MixRatio {
    pub fn new(percent: u8) -> Result<Self> {
        ensure!(percent <= 100, "mix ratio {percent} is outside 0..=100");
        Ok(Self(percent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixSelector {
    ratio: MixRatio,
}

impl MixSelector {
    pub fn new(ratio: MixRatio) -> Self {
        Self { ratio }
    }

    /// Memory with probability `ratio / 100`, recent otherwise.
    pub fn select_category(&self, rng: &mut dyn RandomSource) -> Category {
        match self.ratio.0 {
            0 => Category::Recent,
            100.. => Category::Memory,
            percent => {
                if rng.next_f64() * 100.0 < f64::from(percent) {
                    Category::Memory
                } else {
                    Category::Recent
                }
            }
        }
    }
}
