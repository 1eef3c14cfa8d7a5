use rand::Rng;

use crate::models::Offer;

/// Source of the uniform pick among eligible offers.
///
/// Production uses [`ThreadRandom`]; tests plug in something deterministic.
pub trait RandomSource: Send + Sync {
    /// Returns an index in `0..len`. Never called with `len == 0`.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform pick from the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn pick(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Always picks the same position, clamped to the slice.
#[derive(Debug, Clone, Copy)]
pub struct FixedIndex(pub usize);

impl RandomSource for FixedIndex {
    fn pick(&self, len: usize) -> usize {
        self.0.min(len - 1)
    }
}

/// Pick one offer uniformly. `None` only for an empty slice.
pub fn select_offer<'a>(offers: &'a [Offer], random: &dyn RandomSource) -> Option<&'a Offer> {
    if offers.is_empty() {
        return None;
    }
    let idx = random.pick(offers.len());
    // An out-of-range source falls back to the last offer rather than panicking.
    offers.get(idx).or_else(|| offers.last())
}
