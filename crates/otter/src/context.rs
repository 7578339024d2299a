use otter_sparse::XorShift64Star;

/// Per-invocation state threaded through the layout routines.
///
/// Every random decision (initial placement, coarsening order, jitter, power-iteration seeds)
/// draws from the generator owned here, so two runs with the same seed produce the same layout.
#[derive(Debug, Clone)]
pub struct LayoutContext {
    rng: XorShift64Star,
}

impl LayoutContext {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: XorShift64Star::new(seed),
        }
    }

    pub fn rng(&mut self) -> &mut XorShift64Star {
        &mut self.rng
    }

    /// Uniform in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.next_f64()
    }

    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        self.rng.permutation(n)
    }

    /// Fills `x` with independent uniform samples in `[0, 1)`.
    pub fn fill_uniform(&mut self, x: &mut [f64]) {
        for v in x {
            *v = self.rng.next_f64();
        }
    }
}

impl Default for LayoutContext {
    fn default() -> Self {
        Self::new(123)
    }
}
