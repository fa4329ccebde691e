//! Allocation-free randomness for the audio thread

/// Pre-seeded PRNG with a gaussian helper, safe to call from the realtime
/// path.
#[derive(Debug, Clone)]
pub struct RtRng {
    rng: fastrand::Rng,
}

impl RtRng {
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: fastrand::Rng::with_seed(seed) }
    }

    /// Uniform in `[0, 1)`.
    pub fn uniform(&mut self) -> f32 {
        self.rng.f32()
    }

    /// Gaussian with standard deviation `sigma`, polar Box-Muller form.
    ///
    /// The rejection loop accepts with probability ~0.785 per iteration, so
    /// the expected work is constant.
    pub fn gaussian(&mut self, sigma: f32) -> f32 {
        loop {
            let x1 = 2.0 * self.rng.f32() - 1.0;
            let x2 = 2.0 * self.rng.f32() - 1.0;
            let w = x1 * x1 + x2 * x2;
            if w > 0.0 && w < 1.0 {
                let w = ((-2.0 * w.ln()) / w).sqrt();
                return x1 * w * sigma;
            }
        }
    }
}
