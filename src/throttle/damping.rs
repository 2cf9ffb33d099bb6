use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::alert::AlertCandidate;
use crate::config::AlertConfig;

/// Source of uniform samples in `[0, 1)` for probabilistic suppression.
pub trait RandomSource: Send {
    fn next_f64(&mut self) -> f64;
}

#[derive(Debug)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&mut self) -> f64 {
        self.0
    }
}

/// Randomly drop damped alert types during business hours.
pub fn should_damp(
    config: &AlertConfig,
    alert: &AlertCandidate,
    hour: u32,
    rng: &mut dyn RandomSource,
) -> bool {
    let damping = &config.damping;
    if !damping.enabled || !config.business_hours.contains(hour) {
        return false;
    }
    if !damping.alert_types.iter().any(|t| alert.contains(t)) {
        return false;
    }
    rng.next_f64() < damping.probability
}
