//! Hyper-parameter schedules
use serde::{Deserialize, Serialize};

/// Divergence coefficient schedule for the MDPO actor.
///
/// A conservative `warmup_value` is used for the first `warmup_iterations` outer iterations,
/// then the configured `eta` exactly.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtaSchedule {
    pub eta: f64,
    pub warmup_value: f64,
    pub warmup_iterations: u64,
}

impl EtaSchedule {
    pub const fn new(eta: f64) -> Self {
        Self {
            eta,
            warmup_value: 0.01,
            warmup_iterations: 20,
        }
    }

    /// The coefficient to use at (zero-based) outer iteration `iteration`.
    pub fn eta_at(&self, iteration: u64) -> f64 {
        if iteration < self.warmup_iterations {
            self.warmup_value
        } else {
            self.eta
        }
    }
}

impl Default for EtaSchedule {
    fn default() -> Self {
        Self::new(0.1)
    }
}
