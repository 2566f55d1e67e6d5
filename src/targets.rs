//! Critic training targets
use crate::config::{ConfigError, SamplingConfig};
use crate::envs::{EnvError, SimulatedModel};
use crate::Prng;
use ndarray::{Array2, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source of the action-value table the critic is fit to.
pub trait TargetSource {
    /// Action-value target for the current policy.
    ///
    /// # Args
    /// * `policy` - Current policy, shape `[num_states, num_actions]`.
    /// * `exact_q` - Exact action values of `policy`.
    fn q_target(
        &mut self,
        policy: ArrayView2<f64>,
        exact_q: ArrayView2<f64>,
    ) -> Result<Array2<f64>, EnvError>;
}

impl<T: TargetSource + ?Sized> TargetSource for Box<T> {
    fn q_target(
        &mut self,
        policy: ArrayView2<f64>,
        exact_q: ArrayView2<f64>,
    ) -> Result<Array2<f64>, EnvError> {
        (**self).q_target(policy, exact_q)
    }
}

/// Use the exact action values as the target.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ExactTarget;

impl TargetSource for ExactTarget {
    fn q_target(
        &mut self,
        _policy: ArrayView2<f64>,
        exact_q: ArrayView2<f64>,
    ) -> Result<Array2<f64>, EnvError> {
        Ok(exact_q.to_owned())
    }
}

/// Use Monte-Carlo estimates of the action values as the target.
#[derive(Debug, Clone)]
pub struct SampledTarget<'a, M: ?Sized> {
    pub sampler: MonteCarloSampler<'a, M>,
}

impl<'a, M: SimulatedModel + ?Sized> SampledTarget<'a, M> {
    pub fn new(sampler: MonteCarloSampler<'a, M>) -> Self {
        Self { sampler }
    }
}

impl<M: SimulatedModel + ?Sized> TargetSource for SampledTarget<'_, M> {
    fn q_target(
        &mut self,
        policy: ArrayView2<f64>,
        _exact_q: ArrayView2<f64>,
    ) -> Result<Array2<f64>, EnvError> {
        self.sampler.estimate_q(policy)
    }
}

/// Monte-Carlo action-value estimator.
///
/// For every state-action pair `(s, a)`, runs `rollouts` independent rollouts of `horizon`
/// transitions: the first from `s` taking `a`, the rest following the policy.
/// The estimate is the mean discounted return. Returns are truncated at the horizon.
#[derive(Debug, Clone)]
pub struct MonteCarloSampler<'a, M: ?Sized> {
    model: &'a M,
    rollouts: usize,
    horizon: usize,
    rng: Prng,
}

impl<'a, M: SimulatedModel + ?Sized> MonteCarloSampler<'a, M> {
    pub fn new(model: &'a M, rollouts: usize, horizon: usize, rng: Prng) -> Self {
        Self {
            model,
            rollouts,
            horizon,
            rng,
        }
    }

    /// Estimate the action values of a policy.
    ///
    /// # Errors
    /// If the policy shape does not match the model or a row is not a distribution.
    pub fn estimate_q(&mut self, policy: ArrayView2<f64>) -> Result<Array2<f64>, EnvError> {
        let num_states = self.model.num_states();
        let num_actions = self.model.num_actions();
        if policy.dim() != (num_states, num_actions) {
            return Err(EnvError::PolicyShape {
                got: policy.shape().to_vec(),
                num_states,
                num_actions,
            });
        }
        let action_samplers = policy
            .rows()
            .into_iter()
            .enumerate()
            .map(|(state, row)| {
                WeightedIndex::new(row.iter()).map_err(|_| EnvError::InvalidPolicy(state))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let discount_factor = self.model.discount_factor();
        let mut estimate = Array2::zeros((num_states, num_actions));
        for ((start_state, start_action), value) in estimate.indexed_iter_mut() {
            let mut total = 0.0;
            for _ in 0..self.rollouts {
                let mut state = start_state;
                let mut action = start_action;
                let mut discount = 1.0;
                for step in 0..self.horizon {
                    let (next_state, reward) = self.model.sample_step(state, action, &mut self.rng);
                    total += discount * reward;
                    discount *= discount_factor;
                    state = next_state;
                    if step + 1 < self.horizon {
                        action = action_samplers[state].sample(&mut self.rng);
                    }
                }
            }
            *value = total / self.rollouts.max(1) as f64;
        }
        Ok(estimate)
    }
}

/// How critic targets are obtained.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Exact action values from the model.
    #[serde(rename = "MB")]
    ModelBased,
    /// Monte-Carlo rollout estimates.
    #[serde(rename = "MC")]
    MonteCarlo,
}

impl SamplingMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ModelBased => "MB",
            Self::MonteCarlo => "MC",
        }
    }
}

impl fmt::Display for SamplingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SamplingMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MB" => Ok(Self::ModelBased),
            "MC" => Ok(Self::MonteCarlo),
            _ => Err(ConfigError::UnknownSamplingMode(s.into())),
        }
    }
}

impl SamplingConfig {
    /// Build the target source for a model.
    ///
    /// `rng` seeds the Monte-Carlo sampler and is unused for model-based targets.
    pub fn build_target<'a, M: SimulatedModel + ?Sized>(
        &self,
        model: &'a M,
        rng: Prng,
    ) -> Box<dyn TargetSource + 'a> {
        match self.mode {
            SamplingMode::ModelBased => Box::new(ExactTarget),
            SamplingMode::MonteCarlo => Box::new(SampledTarget::new(MonteCarloSampler::new(
                model,
                self.rollouts,
                self.horizon,
                rng,
            ))),
        }
    }
}
