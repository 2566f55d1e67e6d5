//! Tabular environments with exact policy evaluation
mod grid;
mod synthetic;
mod tabular;

pub use grid::{CliffWorld, FrozenLake, GridAction};
pub use synthetic::TwoStateMdp;
pub use tabular::TabularMdp;

use crate::utils::linalg::LinalgError;
use crate::Prng;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::WeightedError;
use smallvec::SmallVec;
use thiserror::Error;

/// State coordinates used for featurization.
pub type Coordinates = SmallVec<[f64; 2]>;

/// A finite MDP whose policy values can be computed exactly.
///
/// Policies are `[num_states, num_actions]` arrays of action probabilities.
pub trait TabularModel {
    fn num_states(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Discount factor in `[0, 1)`.
    fn discount_factor(&self) -> f64;

    /// Initial state distribution.
    fn initial_distribution(&self) -> ArrayView1<f64>;

    /// Coordinates of a state, each normalized to `[0, 1]`.
    fn state_coordinates(&self, state: usize) -> Coordinates;

    /// State values `V^pi`.
    fn calc_vpi(&self, policy: ArrayView2<f64>) -> Result<Array1<f64>, EnvError>;

    /// State-action values `Q^pi`.
    fn calc_qpi(&self, policy: ArrayView2<f64>) -> Result<Array2<f64>, EnvError>;

    /// Normalized discounted state visitation distribution `d^pi`.
    fn calc_dpi(&self, policy: ArrayView2<f64>) -> Result<Array1<f64>, EnvError>;

    /// All exact quantities of a policy at once.
    fn evaluate_policy(&self, policy: ArrayView2<f64>) -> Result<PolicyEvaluation, EnvError> {
        let q = self.calc_qpi(policy)?;
        let v = self.calc_vpi(policy)?;
        let visitation = self.calc_dpi(policy)?;
        let advantage = &q - &v.view().insert_axis(Axis(1));
        let expected_return = self.initial_distribution().dot(&v);
        Ok(PolicyEvaluation {
            q,
            v,
            advantage,
            visitation,
            expected_return,
        })
    }
}

/// A tabular model that can also be simulated one transition at a time.
pub trait SimulatedModel: TabularModel {
    /// Sample a transition from `state` taking `action`.
    ///
    /// # Returns
    /// The successor state and the step reward.
    fn sample_step(&self, state: usize, action: usize, rng: &mut Prng) -> (usize, f64);
}

/// Exact values of a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyEvaluation {
    /// `Q^pi`, shape `[num_states, num_actions]`.
    pub q: Array2<f64>,
    /// `V^pi`, shape `[num_states]`.
    pub v: Array1<f64>,
    /// `A^pi = Q^pi - V^pi`.
    pub advantage: Array2<f64>,
    /// Discounted state visitation distribution.
    pub visitation: Array1<f64>,
    /// `J = <initial distribution, V^pi>`.
    pub expected_return: f64,
}

/// Builds a tabular model.
pub trait BuildModel {
    type Model: SimulatedModel;

    /// Build a model instance.
    fn build_model(&self) -> Result<Self::Model, EnvError>;
}

/// Error building or evaluating a tabular model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("{name} has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    #[error("transition probabilities from state {state} with action {action} sum to {sum}")]
    NotStochastic { state: usize, action: usize, sum: f64 },
    #[error("initial state distribution sums to {0}")]
    InvalidInitialDistribution(f64),
    #[error("discount factor {0} is not in [0, 1)")]
    InvalidDiscountFactor(f64),
    #[error("policy row for state {0} is not a probability distribution")]
    InvalidPolicy(usize),
    #[error("policy has shape {got:?}, expected [{num_states}, {num_actions}]")]
    PolicyShape {
        got: Vec<usize>,
        num_states: usize,
        num_actions: usize,
    },
    #[error(transparent)]
    Linalg(#[from] LinalgError),
    #[error(transparent)]
    Weighted(#[from] WeightedError),
}
