//! MDPs stored in lookup tables
use super::{Coordinates, EnvError, SimulatedModel, TabularModel};
use crate::utils::linalg;
use crate::Prng;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use rand::distributions::Distribution;
use rand_distr::WeightedAliasIndex;

const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// An MDP with transition and reward functions stored in lookup tables.
///
/// Rewards are deterministic given the state and action.
/// Terminal states are modelled as absorbing states with zero reward.
#[derive(Debug, Clone)]
pub struct TabularMdp {
    /// Transition probabilities `transitions[s, a, s'] = P(s' | s, a)`.
    transitions: Array3<f64>,
    /// Expected step reward `rewards[s, a]`.
    rewards: Array2<f64>,
    discount_factor: f64,
    initial_distribution: Array1<f64>,
    coordinates: Vec<Coordinates>,
    /// Successor samplers, indexed by `s * num_actions + a`.
    successors: Vec<WeightedAliasIndex<f64>>,
}

impl TabularMdp {
    /// Create a new tabular MDP.
    ///
    /// # Args
    /// * `transitions` - `[S, A, S]` successor probabilities.
    /// * `rewards` - `[S, A]` step rewards.
    /// * `discount_factor` - In `[0, 1)`.
    /// * `initial_distribution` - `[S]` initial state probabilities.
    /// * `coordinates` - Normalized coordinates of each state (for featurization).
    ///
    /// # Errors
    /// If any table has the wrong shape or a distribution does not sum to one.
    pub fn new(
        transitions: Array3<f64>,
        rewards: Array2<f64>,
        discount_factor: f64,
        initial_distribution: Array1<f64>,
        coordinates: Vec<Coordinates>,
    ) -> Result<Self, EnvError> {
        let (num_states, num_actions, _) = transitions.dim();
        if transitions.dim() != (num_states, num_actions, num_states) {
            return Err(EnvError::ShapeMismatch {
                name: "transitions",
                got: transitions.shape().to_vec(),
                expected: vec![num_states, num_actions, num_states],
            });
        }
        if rewards.dim() != (num_states, num_actions) {
            return Err(EnvError::ShapeMismatch {
                name: "rewards",
                got: rewards.shape().to_vec(),
                expected: vec![num_states, num_actions],
            });
        }
        if initial_distribution.len() != num_states {
            return Err(EnvError::ShapeMismatch {
                name: "initial_distribution",
                got: initial_distribution.shape().to_vec(),
                expected: vec![num_states],
            });
        }
        if coordinates.len() != num_states {
            return Err(EnvError::ShapeMismatch {
                name: "coordinates",
                got: vec![coordinates.len()],
                expected: vec![num_states],
            });
        }
        if !(0.0..1.0).contains(&discount_factor) {
            return Err(EnvError::InvalidDiscountFactor(discount_factor));
        }
        let initial_sum = initial_distribution.sum();
        if (initial_sum - 1.0).abs() > PROBABILITY_TOLERANCE
            || initial_distribution.iter().any(|p| *p < 0.0)
        {
            return Err(EnvError::InvalidInitialDistribution(initial_sum));
        }

        let mut successors = Vec::with_capacity(num_states * num_actions);
        for state in 0..num_states {
            for action in 0..num_actions {
                let probs = transitions.slice(s![state, action, ..]);
                let sum = probs.sum();
                if (sum - 1.0).abs() > PROBABILITY_TOLERANCE || probs.iter().any(|p| *p < 0.0) {
                    return Err(EnvError::NotStochastic { state, action, sum });
                }
                successors.push(WeightedAliasIndex::new(probs.to_vec())?);
            }
        }

        Ok(Self {
            transitions,
            rewards,
            discount_factor,
            initial_distribution,
            coordinates,
            successors,
        })
    }

    /// Transition probabilities `[S, A, S]`.
    pub fn transitions(&self) -> ArrayView3<f64> {
        self.transitions.view()
    }

    /// Step rewards `[S, A]`.
    pub fn rewards(&self) -> ArrayView2<f64> {
        self.rewards.view()
    }

    fn check_policy(&self, policy: ArrayView2<f64>) -> Result<(), EnvError> {
        if policy.dim() != (self.num_states(), self.num_actions()) {
            return Err(EnvError::PolicyShape {
                got: policy.shape().to_vec(),
                num_states: self.num_states(),
                num_actions: self.num_actions(),
            });
        }
        for (state, row) in policy.rows().into_iter().enumerate() {
            if (row.sum() - 1.0).abs() > PROBABILITY_TOLERANCE || row.iter().any(|p| !(*p >= 0.0))
            {
                return Err(EnvError::InvalidPolicy(state));
            }
        }
        Ok(())
    }

    /// State transition matrix `P_pi[s, s']` and expected rewards `r_pi[s]` under a policy.
    fn policy_dynamics(&self, policy: ArrayView2<f64>) -> (Array2<f64>, Array1<f64>) {
        let num_states = self.num_states();
        let mut p_pi = Array2::zeros((num_states, num_states));
        for (state, mut row) in p_pi.rows_mut().into_iter().enumerate() {
            row.assign(&policy.row(state).dot(&self.transitions.index_axis(Axis(0), state)));
        }
        let r_pi = (&policy * &self.rewards).sum_axis(Axis(1));
        (p_pi, r_pi)
    }

    /// `I - gamma * P_pi`
    fn resolvent_system(&self, p_pi: &Array2<f64>) -> Array2<f64> {
        Array2::eye(self.num_states()) - p_pi * self.discount_factor
    }

    /// `Q = r + gamma * P V`
    fn q_from_v(&self, v: ArrayView1<f64>) -> Array2<f64> {
        Array2::from_shape_fn(self.rewards.dim(), |(s, a)| {
            self.rewards[(s, a)]
                + self.discount_factor * self.transitions.slice(s![s, a, ..]).dot(&v)
        })
    }
}

impl TabularModel for TabularMdp {
    fn num_states(&self) -> usize {
        self.transitions.len_of(Axis(0))
    }

    fn num_actions(&self) -> usize {
        self.transitions.len_of(Axis(1))
    }

    fn discount_factor(&self) -> f64 {
        self.discount_factor
    }

    fn initial_distribution(&self) -> ArrayView1<f64> {
        self.initial_distribution.view()
    }

    fn state_coordinates(&self, state: usize) -> Coordinates {
        self.coordinates[state].clone()
    }

    fn calc_vpi(&self, policy: ArrayView2<f64>) -> Result<Array1<f64>, EnvError> {
        self.check_policy(policy)?;
        let (p_pi, r_pi) = self.policy_dynamics(policy);
        let system = self.resolvent_system(&p_pi);
        Ok(linalg::solve(system.view(), r_pi.view())?)
    }

    fn calc_qpi(&self, policy: ArrayView2<f64>) -> Result<Array2<f64>, EnvError> {
        let v = self.calc_vpi(policy)?;
        Ok(self.q_from_v(v.view()))
    }

    fn calc_dpi(&self, policy: ArrayView2<f64>) -> Result<Array1<f64>, EnvError> {
        self.check_policy(policy)?;
        let (p_pi, _) = self.policy_dynamics(policy);
        // d^T (I - gamma P_pi) = (1 - gamma) mu^T
        let system = self.resolvent_system(&p_pi).reversed_axes();
        let mut d = linalg::solve(system.view(), self.initial_distribution.view())?;
        d *= 1.0 - self.discount_factor;
        let total = d.sum();
        if total > 0.0 {
            d /= total;
        }
        Ok(d)
    }

    fn evaluate_policy(
        &self,
        policy: ArrayView2<f64>,
    ) -> Result<super::PolicyEvaluation, EnvError> {
        let v = self.calc_vpi(policy)?;
        let q = self.q_from_v(v.view());
        let visitation = self.calc_dpi(policy)?;
        let advantage = &q - &v.view().insert_axis(Axis(1));
        let expected_return = self.initial_distribution.dot(&v);
        Ok(super::PolicyEvaluation {
            q,
            v,
            advantage,
            visitation,
            expected_return,
        })
    }
}

impl SimulatedModel for TabularMdp {
    fn sample_step(&self, state: usize, action: usize, rng: &mut Prng) -> (usize, f64) {
        let next_state = self.successors[state * self.num_actions() + action].sample(rng);
        (next_state, self.rewards[(state, action)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::{BuildModel, TwoStateMdp};
    use ndarray::{array, Array};
    use rand::SeedableRng;

    fn uniform(num_states: usize, num_actions: usize) -> Array2<f64> {
        Array::from_elem((num_states, num_actions), 1.0 / num_actions as f64)
    }

    #[test]
    fn two_state_uniform_values() {
        // Hand-solved Bellman equations for the uniform policy:
        // V0 = 0.45 V0 + 0.5 + 0.45 V1
        // V1 = 1 + 0.45 V1 + 0.45 V0
        let model = TwoStateMdp::default().build_model().unwrap();
        let v = model.calc_vpi(uniform(2, 2).view()).unwrap();
        let v0 = (0.5 * 0.55 + 0.45) / (0.55 * 0.55 - 0.45 * 0.45);
        let v1 = (1.0 + 0.45 * v0) / 0.55;
        assert!((v[0] - v0).abs() < 1e-10, "{} != {}", v[0], v0);
        assert!((v[1] - v1).abs() < 1e-10, "{} != {}", v[1], v1);
    }

    #[test]
    fn q_is_consistent_with_v() {
        let model = TwoStateMdp::default().build_model().unwrap();
        let policy = array![[0.3, 0.7], [0.9, 0.1]];
        let v = model.calc_vpi(policy.view()).unwrap();
        let q = model.calc_qpi(policy.view()).unwrap();
        let v_from_q = (&policy * &q).sum_axis(Axis(1));
        for (a, b) in v.iter().zip(&v_from_q) {
            assert!((a - b).abs() < 1e-10);
        }
    }

    #[test]
    fn visitation_is_a_distribution() {
        let model = TwoStateMdp::default().build_model().unwrap();
        let d = model.calc_dpi(array![[0.2, 0.8], [0.5, 0.5]].view()).unwrap();
        assert!((d.sum() - 1.0).abs() < 1e-12);
        assert!(d.iter().all(|p| *p > 0.0));
    }

    #[test]
    fn visitation_of_never_leaving_start() {
        // Always staying in state 0 never visits state 1
        let model = TwoStateMdp::default().build_model().unwrap();
        let d = model.calc_dpi(array![[1.0, 0.0], [1.0, 0.0]].view()).unwrap();
        assert!((d[0] - 1.0).abs() < 1e-12);
        assert!(d[1].abs() < 1e-12);
    }

    #[test]
    fn evaluation_advantage_is_mean_zero() {
        let model = TwoStateMdp::default().build_model().unwrap();
        let policy = array![[0.4, 0.6], [0.25, 0.75]];
        let eval = model.evaluate_policy(policy.view()).unwrap();
        let mean = (&policy * &eval.advantage).sum_axis(Axis(1));
        assert!(mean.iter().all(|m| m.abs() < 1e-10));
        assert!((eval.expected_return - eval.v[0]).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_stochastic_transitions() {
        let transitions = Array3::from_elem((1, 1, 1), 0.5);
        let result = TabularMdp::new(
            transitions,
            Array2::zeros((1, 1)),
            0.9,
            array![1.0],
            vec![Coordinates::from_slice(&[0.0])],
        );
        assert!(matches!(
            result,
            Err(EnvError::NotStochastic {
                state: 0,
                action: 0,
                ..
            })
        ));
    }

    #[test]
    fn rejects_discount_of_one() {
        let result = TabularMdp::new(
            Array3::ones((1, 1, 1)),
            Array2::zeros((1, 1)),
            1.0,
            array![1.0],
            vec![Coordinates::from_slice(&[0.0])],
        );
        assert_eq!(result.unwrap_err(), EnvError::InvalidDiscountFactor(1.0));
    }

    #[test]
    fn rejects_bad_policy() {
        let model = TwoStateMdp::default().build_model().unwrap();
        assert_eq!(
            model.calc_vpi(array![[0.5, 0.6], [0.5, 0.5]].view()),
            Err(EnvError::InvalidPolicy(0))
        );
        assert!(matches!(
            model.calc_vpi(uniform(3, 2).view()),
            Err(EnvError::PolicyShape { .. })
        ));
    }

    #[test]
    fn sample_step_follows_transitions() {
        let model = TwoStateMdp::default().build_model().unwrap();
        let mut rng = Prng::seed_from_u64(1);
        // Deterministic dynamics: action 1 switches state
        for _ in 0..10 {
            assert_eq!(model.sample_step(0, 1, &mut rng), (1, 1.0));
            assert_eq!(model.sample_step(1, 0, &mut rng), (1, 2.0));
        }
    }
}
