//! Mirror descent policy optimization over a softmax-linear policy
use super::{log_softmax_rows, normalize_weights, softmax_rows};
use crate::config::ConfigError;
use crate::features::FeatureMatrix;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration of the MDPO inner solver.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdpoConfig {
    /// Maximum number of inner gradient ascent steps per policy update
    pub max_inner_iters: u64,
    /// Initial (largest) step size of the backtracking line search
    pub max_step_size: f64,
    /// Stop once the parameter gradient norm falls below this value
    pub stop_grad_threshold: f64,
    /// Backtrack ratio for backtracking line search
    pub backtrack_ratio: f64,
    /// Armijo sufficient increase coefficient
    pub sufficient_increase: f64,
    /// Give up the line search once the step size falls below this value
    pub min_step_size: f64,
}

impl Default for MdpoConfig {
    fn default() -> Self {
        Self {
            max_inner_iters: 10_000,
            max_step_size: 1000.0,
            stop_grad_threshold: 1e-4,
            backtrack_ratio: 0.9,
            sufficient_increase: 0.5,
            min_step_size: 1e-12,
        }
    }
}

impl MdpoConfig {
    /// Check that every option is usable.
    ///
    /// # Errors
    /// [`ConfigError::InvalidOption`] naming the first invalid option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |name: &'static str, value: f64| ConfigError::InvalidOption {
            name,
            value: value.to_string(),
        };
        if !(self.max_step_size.is_finite() && self.max_step_size > 0.0) {
            return Err(invalid("actor_max_step_size", self.max_step_size));
        }
        if !(self.stop_grad_threshold >= 0.0) {
            return Err(invalid("actor_stop_grad_threshold", self.stop_grad_threshold));
        }
        if !(self.backtrack_ratio > 0.0 && self.backtrack_ratio < 1.0) {
            return Err(invalid("actor_backtrack_ratio", self.backtrack_ratio));
        }
        if !(self.sufficient_increase > 0.0 && self.sufficient_increase < 1.0) {
            return Err(invalid("actor_sufficient_increase", self.sufficient_increase));
        }
        if !(self.min_step_size > 0.0 && self.min_step_size <= self.max_step_size) {
            return Err(invalid("actor_min_step_size", self.min_step_size));
        }
        Ok(())
    }
}

/// Why the inner solve stopped.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InnerTermination {
    /// The gradient norm fell below the stopping threshold.
    Converged,
    /// The iteration budget ran out.
    BudgetExhausted,
    /// No step size satisfied the sufficient increase condition.
    LineSearchFailed,
}

impl InnerTermination {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Converged => "converged",
            Self::BudgetExhausted => "budget_exhausted",
            Self::LineSearchFailed => "line_search_failed",
        }
    }
}

impl fmt::Display for InnerTermination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one policy update.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct InnerSolve {
    pub termination: InnerTermination,
    /// Number of accepted ascent steps.
    pub iterations: u64,
    /// Parameter gradient norm at the final iterate.
    pub grad_norm: f64,
    /// Regularized objective at the starting parameters.
    pub objective_start: f64,
    /// Regularized objective at the final iterate.
    pub objective_end: f64,
}

/// Softmax policy over linear state-action features, updated by MDPO.
///
/// `pi(a|s) = softmax_a(phi(s, a) . theta)`
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxLinearActor {
    features: FeatureMatrix,
    theta: Array1<f64>,
    eta: f64,
    config: MdpoConfig,
}

impl SoftmaxLinearActor {
    /// Create a new actor.
    ///
    /// # Panics
    /// If the length of `theta` differs from the feature dimension.
    pub fn new(features: FeatureMatrix, theta: Array1<f64>, eta: f64, config: MdpoConfig) -> Self {
        assert_eq!(
            theta.len(),
            features.dim(),
            "parameter length must match the feature dimension"
        );
        Self {
            features,
            theta,
            eta,
            config,
        }
    }

    pub fn theta(&self) -> ArrayView1<f64> {
        self.theta.view()
    }

    pub const fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub const fn config(&self) -> &MdpoConfig {
        &self.config
    }

    pub const fn eta(&self) -> f64 {
        self.eta
    }

    /// Set the divergence coefficient used by subsequent updates.
    pub fn set_eta(&mut self, eta: f64) {
        self.eta = eta;
    }

    /// Action probabilities of the current policy, shape `[num_states, num_actions]`.
    pub fn current_policy(&self) -> Array2<f64> {
        softmax_rows(self.features.scores(self.theta.view()).view())
    }

    /// Proximal policy update towards an advantage estimate.
    ///
    /// Approximately maximizes
    /// `sum_s d(s) [sum_a pi(a|s) A(s, a) - (1 / eta) KL(pi(.|s) || pi_old(.|s))]`
    /// over the parameters by gradient ascent with Armijo backtracking,
    /// where `pi_old` is the policy before the update.
    /// The last iterate is always kept, whether or not the solve converged.
    ///
    /// # Args
    /// * `advantage` - Advantage estimate, shape `[num_states, num_actions]`.
    /// * `visitation` - State weighting `d`; normalized internally.
    pub fn update_policy_param(
        &mut self,
        advantage: ArrayView2<f64>,
        visitation: ArrayView1<f64>,
    ) -> InnerSolve {
        let problem = ProximalObjective {
            features: &self.features,
            advantage,
            weights: normalize_weights(visitation),
            old_log_policy: log_softmax_rows(self.features.scores(self.theta.view()).view()),
            inv_eta: self.eta.recip(),
        };
        let mut solver = InnerSolver::new(&problem, self.theta.clone(), &self.config);
        let termination = solver.run();
        let InnerSolver {
            theta,
            point,
            iterations,
            objective_start,
            ..
        } = solver;
        self.theta = theta;
        InnerSolve {
            termination,
            iterations,
            grad_norm: point.grad_norm,
            objective_start,
            objective_end: point.objective,
        }
    }
}

/// The regularized policy improvement objective for one update.
struct ProximalObjective<'a, 'v> {
    features: &'a FeatureMatrix,
    advantage: ArrayView2<'v, f64>,
    weights: Array1<f64>,
    old_log_policy: Array2<f64>,
    inv_eta: f64,
}

/// Objective value and parameter gradient at one point.
struct Evaluation {
    objective: f64,
    gradient: Array1<f64>,
    grad_norm: f64,
}

impl ProximalObjective<'_, '_> {
    /// Per state-action surrogate `g = A - (1 / eta) (log pi - log pi_old)` and the policy.
    fn surrogate(&self, theta: ArrayView1<f64>) -> (Array2<f64>, Array2<f64>) {
        let log_policy = log_softmax_rows(self.features.scores(theta).view());
        let mut surrogate = &log_policy - &self.old_log_policy;
        surrogate *= -self.inv_eta;
        surrogate += &self.advantage;
        (log_policy.mapv_into(f64::exp), surrogate)
    }

    fn objective(&self, theta: ArrayView1<f64>) -> f64 {
        let (policy, surrogate) = self.surrogate(theta);
        (&policy * &surrogate).sum_axis(Axis(1)).dot(&self.weights)
    }

    fn evaluate(&self, theta: ArrayView1<f64>) -> Evaluation {
        let (policy, surrogate) = self.surrogate(theta);
        let baseline = (&policy * &surrogate).sum_axis(Axis(1));
        let objective = baseline.dot(&self.weights);

        // d/dz_sa = d(s) pi(a|s) (g_sa - sum_b pi(b|s) g_sb)
        let mut logit_grad = surrogate;
        Zip::from(logit_grad.rows_mut())
            .and(policy.rows())
            .and(&baseline)
            .and(&self.weights)
            .for_each(|mut g, p, &b, &w| {
                g -= b;
                g *= &p;
                g *= w;
            });
        let gradient = self.features.project(logit_grad.view());
        let grad_norm = gradient.dot(&gradient).sqrt();
        Evaluation {
            objective,
            gradient,
            grad_norm,
        }
    }
}

/// Inner solver states.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum InnerState {
    /// Check the stopping criteria at the current iterate.
    Check,
    /// Search for a step along the gradient.
    LineSearch,
    Done(InnerTermination),
}

struct InnerSolver<'a, 'b, 'c> {
    problem: &'a ProximalObjective<'b, 'c>,
    config: &'a MdpoConfig,
    theta: Array1<f64>,
    point: Evaluation,
    iterations: u64,
    objective_start: f64,
}

impl<'a, 'b, 'c> InnerSolver<'a, 'b, 'c> {
    fn new(
        problem: &'a ProximalObjective<'b, 'c>,
        theta: Array1<f64>,
        config: &'a MdpoConfig,
    ) -> Self {
        let point = problem.evaluate(theta.view());
        let objective_start = point.objective;
        Self {
            problem,
            config,
            theta,
            point,
            iterations: 0,
            objective_start,
        }
    }

    fn run(&mut self) -> InnerTermination {
        let mut state = InnerState::Check;
        loop {
            state = match state {
                InnerState::Check => self.check(),
                InnerState::LineSearch => self.line_search(),
                InnerState::Done(termination) => return termination,
            }
        }
    }

    fn check(&self) -> InnerState {
        if self.point.grad_norm < self.config.stop_grad_threshold {
            InnerState::Done(InnerTermination::Converged)
        } else if self.iterations >= self.config.max_inner_iters {
            InnerState::Done(InnerTermination::BudgetExhausted)
        } else {
            InnerState::LineSearch
        }
    }

    /// Armijo backtracking: accept the first step `alpha` from the maximum step size down with
    /// `L(theta + alpha grad) >= L(theta) + c alpha |grad|^2`.
    fn line_search(&mut self) -> InnerState {
        let sq_norm = self.point.grad_norm * self.point.grad_norm;
        let mut step_size = self.config.max_step_size;
        while step_size >= self.config.min_step_size {
            let candidate = &self.theta + &(&self.point.gradient * step_size);
            let objective = self.problem.objective(candidate.view());
            // NaN objectives fail the comparison and backtrack
            if objective
                >= self.point.objective + self.config.sufficient_increase * step_size * sq_norm
            {
                self.point = self.problem.evaluate(candidate.view());
                self.theta = candidate;
                self.iterations += 1;
                return InnerState::Check;
            }
            step_size *= self.config.backtrack_ratio;
        }
        InnerState::Done(InnerTermination::LineSearchFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::{BuildModel, TabularModel, TwoStateMdp};
    use crate::features::{TileCoder, TileCodingConfig};
    use ndarray::{array, Array};
    use rstest::{fixture, rstest};

    /// One-hot features for 2 states x 2 actions.
    #[fixture]
    fn tabular_actor() -> SoftmaxLinearActor {
        let model = TwoStateMdp::default().build_model().unwrap();
        let mut coder = TileCoder::new(TileCodingConfig::new(4, 1, 2));
        let features = FeatureMatrix::build(&mut coder, &model);
        SoftmaxLinearActor::new(
            features,
            array![0.1, -0.2, 0.05, 0.3],
            0.1,
            MdpoConfig {
                max_inner_iters: 200,
                max_step_size: 10.0,
                ..MdpoConfig::default()
            },
        )
    }

    /// Features shared between states, so the policy is not tabular.
    fn shared_actor(config: MdpoConfig) -> SoftmaxLinearActor {
        let phi = array![
            [1.0, 0.0, 0.5],
            [0.0, 1.0, 0.5],
            [1.0, 1.0, 0.0],
            [0.0, 0.5, 1.0],
            [0.3, 0.0, 1.0],
            [1.0, 0.2, 0.0]
        ];
        SoftmaxLinearActor::new(
            FeatureMatrix::from_rows(phi, 2, 3),
            array![0.2, -0.1, 0.4],
            1.0,
            config,
        )
    }

    #[rstest]
    fn policy_rows_are_distributions(tabular_actor: SoftmaxLinearActor) {
        let policy = tabular_actor.current_policy();
        assert_eq!(policy.dim(), (2, 2));
        for row in policy.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-8);
            assert!(row.iter().all(|p| *p > 0.0));
        }
    }

    #[rstest]
    fn update_moves_towards_advantage(mut tabular_actor: SoftmaxLinearActor) {
        let before = tabular_actor.current_policy();
        let advantage = array![[-1.0, 1.0], [1.0, -1.0]];
        let solve = tabular_actor.update_policy_param(advantage.view(), array![0.5, 0.5].view());
        let after = tabular_actor.current_policy();
        assert!(after[(0, 1)] > before[(0, 1)]);
        assert!(after[(1, 0)] > before[(1, 0)]);
        assert!(solve.objective_end >= solve.objective_start);
        for row in after.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-8);
            assert!(row.iter().all(|p| *p > 0.0));
        }
    }

    #[rstest]
    fn tabular_solve_matches_closed_form(mut tabular_actor: SoftmaxLinearActor) {
        // With one-hot features the maximizer is pi ∝ pi_old * exp(eta * A)
        let before = tabular_actor.current_policy();
        let advantage = array![[-1.0, 1.0], [0.5, -0.5]];
        let solve = tabular_actor.update_policy_param(advantage.view(), array![0.5, 0.5].view());
        assert_eq!(solve.termination, InnerTermination::Converged);
        let eta = tabular_actor.eta();
        let mut expected = &before * &advantage.mapv(|a| (eta * a).exp());
        for mut row in expected.rows_mut() {
            let total = row.sum();
            row /= total;
        }
        let after = tabular_actor.current_policy();
        for (x, y) in after.iter().zip(&expected) {
            assert!((x - y).abs() < 1e-3, "{} != {}", x, y);
        }
    }

    #[test]
    fn inner_objective_is_monotone() {
        let config = MdpoConfig {
            max_step_size: 1.0,
            stop_grad_threshold: 0.0,
            ..MdpoConfig::default()
        };
        let advantage = array![[1.0, -2.0, 0.5], [0.0, 3.0, -1.0]];
        let visitation = array![0.3, 0.7];
        let mut previous = f64::NEG_INFINITY;
        for budget in 0..15 {
            let mut actor = shared_actor(MdpoConfig {
                max_inner_iters: budget,
                ..config
            });
            let solve = actor.update_policy_param(advantage.view(), visitation.view());
            assert!(solve.objective_end >= solve.objective_start);
            assert!(solve.objective_end >= previous - 1e-12);
            previous = solve.objective_end;
        }
    }

    #[rstest]
    #[case(0, InnerTermination::BudgetExhausted, 0)]
    #[case(3, InnerTermination::BudgetExhausted, 3)]
    fn budget_termination(
        #[case] budget: u64,
        #[case] expected: InnerTermination,
        #[case] iterations: u64,
    ) {
        let mut actor = shared_actor(MdpoConfig {
            max_inner_iters: budget,
            max_step_size: 0.01,
            stop_grad_threshold: 0.0,
            ..MdpoConfig::default()
        });
        let solve = actor.update_policy_param(
            array![[1.0, 0.0, -1.0], [2.0, -2.0, 0.0]].view(),
            array![0.5, 0.5].view(),
        );
        assert_eq!(solve.termination, expected);
        assert_eq!(solve.iterations, iterations);
    }

    #[test]
    fn zero_advantage_converges_immediately() {
        let mut actor = shared_actor(MdpoConfig::default());
        let theta = actor.theta().to_owned();
        let advantage = Array::zeros((2, 3));
        let solve = actor.update_policy_param(advantage.view(), array![1.0, 0.0].view());
        assert_eq!(solve.termination, InnerTermination::Converged);
        assert_eq!(solve.iterations, 0);
        assert_eq!(actor.theta(), theta);
    }

    #[test]
    fn line_search_failure_keeps_last_iterate() {
        // A minimum step above the maximum leaves no admissible step at all
        let mut actor = shared_actor(MdpoConfig {
            max_step_size: 1e-3,
            min_step_size: 1.0,
            stop_grad_threshold: 0.0,
            ..MdpoConfig::default()
        });
        let theta = actor.theta().to_owned();
        let solve = actor.update_policy_param(
            array![[1.0, 0.0, -1.0], [2.0, -2.0, 0.0]].view(),
            array![0.5, 0.5].view(),
        );
        assert_eq!(solve.termination, InnerTermination::LineSearchFailed);
        assert_eq!(actor.theta(), theta);
        assert_eq!(solve.objective_end, solve.objective_start);
    }

    #[rstest]
    fn update_accepts_short_lived_advantage(mut tabular_actor: SoftmaxLinearActor) {
        let before = tabular_actor.theta().to_owned();
        for scale in [1.0, 2.0] {
            // Advantage owned by the loop body, dropped before the actor
            let advantage = array![[-1.0, 1.0], [1.0, -1.0]] * scale;
            let view = advantage.view();
            tabular_actor.update_policy_param(view, array![0.5, 0.5].view());
        }
        assert_ne!(tabular_actor.theta(), before.view());
        assert!(tabular_actor.theta().iter().all(|x| x.is_finite()));
    }

    #[rstest]
    fn zero_visitation_is_uniform(tabular_actor: SoftmaxLinearActor) {
        let advantage = array![[-1.0, 1.0], [1.0, -1.0]];
        let mut a = tabular_actor.clone();
        let mut b = tabular_actor;
        a.update_policy_param(advantage.view(), array![0.0, 0.0].view());
        b.update_policy_param(advantage.view(), array![3.0, 3.0].view());
        assert_eq!(a.theta(), b.theta());
    }

    #[test]
    fn invalid_configs() {
        let valid = MdpoConfig::default();
        assert!(valid.validate().is_ok());
        for config in [
            MdpoConfig {
                max_step_size: 0.0,
                ..valid
            },
            MdpoConfig {
                backtrack_ratio: 1.0,
                ..valid
            },
            MdpoConfig {
                sufficient_increase: 0.0,
                ..valid
            },
            MdpoConfig {
                stop_grad_threshold: f64::NAN,
                ..valid
            },
        ] {
            assert!(config.validate().is_err());
        }
    }

    #[rstest]
    fn features_match_model_shape(tabular_actor: SoftmaxLinearActor) {
        let model = TwoStateMdp::default().build_model().unwrap();
        let actor = tabular_actor;
        assert_eq!(
            actor.current_policy().dim(),
            (model.num_states(), model.num_actions())
        );
    }
}
