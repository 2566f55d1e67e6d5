//! Linear function approximation critic fit by weighted least squares
use super::CriticAlgorithm;
use crate::actors::policy_baseline;
use crate::features::FeatureMatrix;
use crate::utils::linalg;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Pivot tolerance for the Cholesky factorization, relative to the largest diagonal entry.
const CHOLESKY_REL_TOL: f64 = 1e-12;
/// First ridge coefficient tried, relative to the mean diagonal of the Gram matrix.
const INITIAL_RIDGE: f64 = 1e-10;
/// Largest ridge coefficient tried, relative to the mean diagonal of the Gram matrix.
const MAX_RIDGE: f64 = 1e6;

/// Linear critic over tile-coded state-action features.
///
/// Each fit regresses the feature scores `phi(s, a) . w` onto a target table by least squares
/// weighted with the normalized state visitation distribution.
/// The weights are recomputed from scratch on every fit.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearTdCritic {
    algorithm: CriticAlgorithm,
    features: FeatureMatrix,
    weights: Array1<f64>,
    last_ridge: f64,
}

impl LinearTdCritic {
    pub fn new(algorithm: CriticAlgorithm, features: FeatureMatrix) -> Self {
        let weights = Array1::zeros(features.dim());
        Self {
            algorithm,
            features,
            weights,
            last_ridge: 0.0,
        }
    }

    pub const fn algorithm(&self) -> CriticAlgorithm {
        self.algorithm
    }

    pub const fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    /// Weights from the most recent fit.
    pub fn weights(&self) -> ArrayView1<f64> {
        self.weights.view()
    }

    /// Ridge coefficient added to the Gram matrix in the most recent fit (0 if none was needed).
    pub const fn last_ridge(&self) -> f64 {
        self.last_ridge
    }

    /// Fit the weights to a target table and return the fitted table.
    ///
    /// Minimizes `sum_s d(s) sum_a (phi(s, a) . w - target(s, a))^2` with `d` normalized to sum
    /// to one. States with zero weight do not constrain the fit. If the weighted Gram matrix is
    /// singular a small ridge penalty is added; an all-zero weighting fits `w = 0`.
    ///
    /// # Panics
    /// If `target` is not `[num_states, num_actions]` or `visitation` is not `[num_states]`.
    pub fn fit(&mut self, target: ArrayView2<f64>, visitation: ArrayView1<f64>) -> Array2<f64> {
        let num_states = self.features.num_states();
        let num_actions = self.features.num_actions();
        assert_eq!(target.dim(), (num_states, num_actions), "target shape");
        assert_eq!(visitation.len(), num_states, "visitation length");

        let total: f64 = visitation.sum();
        let (weights, ridge) = if total > 0.0 && total.is_finite() {
            let row_weights: Array1<f64> = (0..num_states * num_actions)
                .map(|i| visitation[i / num_actions].max(0.0) / total)
                .collect();
            let phi = self.features.rows();
            let weighted_phi = &phi * &row_weights.view().insert_axis(Axis(1));
            let gram = phi.t().dot(&weighted_phi);
            let flat_target: Array1<f64> = target.iter().copied().collect();
            let rhs = weighted_phi.t().dot(&flat_target);
            solve_normal_equations(gram, rhs.view())
        } else {
            (Array1::zeros(self.features.dim()), 0.0)
        };
        self.weights = weights;
        self.last_ridge = ridge;
        self.features.scores(self.weights.view())
    }

    /// Action-value estimate fit directly to sampled (or exact) action values.
    pub fn estimate_q(
        &mut self,
        q_sample: ArrayView2<f64>,
        visitation: ArrayView1<f64>,
    ) -> Array2<f64> {
        self.fit(q_sample, visitation)
    }

    /// Advantage estimate fit to advantage targets.
    ///
    /// The fitted table is re-centered so that its policy-weighted mean is zero in every state;
    /// the features alone need not be able to represent that constraint.
    pub fn estimate_a(
        &mut self,
        a_sample: ArrayView2<f64>,
        policy: ArrayView2<f64>,
        visitation: ArrayView1<f64>,
    ) -> Array2<f64> {
        let a_hat = self.fit(a_sample, visitation);
        center(a_hat, policy)
    }

    /// Advantage estimate from action-value targets using the configured algorithm.
    ///
    /// The result has zero policy-weighted mean in every state.
    pub fn advantage_estimate(
        &mut self,
        q_sample: ArrayView2<f64>,
        policy: ArrayView2<f64>,
        visitation: ArrayView1<f64>,
    ) -> Array2<f64> {
        match self.algorithm {
            CriticAlgorithm::Td => {
                let q_hat = self.estimate_q(q_sample, visitation);
                center(q_hat, policy)
            }
            CriticAlgorithm::AdvantageTd => {
                let a_sample = center(q_sample.to_owned(), policy);
                self.estimate_a(a_sample.view(), policy, visitation)
            }
        }
    }
}

/// Subtract the policy-weighted baseline of each state.
fn center(mut values: Array2<f64>, policy: ArrayView2<f64>) -> Array2<f64> {
    let baseline = policy_baseline(policy, values.view());
    values -= &baseline.insert_axis(Axis(1));
    values
}

/// Solve `G w = b` by Cholesky, adding a growing ridge `lambda I` until the factorization
/// succeeds.
///
/// # Returns
/// The solution and the ridge coefficient used.
fn solve_normal_equations(mut gram: Array2<f64>, rhs: ArrayView1<f64>) -> (Array1<f64>, f64) {
    let n = gram.nrows();
    let scale = if n == 0 { 0.0 } else { gram.diag().sum() / n as f64 };
    if !(scale > 0.0 && scale.is_finite()) {
        return (Array1::zeros(n), 0.0);
    }

    let mut ridge = 0.0;
    let mut applied = 0.0;
    while ridge <= MAX_RIDGE * scale {
        {
            let mut diag = gram.diag_mut();
            diag += ridge - applied;
        }
        applied = ridge;
        if let Ok(l) = linalg::cholesky(gram.view(), CHOLESKY_REL_TOL) {
            let weights = linalg::cholesky_solve(l.view(), rhs);
            if weights.iter().all(|w| w.is_finite()) {
                return (weights, ridge);
            }
        }
        ridge = if ridge == 0.0 {
            INITIAL_RIDGE * scale
        } else {
            ridge * 10.0
        };
    }
    (Array1::zeros(n), ridge)
}
