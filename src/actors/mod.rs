//! Policy actors
mod mdpo;

pub use mdpo::{InnerSolve, InnerTermination, MdpoConfig, SoftmaxLinearActor};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;

/// Row-wise log-softmax of a `[num_states, num_actions]` array of logits.
///
/// The row maximum is subtracted before exponentiating so large logits do not overflow.
pub fn log_softmax_rows(logits: ArrayView2<f64>) -> Array2<f64> {
    let mut out = logits.to_owned();
    for mut row in out.rows_mut() {
        let max = *row.max_skipnan();
        if !max.is_finite() {
            // All -inf or a +inf logit; fall back to uniform over the row
            row.fill(-(row.len() as f64).ln());
            continue;
        }
        row -= max;
        let log_normalizer = row.mapv(f64::exp).sum().ln();
        row -= log_normalizer;
    }
    out
}

/// Row-wise softmax of a `[num_states, num_actions]` array of logits.
///
/// Every probability is at least `f64::MIN_POSITIVE`, even when the logit gap is large enough
/// for `exp` to underflow. Rows then sum to one within rounding.
pub fn softmax_rows(logits: ArrayView2<f64>) -> Array2<f64> {
    log_softmax_rows(logits).mapv_into(|log_p| log_p.exp().max(f64::MIN_POSITIVE))
}

/// Normalize state visitation weights to sum to one.
///
/// An all-zero or non-finite weighting is replaced by the uniform distribution.
pub fn normalize_weights(weights: ArrayView1<f64>) -> Array1<f64> {
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if total > 0.0 && total.is_finite() && weights.iter().all(|w| w.is_finite()) {
        weights.mapv(|w| w.max(0.0) / total)
    } else {
        Array1::from_elem(weights.len(), 1.0 / weights.len().max(1) as f64)
    }
}

/// Policy-weighted baseline `sum_a policy(a|s) values(s, a)` for each state.
pub fn policy_baseline(policy: ArrayView2<f64>, values: ArrayView2<f64>) -> Array1<f64> {
    (&policy * &values).sum_axis(Axis(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn softmax_rows_are_distributions() {
        let logits = array![[0.0, 1.0, 2.0], [-5.0, -5.0, -5.0], [700.0, 0.0, -700.0]];
        let probs = softmax_rows(logits.view());
        for row in probs.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-12);
            assert!(row.iter().all(|p| *p > 0.0));
        }
        assert!((probs[(1, 0)] - 1.0 / 3.0).abs() < 1e-12);
        assert!(probs[(2, 0)] > 0.999);
    }

    #[test]
    fn underflowing_probabilities_stay_positive() {
        let logits = array![[800.0, 0.0], [0.0, -1e6]];
        let probs = softmax_rows(logits.view());
        assert_eq!(probs[(0, 1)], f64::MIN_POSITIVE);
        assert_eq!(probs[(1, 1)], f64::MIN_POSITIVE);
        assert_eq!(probs[(0, 0)], 1.0);
        let log_probs = log_softmax_rows(logits.view());
        assert!(log_probs.iter().all(|lp| lp.is_finite()));
    }

    #[test]
    fn log_softmax_matches_softmax() {
        let logits = array![[0.3, -1.2], [2.0, 2.5]];
        let log_probs = log_softmax_rows(logits.view());
        let probs = softmax_rows(logits.view());
        for (lp, p) in log_probs.iter().zip(&probs) {
            assert!((lp.exp() - p).abs() < 1e-12);
        }
    }

    #[test]
    fn normalize_weights_handles_degenerate_input() {
        assert_eq!(normalize_weights(array![1.0, 3.0].view()), array![0.25, 0.75]);
        assert_eq!(normalize_weights(array![0.0, 0.0].view()), array![0.5, 0.5]);
        assert_eq!(
            normalize_weights(array![f64::NAN, 1.0].view()),
            array![0.5, 0.5]
        );
    }

    #[test]
    fn baseline_is_expected_value() {
        let policy = array![[0.25, 0.75], [1.0, 0.0]];
        let values = array![[4.0, 8.0], [1.0, 100.0]];
        assert_eq!(policy_baseline(policy.view(), values.view()), array![7.0, 1.0]);
    }
}
