//! Small hand-constructed MDPs
use super::{BuildModel, Coordinates, EnvError, TabularMdp};
use ndarray::{array, Array3};
use serde::{Deserialize, Serialize};

/// Two-state, two-action deterministic MDP.
///
/// * State 0, action 0: stay, reward 0.
/// * State 0, action 1: move to state 1, reward 1.
/// * State 1, action 0: stay, reward 2.
/// * State 1, action 1: move to state 0, reward 0.
///
/// Episodes start in state 0. The optimal policy is to move to state 1 and stay there.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoStateMdp {
    pub discount_factor: f64,
}

impl Default for TwoStateMdp {
    fn default() -> Self {
        Self {
            discount_factor: 0.9,
        }
    }
}

impl BuildModel for TwoStateMdp {
    type Model = TabularMdp;

    fn build_model(&self) -> Result<TabularMdp, EnvError> {
        let mut transitions = Array3::zeros((2, 2, 2));
        transitions[(0, 0, 0)] = 1.0;
        transitions[(0, 1, 1)] = 1.0;
        transitions[(1, 0, 1)] = 1.0;
        transitions[(1, 1, 0)] = 1.0;
        TabularMdp::new(
            transitions,
            array![[0.0, 1.0], [2.0, 0.0]],
            self.discount_factor,
            array![1.0, 0.0],
            vec![
                Coordinates::from_slice(&[0.0]),
                Coordinates::from_slice(&[0.5]),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envs::TabularModel;
    use ndarray::Array2;

    #[test]
    fn optimal_policy_value() {
        let model = TwoStateMdp::default().build_model().unwrap();
        let policy = array![[0.0, 1.0], [1.0, 0.0]];
        let v = model.calc_vpi(policy.view()).unwrap();
        assert!((v[1] - 20.0).abs() < 1e-10);
        assert!((v[0] - 19.0).abs() < 1e-10);
    }

    #[test]
    fn custom_discount() {
        let model = TwoStateMdp {
            discount_factor: 0.5,
        }
        .build_model()
        .unwrap();
        assert_eq!(model.discount_factor(), 0.5);
        let v = model
            .calc_vpi(Array2::from_elem((2, 2), 0.5).view())
            .unwrap();
        assert!(v.iter().all(|x| x.is_finite()));
    }
}
