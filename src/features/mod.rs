//! State-action features
mod tiles;

pub use tiles::{IndexHashTable, TileCoder, TileCodingConfig, Tiles};

use crate::envs::TabularModel;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Dense binary feature matrix for every state-action pair of a tabular model.
///
/// Row `s * num_actions + a` holds the features of `(s, a)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    phi: Array2<f64>,
    num_states: usize,
    num_actions: usize,
}

impl FeatureMatrix {
    /// Tile-code every state-action pair of `model`.
    ///
    /// Pairs are encoded in `(state, action)` order so the resulting matrix only depends on the
    /// coder configuration and the model.
    pub fn build<M: TabularModel + ?Sized>(coder: &mut TileCoder, model: &M) -> Self {
        let num_states = model.num_states();
        let num_actions = model.num_actions();
        let mut phi = Array2::zeros((num_states * num_actions, coder.dim()));
        for s in 0..num_states {
            let coordinates = model.state_coordinates(s);
            for a in 0..num_actions {
                for i in coder.encode(&coordinates, a) {
                    phi[(s * num_actions + a, i)] = 1.0;
                }
            }
        }
        Self {
            phi,
            num_states,
            num_actions,
        }
    }

    /// Wrap an explicit feature matrix with one row per state-action pair.
    ///
    /// # Panics
    /// If the number of rows is not `num_states * num_actions`.
    pub fn from_rows(phi: Array2<f64>, num_states: usize, num_actions: usize) -> Self {
        assert_eq!(
            phi.nrows(),
            num_states * num_actions,
            "feature rows must match the state-action count"
        );
        Self {
            phi,
            num_states,
            num_actions,
        }
    }

    /// Feature dimension.
    pub fn dim(&self) -> usize {
        self.phi.ncols()
    }

    pub const fn num_states(&self) -> usize {
        self.num_states
    }

    pub const fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// The `[num_states * num_actions, dim]` feature matrix.
    pub fn rows(&self) -> ArrayView2<f64> {
        self.phi.view()
    }

    /// Features of one state-action pair.
    pub fn row(&self, state: usize, action: usize) -> ArrayView1<f64> {
        self.phi.row(state * self.num_actions + action)
    }

    /// Linear scores `phi(s, a) . weights` as a `[num_states, num_actions]` array.
    pub fn scores(&self, weights: ArrayView1<f64>) -> Array2<f64> {
        let flat = self.phi.dot(&weights);
        Array2::from_shape_fn((self.num_states, self.num_actions), |(s, a)| {
            flat[s * self.num_actions + a]
        })
    }

    /// Back-project per state-action values onto the feature space: `phi^T vec(values)`.
    pub fn project(&self, values: ArrayView2<f64>) -> Array1<f64> {
        let flat: Array1<f64> = values.iter().copied().collect();
        self.phi.t().dot(&flat)
    }
}
