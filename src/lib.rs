//! Mirror descent policy optimization with linear function approximation.
//!
//! A softmax policy over tile-coded state-action features is trained by MDPO on tabular MDPs.
//! Every outer iteration a linear critic is fit to exact or Monte-Carlo action values and the
//! resulting advantage estimate drives a proximal update of the policy parameters.
#![warn(clippy::cast_lossless)]
#![warn(clippy::cast_possible_truncation)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::explicit_iter_loop)]
#![warn(clippy::missing_const_for_fn)] // has some false positives
#![warn(clippy::needless_borrow)]
#![warn(clippy::needless_pass_by_value)]
#![warn(clippy::redundant_closure_for_method_calls)]
#![warn(clippy::use_self)]
pub mod actors;
pub mod config;
pub mod critics;
pub mod envs;
mod error;
pub mod features;
pub mod logging;
pub mod results;
pub mod schedules;
pub mod targets;
pub mod training;
pub mod utils;

pub use actors::{InnerSolve, InnerTermination, MdpoConfig, SoftmaxLinearActor};
pub use config::{ConfigError, EnvName, ExperimentConfig};
pub use critics::{CriticAlgorithm, LinearTdCritic};
pub use envs::{BuildModel, SimulatedModel, TabularMdp, TabularModel};
pub use error::Error;
pub use features::{FeatureMatrix, TileCoder, TileCodingConfig};
pub use schedules::EtaSchedule;
pub use targets::{ExactTarget, SampledTarget, SamplingMode, TargetSource};
pub use training::{run_experiment, train_run, ExperimentResults, RunHistory, TrainingRun};

/// Pseudo-random number generator used throughout the crate.
pub type Prng = rand_chacha::ChaCha8Rng;
