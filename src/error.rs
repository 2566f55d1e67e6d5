//! Error type
use crate::config::ConfigError;
use crate::envs::EnvError;
use crate::logging::LogError;
use crate::results::ResultsError;
use thiserror::Error;

/// Error from running an experiment.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("environment error: {0}")]
    Env(#[from] EnvError),
    #[error("error saving results: {0}")]
    Results(#[from] ResultsError),
    #[error("error logging statistics: {0}")]
    Log(#[from] LogError),
}
