//! Experiment configuration
use crate::actors::MdpoConfig;
use crate::critics::CriticAlgorithm;
use crate::envs::{BuildModel, CliffWorld, EnvError, FrozenLake, TabularMdp};
use crate::features::TileCodingConfig;
use crate::schedules::EtaSchedule;
use crate::targets::SamplingMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error in the experiment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("critic dimension {dim} is not supported for environment {env}")]
    UnsupportedCriticDimension { env: EnvName, dim: usize },
    #[error("invalid tile coding {0:?}: all sizes must be positive")]
    InvalidTileCoding(TileCodingConfig),
    #[error("unknown critic algorithm {0:?} (expected \"TD\" or \"AdvantageTD\")")]
    UnknownCriticAlgorithm(String),
    #[error("unknown sampling mode {0:?} (expected \"MB\" or \"MC\")")]
    UnknownSamplingMode(String),
    #[error("unknown environment {0:?} (expected \"CW\" or \"FL\")")]
    UnknownEnv(String),
    #[error("invalid value {value} for option {name}")]
    InvalidOption { name: &'static str, value: String },
}

impl ConfigError {
    fn invalid<T: fmt::Display>(name: &'static str, value: T) -> Self {
        Self::InvalidOption {
            name,
            value: value.to_string(),
        }
    }
}

/// Benchmark environment name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EnvName {
    #[serde(rename = "CW")]
    CliffWorld,
    #[serde(rename = "FL")]
    FrozenLake,
}

impl EnvName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CliffWorld => "CW",
            Self::FrozenLake => "FL",
        }
    }

    /// Build the environment model with its default settings.
    pub fn build(self) -> Result<TabularMdp, EnvError> {
        match self {
            Self::CliffWorld => CliffWorld::default().build_model(),
            Self::FrozenLake => FrozenLake::default().build_model(),
        }
    }

    /// Actor tile coding used with this environment.
    pub const fn actor_tiles(self) -> TileCodingConfig {
        match self {
            Self::CliffWorld => TileCodingConfig::new(80, 5, 3),
            Self::FrozenLake => TileCodingConfig::new(60, 5, 3),
        }
    }

    /// Critic tile coding for a supported critic dimension.
    ///
    /// # Errors
    /// [`ConfigError::UnsupportedCriticDimension`] if there is no tiling for `dim`.
    pub fn critic_tiles(self, dim: usize) -> Result<TileCodingConfig, ConfigError> {
        let (num_tilings, tiling_size) = match (self, dim) {
            (Self::CliffWorld, 40) => (5, 1),
            (Self::CliffWorld, 50) => (4, 2),
            (Self::CliffWorld, 60) => (4, 3),
            (Self::CliffWorld, 80) => (5, 3),
            (Self::CliffWorld, 100) => (6, 3),
            (Self::FrozenLake, 40) => (3, 3),
            (Self::FrozenLake, 50) => (4, 3),
            (Self::FrozenLake, 60) => (5, 3),
            (Self::FrozenLake, 100) => (8, 3),
            (env, dim) => return Err(ConfigError::UnsupportedCriticDimension { env, dim }),
        };
        Ok(TileCodingConfig::new(dim, num_tilings, tiling_size))
    }
}

impl fmt::Display for EnvName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CW" => Ok(Self::CliffWorld),
            "FL" => Ok(Self::FrozenLake),
            _ => Err(ConfigError::UnknownEnv(s.into())),
        }
    }
}

/// Critic configuration.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticConfig {
    pub algorithm: CriticAlgorithm,
    pub tiles: TileCodingConfig,
}

/// Actor configuration.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    pub tiles: TileCodingConfig,
    /// Standard deviation of the initial normal parameter draw.
    pub init_stddev: f64,
    pub mdpo: MdpoConfig,
}

/// Critic target configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    pub mode: SamplingMode,
    /// Monte-Carlo rollouts per state-action pair.
    pub rollouts: usize,
    /// Transitions per rollout.
    pub horizon: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            mode: SamplingMode::ModelBased,
            rollouts: 1000,
            horizon: 20,
        }
    }
}

/// Full configuration of an experiment: several independent training runs.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub env: EnvName,
    /// Outer iterations per run.
    pub num_iterations: u64,
    /// Number of independent runs.
    pub num_runs: u64,
    /// Run `i` is seeded with `base_seed * i`.
    pub base_seed: u64,
    pub eta: EtaSchedule,
    pub critic: CriticConfig,
    pub actor: ActorConfig,
    pub sampling: SamplingConfig,
    /// Maximum number of runs executed concurrently.
    pub num_threads: usize,
}

impl ExperimentConfig {
    /// Default experiment settings for an environment with the given critic dimension.
    ///
    /// # Errors
    /// [`ConfigError::UnsupportedCriticDimension`] if `critic_dim` has no tiling for `env`.
    pub fn preset(env: EnvName, critic_dim: usize) -> Result<Self, ConfigError> {
        Ok(Self {
            env,
            num_iterations: 50_000,
            num_runs: 5,
            base_seed: 42,
            eta: EtaSchedule::new(0.1),
            critic: CriticConfig {
                algorithm: CriticAlgorithm::Td,
                tiles: env.critic_tiles(critic_dim)?,
            },
            actor: ActorConfig {
                tiles: env.actor_tiles(),
                init_stddev: 0.1,
                mdpo: MdpoConfig::default(),
            },
            sampling: SamplingConfig::default(),
            num_threads: 1,
        })
    }

    /// Check that every option is usable.
    ///
    /// # Errors
    /// The first invalid option found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.critic.tiles.validate()?;
        self.actor.tiles.validate()?;
        if self.num_runs == 0 {
            return Err(ConfigError::invalid("num_runs", self.num_runs));
        }
        if self.num_threads == 0 {
            return Err(ConfigError::invalid("num_threads", self.num_threads));
        }
        if !(self.eta.eta.is_finite() && self.eta.eta > 0.0) {
            return Err(ConfigError::invalid("eta", self.eta.eta));
        }
        if !(self.eta.warmup_value.is_finite() && self.eta.warmup_value > 0.0) {
            return Err(ConfigError::invalid(
                "eta_warmup_value",
                self.eta.warmup_value,
            ));
        }
        if !(self.actor.init_stddev.is_finite() && self.actor.init_stddev >= 0.0) {
            return Err(ConfigError::invalid(
                "actor_init_stddev",
                self.actor.init_stddev,
            ));
        }
        self.actor.mdpo.validate()?;
        if self.sampling.mode == SamplingMode::MonteCarlo {
            if self.sampling.rollouts == 0 {
                return Err(ConfigError::invalid("rollouts", self.sampling.rollouts));
            }
            if self.sampling.horizon == 0 {
                return Err(ConfigError::invalid("horizon", self.sampling.horizon));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(EnvName::CliffWorld, 40, 5, 1)]
    #[case(EnvName::CliffWorld, 50, 4, 2)]
    #[case(EnvName::CliffWorld, 60, 4, 3)]
    #[case(EnvName::CliffWorld, 80, 5, 3)]
    #[case(EnvName::CliffWorld, 100, 6, 3)]
    #[case(EnvName::FrozenLake, 40, 3, 3)]
    #[case(EnvName::FrozenLake, 50, 4, 3)]
    #[case(EnvName::FrozenLake, 60, 5, 3)]
    #[case(EnvName::FrozenLake, 100, 8, 3)]
    fn preset_critic_tiles(
        #[case] env: EnvName,
        #[case] dim: usize,
        #[case] num_tilings: usize,
        #[case] tiling_size: usize,
    ) {
        let config = ExperimentConfig::preset(env, dim).unwrap();
        assert_eq!(
            config.critic.tiles,
            TileCodingConfig::new(dim, num_tilings, tiling_size)
        );
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(EnvName::CliffWorld, 70)]
    #[case(EnvName::FrozenLake, 80)]
    #[case(EnvName::FrozenLake, 0)]
    fn unsupported_critic_dimension(#[case] env: EnvName, #[case] dim: usize) {
        assert_eq!(
            ExperimentConfig::preset(env, dim),
            Err(ConfigError::UnsupportedCriticDimension { env, dim })
        );
    }

    #[test]
    fn actor_tiles_per_env() {
        assert_eq!(
            ExperimentConfig::preset(EnvName::CliffWorld, 80)
                .unwrap()
                .actor
                .tiles,
            TileCodingConfig::new(80, 5, 3)
        );
        assert_eq!(
            ExperimentConfig::preset(EnvName::FrozenLake, 60)
                .unwrap()
                .actor
                .tiles,
            TileCodingConfig::new(60, 5, 3)
        );
    }

    #[test]
    fn env_names_parse() {
        assert_eq!("CW".parse(), Ok(EnvName::CliffWorld));
        assert_eq!("FL".parse(), Ok(EnvName::FrozenLake));
        assert_eq!(
            "cw".parse::<EnvName>(),
            Err(ConfigError::UnknownEnv("cw".into()))
        );
    }

    #[test]
    fn validate_rejects_bad_options() {
        let base = ExperimentConfig::preset(EnvName::CliffWorld, 80).unwrap();

        let mut config = base;
        config.num_runs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { name: "num_runs", .. })
        ));

        let mut config = base;
        config.eta.eta = -1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { name: "eta", .. })
        ));

        let mut config = base;
        config.critic.tiles.num_tilings = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTileCoding(_))
        ));

        let mut config = base;
        config.sampling.mode = SamplingMode::MonteCarlo;
        config.sampling.rollouts = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOption { name: "rollouts", .. })
        ));
    }

    #[test]
    fn json_round_trip_uses_short_names() {
        let config = ExperimentConfig::preset(EnvName::FrozenLake, 50).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"FL\""));
        assert!(json.contains("\"TD\""));
        assert!(json.contains("\"MB\""));
        let parsed: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
