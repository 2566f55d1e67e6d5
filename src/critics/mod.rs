//! Value critics
mod linear_td;

pub use linear_td::LinearTdCritic;

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Critic fitting algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CriticAlgorithm {
    /// Fit action values, then subtract the policy baseline to get advantages.
    #[serde(rename = "TD")]
    Td,
    /// Fit advantage targets directly, then re-center on the policy baseline.
    #[serde(rename = "AdvantageTD")]
    AdvantageTd,
}

impl CriticAlgorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Td => "TD",
            Self::AdvantageTd => "AdvantageTD",
        }
    }
}

impl Default for CriticAlgorithm {
    fn default() -> Self {
        Self::Td
    }
}

impl fmt::Display for CriticAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CriticAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TD" => Ok(Self::Td),
            "AdvantageTD" => Ok(Self::AdvantageTd),
            _ => Err(ConfigError::UnknownCriticAlgorithm(s.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("TD", CriticAlgorithm::Td)]
    #[case("AdvantageTD", CriticAlgorithm::AdvantageTd)]
    fn parse_known(#[case] name: &str, #[case] expected: CriticAlgorithm) {
        assert_eq!(name.parse::<CriticAlgorithm>(), Ok(expected));
        assert_eq!(expected.to_string(), name);
    }

    #[rstest]
    #[case("td")]
    #[case("Advantage TD")]
    #[case("")]
    fn parse_unknown_fails(#[case] name: &str) {
        assert_eq!(
            name.parse::<CriticAlgorithm>(),
            Err(ConfigError::UnknownCriticAlgorithm(name.into()))
        );
    }
}
