// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Evaluator settings.
//!
//! Settings are layered: built-in defaults, then an optional configuration
//! file (any format the `config` crate understands, chosen by extension),
//! then `VHOME_EVAL_*` environment variables.
//!
//! ```toml
//! geometric_accuracy = 0.05
//! max_distance = 3.0
//! min_detections = 2
//! strategy = "hungarian"
//! ```

use crate::Error;
use config::{Config, Environment, File};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

/// Prefix of the environment variables overriding configuration values, for
/// example `VHOME_EVAL_GEOMETRIC_ACCURACY=0.05`.
pub const ENV_PREFIX: &str = "VHOME_EVAL";

/// How detections are paired with ground-truth objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Detections claim their best-overlapping object in submission order.
    /// A later, better detection takes over a claimed object and the earlier
    /// one is counted as a false positive.
    #[default]
    Greedy,
    /// One-to-one assignment maximizing the total IoU over a whole batch.
    Hungarian,
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            MatchingStrategy::Greedy => "greedy",
            MatchingStrategy::Hungarian => "hungarian",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for MatchingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "greedy" => Ok(MatchingStrategy::Greedy),
            "hungarian" => Ok(MatchingStrategy::Hungarian),
            _ => Err(Error::InvalidParameters(format!(
                "Unknown matching strategy: {}",
                s
            ))),
        }
    }
}

/// Parameters of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Grid spacing of the IoU estimator, in scene units. Smaller is more
    /// accurate and quadratically (planar) or cubically (volumetric) slower.
    /// A box needing more than [`MAX_SAMPLES`](crate::MAX_SAMPLES)
    /// samples at this spacing estimates an IoU of 0.
    pub geometric_accuracy: f64,
    /// Largest center distance at which a ground-truth object is still a
    /// candidate for a detection.
    pub max_distance: f64,
    /// Detections merged from fewer observations are ignored.
    pub min_detections: u32,
    /// Detections below this certainty are ignored.
    pub min_certainty: f64,
    pub strategy: MatchingStrategy,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            geometric_accuracy: 0.1,
            max_distance: 5.0,
            min_detections: 1,
            min_certainty: 0.0,
            strategy: MatchingStrategy::Greedy,
        }
    }
}

impl EvaluatorConfig {
    /// Loads the configuration from defaults, the optional file at `path`
    /// and the process environment, then validates it.
    pub fn load(path: Option<&Path>) -> Result<Self, Error> {
        Self::from_sources(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn from_sources(path: Option<&Path>, environment: Environment) -> Result<Self, Error> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading evaluator configuration from {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings = builder
            .add_source(environment.try_parsing(true))
            .build()?;
        let config: EvaluatorConfig = settings.try_deserialize()?;
        config.validate()?;
        debug!("Evaluator configuration: {:?}", config);
        Ok(config)
    }

    /// Checks that every value is usable.
    ///
    /// A geometric accuracy outside of 0.01..=1.0 is accepted with a warning.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.geometric_accuracy.is_finite() || self.geometric_accuracy <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "geometric_accuracy must be a positive number, got {}",
                self.geometric_accuracy
            )));
        }
        if !(0.01..=1.0).contains(&self.geometric_accuracy) {
            warn!(
                "geometric_accuracy {} is outside of the usual 0.01..1.0 range",
                self.geometric_accuracy
            );
        }
        if self.max_distance.is_nan() || self.max_distance <= 0.0 {
            return Err(Error::InvalidParameters(format!(
                "max_distance must be positive, got {}",
                self.max_distance
            )));
        }
        if !self.min_certainty.is_finite() || self.min_certainty < 0.0 {
            return Err(Error::InvalidParameters(format!(
                "min_certainty must be a non-negative number, got {}",
                self.min_certainty
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, io::Write};

    fn no_environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
    }

    fn environment(vars: &[(&str, &str)]) -> Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        Environment::with_prefix(ENV_PREFIX).source(Some(vars))
    }

    #[test]
    fn test_defaults() {
        let config = EvaluatorConfig::from_sources(None, no_environment()).unwrap();
        assert_eq!(config, EvaluatorConfig::default());
        assert_eq!(config.geometric_accuracy, 0.1);
        assert_eq!(config.strategy, MatchingStrategy::Greedy);
    }

    #[test]
    fn test_file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "geometric_accuracy = 0.05").unwrap();
        writeln!(file, "max_distance = 2.5").unwrap();
        writeln!(file, "strategy = \"hungarian\"").unwrap();
        file.flush().unwrap();

        let config = EvaluatorConfig::from_sources(Some(file.path()), no_environment()).unwrap();
        assert_eq!(config.geometric_accuracy, 0.05);
        assert_eq!(config.max_distance, 2.5);
        assert_eq!(config.min_detections, 1);
        assert_eq!(config.strategy, MatchingStrategy::Hungarian);

        let config = EvaluatorConfig::from_sources(
            Some(file.path()),
            environment(&[
                ("VHOME_EVAL_MAX_DISTANCE", "1.5"),
                ("VHOME_EVAL_MIN_DETECTIONS", "3"),
            ]),
        )
        .unwrap();
        assert_eq!(config.geometric_accuracy, 0.05);
        assert_eq!(config.max_distance, 1.5);
        assert_eq!(config.min_detections, 3);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = EvaluatorConfig::from_sources(Some(&dir.path().join("absent.toml")), no_environment());
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_invalid_values() {
        let result = EvaluatorConfig::from_sources(
            None,
            environment(&[("VHOME_EVAL_GEOMETRIC_ACCURACY", "0")]),
        );
        assert!(matches!(result, Err(Error::InvalidParameters(_))));

        let config = EvaluatorConfig {
            max_distance: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EvaluatorConfig {
            min_certainty: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        // Unusual but accepted.
        let config = EvaluatorConfig {
            geometric_accuracy: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Hungarian".parse::<MatchingStrategy>().unwrap(), MatchingStrategy::Hungarian);
        assert_eq!("greedy".parse::<MatchingStrategy>().unwrap(), MatchingStrategy::Greedy);
        assert!("optimal".parse::<MatchingStrategy>().is_err());
        assert_eq!(MatchingStrategy::Hungarian.to_string(), "hungarian");
    }
}
