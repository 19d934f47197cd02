// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

/// Error type for evaluation, scene loading and configuration.
///
/// Expected misses during an evaluation pass (unresolvable classes,
/// degenerate geometry, empty aggregates) are not errors: they are recovered
/// locally and surface as skipped detections, zero IoU or undefined ratios in
/// the [`EvaluationReport`](crate::EvaluationReport). This enum only covers
/// conditions that stop an operation from running at all.
#[derive(Debug)]
pub enum Error {
    /// An I/O error occurred while reading a scene or detection file.
    IoError(std::io::Error),
    /// JSON serialization or deserialization error.
    JsonError(serde_json::Error),
    /// Configuration parsing or loading error.
    ConfigError(config::ConfigError),
    /// Invalid parameters provided to an operation.
    InvalidParameters(String),
    /// The scene document is structurally valid JSON but describes an
    /// unusable ground truth.
    InvalidScene(String),
    /// A ground-truth object id was not found.
    UnknownObject(String),
    /// `begin` was called on an evaluator that is still collecting.
    EvaluationInProgress(String),
    /// A detection was submitted, or a run finished, outside of a collection
    /// pass.
    NotCollecting,
    /// The assignment cost matrix could not be built.
    MatrixError(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::ConfigError(err)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Error::ConfigError(e) => write!(f, "Configuration error: {}", e),
            Error::InvalidParameters(s) => write!(f, "Invalid parameters: {}", s),
            Error::InvalidScene(s) => write!(f, "Invalid scene: {}", s),
            Error::UnknownObject(id) => write!(f, "Unknown ground-truth object: {}", id),
            Error::EvaluationInProgress(name) => {
                write!(f, "Evaluation '{}' is already collecting detections", name)
            }
            Error::NotCollecting => write!(f, "Evaluator is not collecting detections"),
            Error::MatrixError(s) => write!(f, "Assignment matrix error: {}", s),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            Error::JsonError(e) => Some(e),
            Error::ConfigError(e) => Some(e),
            _ => None,
        }
    }
}
