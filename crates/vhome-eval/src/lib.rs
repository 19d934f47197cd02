// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! # Virtual Home Detection Evaluation
//!
//! Scores the output of a 3D object detection pipeline against the ground
//! truth of a simulated home. Detections are oriented boxes given by eight
//! corners; ground-truth objects are axis-aligned bounds in their own frame
//! placed by a world pose.
//!
//! ## Features
//!
//! - **Bounds extraction**: local-frame bounds of grouped geometry,
//!   independent of the object's pose
//! - **Discrete IoU**: planar and volumetric overlap estimated on a grid at a
//!   configurable geometric accuracy
//! - **Matching**: class resolution through an ontology table, distance
//!   gating, greedy best-IoU matching with replacement, or optimal
//!   (Hungarian) assignment
//! - **Reporting**: TP/FP/FN, accuracy, recall, F1, mean IoU, volumetric IoU
//!   and center distance, as a summary or as semicolon records
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vhome_eval::{Error, Evaluator, EvaluatorConfig, Scene, load_detections};
//!
//! fn main() -> Result<(), Error> {
//!     let scene = Scene::load("house_3.json")?;
//!     let ground_truth = scene.ground_truth()?;
//!     let classes = scene.classes();
//!     let detections = load_detections("camera_rgb.json")?;
//!
//!     let config = EvaluatorConfig::load(None)?;
//!     let mut evaluator = Evaluator::new("camera_rgb", &ground_truth, &classes, config)?;
//!     let report = evaluator.evaluate(&detections)?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```
//!
//! ## Optional Features
//!
//! - `profiling`: emits `tracing` spans around evaluation passes

mod bounds;
mod classes;
mod config;
mod corners;
mod error;
mod evaluator;
mod geometry;
mod iou;
mod object;
mod report;
mod scene;

pub use crate::{
    bounds::{GeometryNode, local_bounds},
    classes::{ClassMatching, Tag},
    config::{ENV_PREFIX, EvaluatorConfig, MatchingStrategy},
    corners::{align_corners, centroid, rotate_corner_order, to_local_frame},
    error::Error,
    evaluator::{DetectionMatch, EvaluationState, Evaluator, Outcome},
    geometry::{Aabb, Pose, rotation_from_degrees},
    iou::{IouMode, MAX_SAMPLES, discrete_iou, estimate_iou},
    object::{GroundTruth, GroundTruthObject, OrientedDetection},
    report::{ConfusionTally, EvaluationReport},
    scene::{Scene, SceneObject, load_detections},
};
