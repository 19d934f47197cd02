// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Detection-to-ground-truth matching.
//!
//! An [`Evaluator`] scores the detections of one perception pipeline against
//! a [`GroundTruth`]. A pass runs `begin` → `submit`* → `finish`, or all at
//! once through [`Evaluator::evaluate`]:
//!
//! 1. Detections below the observation or certainty threshold are ignored.
//! 2. The class is resolved to a tag; unresolvable classes are skipped.
//! 3. Candidates are the detectable objects carrying that tag whose center
//!    lies within the distance cutoff. The candidate with the highest
//!    positive planar IoU is the best match. Candidates are visited in
//!    ground-truth order and a later one must have a strictly greater IoU,
//!    so of several tying candidates the first wins, never the last.
//! 4. A detection without a best match is a false positive. A detection
//!    whose best match is still unclaimed is a true positive and becomes the
//!    retained match of that object. Otherwise the detection is a false
//!    positive, and if its IoU is strictly greater it takes over the retained
//!    match; the true-positive count does not change.
//!
//! False negatives are the detectable objects left without a retained match.

use crate::{
    Error,
    classes::{ClassMatching, Tag},
    config::{EvaluatorConfig, MatchingStrategy},
    iou::{IouMode, estimate_iou},
    object::{GroundTruth, OrientedDetection},
    report::{ConfusionTally, EvaluationReport},
};
use log::{debug, info};
use pathfinding::{kuhn_munkres::kuhn_munkres_min, matrix::Matrix};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Assignment costs are `(1 - IoU) * COST_SCALE` rounded to integers.
const COST_SCALE: i64 = 10_000;

/// Lifecycle of an [`Evaluator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationState {
    Idle,
    Collecting,
    Finalized,
}

/// The retained best detection of one ground-truth object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionMatch {
    pub object_id: String,
    /// Position of the detection in submission order.
    pub detection: usize,
    pub iou: f64,
    pub volumetric_iou: f64,
    /// Distance between the detection center and the object's world center.
    pub distance: f64,
}

/// How a submitted detection was scored.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Below the observation or certainty threshold.
    Ignored,
    /// The class did not resolve to a tag.
    Unresolved,
    /// False positive: no candidate overlaps the detection.
    Unmatched,
    /// True positive: first match of the object.
    Matched { object_id: String },
    /// False positive: the object was already matched. `replaced` tells
    /// whether this detection took over the retained match.
    Redundant { object_id: String, replaced: bool },
}

/// Result of the read-only candidate search for one detection.
#[derive(Debug, Clone, Copy)]
enum Nomination {
    Ignored,
    Unresolved,
    Unmatched,
    Best {
        object: usize,
        iou: f64,
        distance: f64,
    },
}

/// Scores the detections of one perception pipeline.
#[derive(Debug)]
pub struct Evaluator<'a> {
    pipeline: String,
    ground_truth: &'a GroundTruth,
    classes: &'a ClassMatching,
    config: EvaluatorConfig,
    state: EvaluationState,
    retained: BTreeMap<String, DetectionMatch>,
    tally: ConfusionTally,
    submitted: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        pipeline: impl Into<String>,
        ground_truth: &'a GroundTruth,
        classes: &'a ClassMatching,
        config: EvaluatorConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            pipeline: pipeline.into(),
            ground_truth,
            classes,
            config,
            state: EvaluationState::Idle,
            retained: BTreeMap::new(),
            tally: ConfusionTally::default(),
            submitted: 0,
        })
    }

    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    pub fn state(&self) -> EvaluationState {
        self.state
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Running counts of the current or last pass.
    pub fn tally(&self) -> &ConfusionTally {
        &self.tally
    }

    /// Retained matches, ordered by object id.
    pub fn matches(&self) -> impl Iterator<Item = &DetectionMatch> {
        self.retained.values()
    }

    pub fn retained(&self, object_id: &str) -> Option<&DetectionMatch> {
        self.retained.get(object_id)
    }

    /// Starts a pass, discarding the results of any previous one.
    pub fn begin(&mut self) -> Result<(), Error> {
        if self.state == EvaluationState::Collecting {
            return Err(Error::EvaluationInProgress(self.pipeline.clone()));
        }
        self.retained.clear();
        self.tally = ConfusionTally::default();
        self.submitted = 0;
        self.state = EvaluationState::Collecting;
        debug!(
            "{}: evaluating against {} detectable objects",
            self.pipeline,
            self.ground_truth.detectable_count()
        );
        Ok(())
    }

    /// Scores one detection. Only available with the greedy strategy, the
    /// Hungarian strategy needs the whole batch.
    pub fn submit(&mut self, detection: &OrientedDetection) -> Result<Outcome, Error> {
        if self.state != EvaluationState::Collecting {
            return Err(Error::NotCollecting);
        }
        if self.config.strategy != MatchingStrategy::Greedy {
            return Err(Error::InvalidParameters(format!(
                "{} matching cannot score detections one at a time",
                self.config.strategy
            )));
        }
        let nomination = self.nominate(detection);
        let index = self.submitted;
        self.submitted += 1;
        Ok(self.apply(index, detection, nomination))
    }

    /// Ends the pass and derives the report.
    pub fn finish(&mut self) -> Result<EvaluationReport, Error> {
        if self.state != EvaluationState::Collecting {
            return Err(Error::NotCollecting);
        }
        self.state = EvaluationState::Finalized;
        let report = self.tally.finalize(
            &self.pipeline,
            self.ground_truth.detectable_count(),
            self.retained.len(),
        );
        info!(
            "{}: {} detections, TP {} FP {} FN {}",
            self.pipeline,
            self.submitted,
            report.true_positives,
            report.false_positives,
            report.false_negatives
        );
        Ok(report)
    }

    /// Runs a complete pass over `detections` with the configured strategy.
    ///
    /// With the greedy strategy the result is identical to submitting the
    /// detections one by one in slice order.
    #[cfg_attr(
        feature = "profiling",
        tracing::instrument(skip_all, fields(pipeline = %self.pipeline, detections = detections.len()))
    )]
    pub fn evaluate(&mut self, detections: &[OrientedDetection]) -> Result<EvaluationReport, Error> {
        self.begin()?;
        let scored = match self.config.strategy {
            MatchingStrategy::Greedy => {
                self.score_greedy(detections);
                Ok(())
            }
            MatchingStrategy::Hungarian => self.score_optimal(detections),
        };
        if let Err(err) = scored {
            self.state = EvaluationState::Idle;
            return Err(err);
        }
        self.finish()
    }

    fn score_greedy(&mut self, detections: &[OrientedDetection]) {
        let this = &*self;
        let nominations: Vec<Nomination> = detections
            .par_iter()
            .map(|detection| this.nominate(detection))
            .collect();
        for (detection, nomination) in detections.iter().zip(nominations) {
            let index = self.submitted;
            self.submitted += 1;
            self.apply(index, detection, nomination);
        }
    }

    /// Whether the detection passes the observation and certainty
    /// thresholds.
    fn is_eligible(&self, detection: &OrientedDetection) -> bool {
        detection.observations >= self.config.min_detections
            && detection.certainty >= self.config.min_certainty
    }

    fn resolve(&self, detection: &OrientedDetection) -> Option<&'a Tag> {
        let tag = self.classes.resolve(&detection.class);
        if tag.is_none() {
            debug!("{} failed to resolve to a tag", detection.class);
        }
        tag
    }

    /// Candidate search. Reads the ground truth only.
    fn nominate(&self, detection: &OrientedDetection) -> Nomination {
        if !self.is_eligible(detection) {
            return Nomination::Ignored;
        }
        let Some(tag) = self.resolve(detection) else {
            return Nomination::Unresolved;
        };

        let center = detection.center();
        let mut best: Option<(usize, f64, f64)> = None;
        for (index, object) in self.ground_truth.candidates(tag) {
            let distance = (object.world_center() - center).norm();
            if distance > self.config.max_distance {
                continue;
            }
            let iou = estimate_iou(detection, object, self.config.geometric_accuracy, IouMode::Planar);
            let better = match best {
                Some((_, best_iou, _)) => iou > best_iou,
                None => iou > 0.0,
            };
            if better {
                best = Some((index, iou, distance));
            }
        }

        match best {
            Some((object, iou, distance)) => Nomination::Best {
                object,
                iou,
                distance,
            },
            None => Nomination::Unmatched,
        }
    }

    /// Applies a nomination to the running counts. Nominations must be
    /// applied in submission order.
    fn apply(&mut self, index: usize, detection: &OrientedDetection, nomination: Nomination) -> Outcome {
        let (object, iou, distance) = match nomination {
            Nomination::Ignored => {
                self.tally.ignored += 1;
                return Outcome::Ignored;
            }
            Nomination::Unresolved => {
                self.tally.unresolved += 1;
                return Outcome::Unresolved;
            }
            Nomination::Unmatched => {
                self.tally.false_positives += 1;
                return Outcome::Unmatched;
            }
            Nomination::Best {
                object,
                iou,
                distance,
            } => (object, iou, distance),
        };

        let ground_truth = self.ground_truth;
        let step = self.config.geometric_accuracy;
        let object = &ground_truth.objects()[object];
        let candidate = || DetectionMatch {
            object_id: object.id.clone(),
            detection: index,
            iou,
            volumetric_iou: estimate_iou(detection, object, step, IouMode::Volumetric),
            distance,
        };

        match self.retained.get_mut(&object.id) {
            None => {
                let m = candidate();
                self.tally.add(&m);
                self.tally.true_positives += 1;
                self.retained.insert(object.id.clone(), m);
                Outcome::Matched {
                    object_id: object.id.clone(),
                }
            }
            Some(current) => {
                self.tally.false_positives += 1;
                let replaced = iou > current.iou;
                if replaced {
                    debug!(
                        "{}: detection {} takes over {} from detection {} (IoU {:.4} > {:.4})",
                        self.pipeline, index, object.id, current.detection, iou, current.iou
                    );
                    self.tally.subtract(current);
                    *current = candidate();
                    self.tally.add(current);
                    self.tally.replaced += 1;
                }
                Outcome::Redundant {
                    object_id: object.id.clone(),
                    replaced,
                }
            }
        }
    }

    /// One-to-one assignment over the whole batch maximizing total planar
    /// IoU. Assigned pairs with positive IoU are true positives, every other
    /// eligible resolved detection is a false positive.
    fn score_optimal(&mut self, detections: &[OrientedDetection]) -> Result<(), Error> {
        let ground_truth = self.ground_truth;
        let step = self.config.geometric_accuracy;
        let max_distance = self.config.max_distance;
        self.submitted = detections.len();

        let mut rows: Vec<(usize, &OrientedDetection, &Tag)> = Vec::new();
        for (index, detection) in detections.iter().enumerate() {
            if !self.is_eligible(detection) {
                self.tally.ignored += 1;
                continue;
            }
            match self.resolve(detection) {
                Some(tag) => rows.push((index, detection, tag)),
                None => self.tally.unresolved += 1,
            }
        }

        let columns = ground_truth.detectable_indices();
        if rows.is_empty() {
            return Ok(());
        }
        if columns.is_empty() {
            self.tally.false_positives += rows.len();
            return Ok(());
        }

        // (planar IoU, distance) of every admissible pair.
        let table: Vec<Vec<Option<(f64, f64)>>> = rows
            .par_iter()
            .map(|(_, detection, tag)| {
                let center = detection.center();
                columns
                    .iter()
                    .map(|&column| {
                        let object = &ground_truth.objects()[column];
                        if !object.has_tag(tag) {
                            return None;
                        }
                        let distance = (object.world_center() - center).norm();
                        if distance > max_distance {
                            return None;
                        }
                        let iou = estimate_iou(detection, object, step, IouMode::Planar);
                        (iou > 0.0).then_some((iou, distance))
                    })
                    .collect()
            })
            .collect();

        let n = rows.len();
        let m = columns.len();
        let size = n.max(m);
        let mut weights = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                let cost = match (i < n && j < m).then(|| table[i][j]).flatten() {
                    Some((iou, _)) => ((1.0 - iou) * COST_SCALE as f64).round() as i64,
                    None => COST_SCALE,
                };
                weights.push(cost);
            }
        }

        let matrix = Matrix::from_vec(size, size, weights)
            .map_err(|e| Error::MatrixError(format!("{:?}", e)))?;
        let (_, assignments) = kuhn_munkres_min(&matrix);

        for (i, &(index, detection, _)) in rows.iter().enumerate() {
            let j = assignments[i];
            let pair = if j < m { table[i][j] } else { None };
            match pair {
                Some((iou, distance)) => {
                    let object = &ground_truth.objects()[columns[j]];
                    let matched = DetectionMatch {
                        object_id: object.id.clone(),
                        detection: index,
                        iou,
                        volumetric_iou: estimate_iou(detection, object, step, IouMode::Volumetric),
                        distance,
                    };
                    self.tally.add(&matched);
                    self.tally.true_positives += 1;
                    self.retained.insert(object.id.clone(), matched);
                }
                None => self.tally.false_positives += 1,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        geometry::{Aabb, Pose},
        object::GroundTruthObject,
    };
    use approx::assert_relative_eq;
    use nalgebra::{Point3, Vector3};

    fn unit_extents() -> Aabb {
        Aabb::new(Point3::origin(), Vector3::new(0.5, 0.5, 0.5))
    }

    fn chair_at(id: &str, x: f64) -> GroundTruthObject {
        GroundTruthObject::new(
            id,
            ["Chair"],
            Pose::new(Point3::new(x, 0.0, 0.0), Default::default()),
            unit_extents(),
        )
    }

    fn detection_at(class: &str, x: f64) -> OrientedDetection {
        OrientedDetection::from_box(
            class,
            &Pose::new(Point3::new(x, 0.0, 0.0), Default::default()),
            &unit_extents(),
        )
    }

    fn classes() -> ClassMatching {
        ClassMatching::new().with_vocabulary(["Chair", "Sofa"])
    }

    #[test]
    fn test_state_machine() {
        let gt = GroundTruth::new(vec![chair_at("Chair_0", 0.0)]).unwrap();
        let classes = classes();
        let mut evaluator = Evaluator::new("p", &gt, &classes, EvaluatorConfig::default()).unwrap();
        assert_eq!(evaluator.state(), EvaluationState::Idle);
        assert!(matches!(
            evaluator.submit(&detection_at("Chair", 0.0)),
            Err(Error::NotCollecting)
        ));
        assert!(matches!(evaluator.finish(), Err(Error::NotCollecting)));

        evaluator.begin().unwrap();
        assert!(matches!(evaluator.begin(), Err(Error::EvaluationInProgress(_))));
        evaluator.finish().unwrap();
        assert_eq!(evaluator.state(), EvaluationState::Finalized);
        evaluator.begin().unwrap();
        assert_eq!(evaluator.state(), EvaluationState::Collecting);
    }

    #[test]
    fn test_submit_outcomes() {
        let gt = GroundTruth::new(vec![chair_at("Chair_0", 0.0)]).unwrap();
        let classes = classes();
        let config = EvaluatorConfig {
            min_detections: 2,
            ..Default::default()
        };
        let mut evaluator = Evaluator::new("p", &gt, &classes, config).unwrap();
        evaluator.begin().unwrap();

        assert_eq!(evaluator.submit(&detection_at("Chair", 0.0)).unwrap(), Outcome::Ignored);
        let seen = |d: OrientedDetection| d.with_observations(2);
        assert_eq!(evaluator.submit(&seen(detection_at("Lamp", 0.0))).unwrap(), Outcome::Unresolved);
        assert_eq!(evaluator.submit(&seen(detection_at("Sofa", 0.0))).unwrap(), Outcome::Unmatched);
        assert_eq!(
            evaluator.submit(&seen(detection_at("Chair", 0.4))).unwrap(),
            Outcome::Matched {
                object_id: "Chair_0".to_string()
            }
        );
        assert_eq!(
            evaluator.submit(&seen(detection_at("Chair", 0.6))).unwrap(),
            Outcome::Redundant {
                object_id: "Chair_0".to_string(),
                replaced: false
            }
        );
        assert_eq!(
            evaluator.submit(&seen(detection_at("Chair", 0.1))).unwrap(),
            Outcome::Redundant {
                object_id: "Chair_0".to_string(),
                replaced: true
            }
        );

        let report = evaluator.finish().unwrap();
        assert_eq!(report.true_positives, 1);
        assert_eq!(report.false_positives, 3);
        assert_eq!(report.false_negatives, 0);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.unresolved, 1);
        assert_eq!(report.replaced, 1);

        let retained = evaluator.retained("Chair_0").unwrap();
        assert_eq!(retained.detection, 5);
        assert_relative_eq!(retained.iou, 0.9 / 1.1, epsilon = 1e-9);
        assert_relative_eq!(report.average_iou.unwrap(), retained.iou, epsilon = 1e-12);
        assert_relative_eq!(report.average_distance.unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_tie_keeps_first_candidate() {
        let gt = GroundTruth::new(vec![chair_at("Chair_0", -0.5), chair_at("Chair_1", 0.5)]).unwrap();
        let classes = classes();
        let mut evaluator = Evaluator::new("p", &gt, &classes, EvaluatorConfig::default()).unwrap();
        evaluator.begin().unwrap();
        let outcome = evaluator.submit(&detection_at("Chair", 0.0)).unwrap();
        assert_eq!(
            outcome,
            Outcome::Matched {
                object_id: "Chair_0".to_string()
            }
        );
    }

    #[test]
    fn test_distance_cutoff() {
        let gt = GroundTruth::new(vec![chair_at("Chair_0", 0.0)]).unwrap();
        let classes = classes();
        let config = EvaluatorConfig {
            max_distance: 0.2,
            ..Default::default()
        };
        let mut evaluator = Evaluator::new("p", &gt, &classes, config).unwrap();
        let report = evaluator
            .evaluate(&[detection_at("Chair", 0.3), detection_at("Chair", 0.1)])
            .unwrap();
        assert_eq!(report.false_positives, 1);
        assert_eq!(report.true_positives, 1);
        assert_eq!(evaluator.retained("Chair_0").unwrap().detection, 1);
    }

    #[test]
    fn test_hungarian_rejects_submit() {
        let gt = GroundTruth::new(vec![chair_at("Chair_0", 0.0)]).unwrap();
        let classes = classes();
        let config = EvaluatorConfig {
            strategy: MatchingStrategy::Hungarian,
            ..Default::default()
        };
        let mut evaluator = Evaluator::new("p", &gt, &classes, config).unwrap();
        evaluator.begin().unwrap();
        assert!(matches!(
            evaluator.submit(&detection_at("Chair", 0.0)),
            Err(Error::InvalidParameters(_))
        ));
    }

    #[test]
    fn test_hungarian_assignment() {
        let gt = GroundTruth::new(vec![chair_at("Chair_0", 0.0), chair_at("Chair_1", 1.0)]).unwrap();
        let classes = classes();
        let config = EvaluatorConfig {
            strategy: MatchingStrategy::Hungarian,
            ..Default::default()
        };
        let mut evaluator = Evaluator::new("p", &gt, &classes, config).unwrap();
        let report = evaluator
            .evaluate(&[
                detection_at("Chair", 0.4),
                detection_at("Chair", 0.0),
                detection_at("Chair", 5.0),
                detection_at("Lamp", 0.0),
            ])
            .unwrap();
        assert_eq!(report.true_positives, 2);
        assert_eq!(report.false_positives, 1);
        assert_eq!(report.false_negatives, 0);
        assert_eq!(report.unresolved, 1);
        assert_eq!(evaluator.retained("Chair_0").unwrap().detection, 1);
        assert_eq!(evaluator.retained("Chair_1").unwrap().detection, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let gt = GroundTruth::default();
        let classes = classes();
        let config = EvaluatorConfig {
            geometric_accuracy: 0.0,
            ..Default::default()
        };
        assert!(Evaluator::new("p", &gt, &classes, config).is_err());
    }
}
