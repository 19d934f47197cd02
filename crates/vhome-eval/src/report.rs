// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Running confusion counts and the final evaluation report.

use crate::{Error, evaluator::DetectionMatch};
use serde::Serialize;
use std::{fmt, io::Write};

/// Counts and sums maintained while detections are scored.
///
/// The IoU, volumetric IoU and distance sums always equal the sums over the
/// currently retained matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfusionTally {
    pub true_positives: usize,
    pub false_positives: usize,
    /// Retained matches that were taken over by a better detection.
    pub replaced: usize,
    /// Detections whose class did not resolve to a tag.
    pub unresolved: usize,
    /// Detections below the observation or certainty threshold.
    pub ignored: usize,
    pub sum_iou: f64,
    pub sum_volumetric_iou: f64,
    pub sum_distance: f64,
}

impl ConfusionTally {
    pub fn add(&mut self, m: &DetectionMatch) {
        self.sum_iou += m.iou;
        self.sum_volumetric_iou += m.volumetric_iou;
        self.sum_distance += m.distance;
    }

    pub fn subtract(&mut self, m: &DetectionMatch) {
        self.sum_iou -= m.iou;
        self.sum_volumetric_iou -= m.volumetric_iou;
        self.sum_distance -= m.distance;
    }

    /// Derives the report. `detectable` is the number of objects the
    /// pipeline was expected to find, `matched` the number of them holding a
    /// retained match.
    pub fn finalize(&self, pipeline: &str, detectable: usize, matched: usize) -> EvaluationReport {
        let tp = self.true_positives as f64;
        let fp = self.false_positives as f64;
        let false_negatives = detectable.saturating_sub(matched);
        let fn_ = false_negatives as f64;

        let accuracy = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = match (accuracy, recall) {
            (Some(p), Some(r)) if p + r > 0.0 => Some(2.0 * p * r / (p + r)),
            _ => None,
        };
        let per_match = |sum: f64| ratio(sum, matched as f64);

        EvaluationReport {
            pipeline: pipeline.to_string(),
            true_positives: self.true_positives,
            false_positives: self.false_positives,
            false_negatives,
            replaced: self.replaced,
            unresolved: self.unresolved,
            ignored: self.ignored,
            accuracy,
            recall,
            f1,
            average_iou: per_match(self.sum_iou),
            average_volumetric_iou: per_match(self.sum_volumetric_iou),
            average_distance: per_match(self.sum_distance),
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else {
        None
    }
}

/// Result of one evaluation pass.
///
/// Ratios whose denominator is zero are `None` (undefined) rather than a
/// numeric sentinel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    /// Name of the evaluated perception pipeline.
    pub pipeline: String,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub replaced: usize,
    pub unresolved: usize,
    pub ignored: usize,
    /// TP / (TP + FP), the precision of the pipeline.
    pub accuracy: Option<f64>,
    /// TP / (TP + FN).
    pub recall: Option<f64>,
    pub f1: Option<f64>,
    /// Mean planar IoU over retained matches.
    pub average_iou: Option<f64>,
    /// Mean volumetric IoU over retained matches.
    pub average_volumetric_iou: Option<f64>,
    /// Mean center distance over retained matches.
    pub average_distance: Option<f64>,
}

impl EvaluationReport {
    /// Record names and values, in output order.
    pub fn records(&self, timestamp: &str) -> Vec<(&'static str, String)> {
        vec![
            ("Time", timestamp.to_string()),
            ("TP", self.true_positives.to_string()),
            ("FP", self.false_positives.to_string()),
            ("FN", self.false_negatives.to_string()),
            ("Accuracy", record_value(self.accuracy)),
            ("Recall", record_value(self.recall)),
            ("F1", record_value(self.f1)),
            ("IoU", record_value(self.average_iou)),
            ("VIoU", record_value(self.average_volumetric_iou)),
            ("Distance", record_value(self.average_distance)),
        ]
    }

    /// Appends a results block: a separator line followed by one
    /// `label;pipeline;name;value` line per record. Undefined values are
    /// written as `NaN`.
    pub fn write_records<W: Write>(
        &self,
        writer: &mut W,
        label: &str,
        timestamp: &str,
    ) -> Result<(), Error> {
        writeln!(writer, "--------------")?;
        for (name, value) in self.records(timestamp) {
            writeln!(writer, "{};{};{};{}", label, self.pipeline, name, value)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn record_value(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "NaN".to_string(),
    }
}

fn display_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => "undefined".to_string(),
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "╔══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(f, "║ Pipeline:    {}", self.pipeline)?;
        writeln!(
            f,
            "╠══════════════════════════════════════════════════════════════╣"
        )?;
        writeln!(
            f,
            "║ TP: {}  FP: {}  FN: {}",
            self.true_positives, self.false_positives, self.false_negatives
        )?;
        if self.replaced > 0 {
            writeln!(f, "║   Replaced:  {} matches taken over", self.replaced)?;
        }
        if self.unresolved > 0 || self.ignored > 0 {
            writeln!(
                f,
                "║   Skipped:   {} unresolved, {} below threshold",
                self.unresolved, self.ignored
            )?;
        }
        writeln!(f, "║ Accuracy:    {}", display_value(self.accuracy))?;
        writeln!(f, "║ Recall:      {}", display_value(self.recall))?;
        writeln!(f, "║ F1:          {}", display_value(self.f1))?;
        writeln!(f, "║ IoU:         {}", display_value(self.average_iou))?;
        writeln!(f, "║ VIoU:        {}", display_value(self.average_volumetric_iou))?;
        writeln!(f, "║ Distance:    {}", display_value(self.average_distance))?;
        writeln!(
            f,
            "╚══════════════════════════════════════════════════════════════╝"
        )
    }
}
