// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Oriented-box corner transforms and corner-order heuristics.
//!
//! Corner convention: corners 0..3 are one face in counter-clockwise order
//! (0→1 is one edge, 0→3 the perpendicular edge), corners 4..7 are the
//! opposite face in the same order.

use crate::geometry::Pose;
use nalgebra::Point3;

/// Expresses world-space corners in the local frame of `reference`.
pub fn to_local_frame(corners: &[Point3<f64>], reference: &Pose) -> Vec<Point3<f64>> {
    corners.iter().map(|c| reference.to_local(c)).collect()
}

/// Relabels a box by one quarter turn about its face normal.
pub fn rotate_corner_order(corners: &[Point3<f64>; 8]) -> [Point3<f64>; 8] {
    [
        corners[1], corners[2], corners[3], corners[0], corners[5], corners[6], corners[7],
        corners[4],
    ]
}

/// Finds the quarter-turn relabeling of `observation` that best lines up with
/// `reference`.
///
/// Returns the relabeled corners and the mean corner-to-corner distance of
/// that labeling. Corner detectors often report the right box with a
/// different starting corner; comparing corners pairwise is only meaningful
/// after this alignment.
pub fn align_corners(
    reference: &[Point3<f64>; 8],
    observation: &[Point3<f64>; 8],
) -> ([Point3<f64>; 8], f64) {
    let cost = |candidate: &[Point3<f64>; 8]| -> f64 {
        reference
            .iter()
            .zip(candidate)
            .map(|(a, b)| (a - b).norm_squared())
            .sum()
    };

    let mut best = *observation;
    let mut best_cost = cost(&best);
    let mut candidate = *observation;
    for _ in 1..4 {
        candidate = rotate_corner_order(&candidate);
        let c = cost(&candidate);
        if c < best_cost {
            best = candidate;
            best_cost = c;
        }
    }

    let mean = reference
        .iter()
        .zip(&best)
        .map(|(a, b)| (a - b).norm())
        .sum::<f64>()
        / 8.0;
    (best, mean)
}

/// Centroid of a set of corners.
pub fn centroid(corners: &[Point3<f64>]) -> Option<Point3<f64>> {
    if corners.is_empty() {
        return None;
    }
    let sum = corners
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, c| acc + c.coords);
    Some(Point3::from(sum / corners.len() as f64))
}
