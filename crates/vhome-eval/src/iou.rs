// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Discrete Intersection-over-Union between an oriented box and an
//! axis-aligned reference bound.
//!
//! The oriented box is rasterized on a regular grid spanned by one of its
//! faces (and, in volumetric mode, by its z-extent). Each grid cell is
//! represented by its center; the cells whose center falls inside the
//! reference bound approximate the intersection, the remaining cells the part
//! of the detection outside of it:
//!
//! ```text
//! IoU = inside * cell / ((total - inside) * cell + reference)
//! ```
//!
//! where `cell` is the area (planar) or volume (volumetric) of one grid cell
//! and `reference` the bound's footprint area or volume. The grid spacing is
//! the configured geometric accuracy: halving it quadruples (planar) or
//! octuples (volumetric) the number of samples. Grids above [`MAX_SAMPLES`]
//! are not sampled and estimate 0.

use crate::{
    corners::to_local_frame,
    geometry::Aabb,
    object::{GroundTruthObject, OrientedDetection},
};
use nalgebra::{Point3, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

/// Lengths at or below this are treated as degenerate.
const LENGTH_EPSILON: f64 = 1e-9;

/// Largest grid a single estimate samples. A 20 m × 20 m footprint at the
/// default 0.1 step takes 40 000 samples.
pub const MAX_SAMPLES: u64 = 1 << 22;

/// Which overlap measure to estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IouMode {
    /// Footprint overlap on the x/y plane; z is ignored.
    Planar,
    /// Volume overlap.
    Volumetric,
}

impl std::fmt::Display for IouMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            IouMode::Planar => "planar",
            IouMode::Volumetric => "volumetric",
        };
        write!(f, "{}", value)
    }
}

/// Number of grid cells covering `length` at spacing `step`, at least one.
fn cell_count(length: f64, step: f64) -> f64 {
    ((length / step) - 1e-6).ceil().max(1.0)
}

/// Estimates the IoU between an oriented box and `bound`.
///
/// `local_corners` must already be expressed in the bound's frame (see
/// [`to_local_frame`]). Corners 0, 1 and 3 span the sampled face; volumetric
/// mode takes the z-extent over every supplied corner. Degenerate input
/// (fewer than four corners, zero-length edges, zero height in volumetric
/// mode, non-positive step) yields 0, as does a grid of more than
/// [`MAX_SAMPLES`] samples.
pub fn discrete_iou(local_corners: &[Point3<f64>], bound: &Aabb, step: f64, mode: IouMode) -> f64 {
    if local_corners.len() < 4 || !step.is_finite() || step <= 0.0 {
        log::debug!(
            "Degenerate IoU input: {} corners, step {}",
            local_corners.len(),
            step
        );
        return 0.0;
    }

    let c0 = local_corners[0];
    let along = Vector2::new(local_corners[3].x - c0.x, local_corners[3].y - c0.y);
    let across = Vector2::new(local_corners[1].x - c0.x, local_corners[1].y - c0.y);
    let (along_len, across_len) = (along.norm(), across.norm());
    if !(along_len.is_finite() && across_len.is_finite())
        || along_len <= LENGTH_EPSILON
        || across_len <= LENGTH_EPSILON
    {
        return 0.0;
    }

    let theta = along.y.atan2(along.x);
    // 0→1 normally lies a quarter turn clockwise of 0→3; a clockwise face is
    // swept the other way.
    let cross = along.x * across.y - along.y * across.x;
    let side = if cross > 0.0 {
        theta + FRAC_PI_2
    } else {
        theta - FRAC_PI_2
    };
    let (dir_x, dir_y) = (theta.cos(), theta.sin());
    let (side_x, side_y) = (side.cos(), side.sin());

    let (z_min, z_cells, z_step) = match mode {
        IouMode::Planar => (0.0, 1.0, 1.0),
        IouMode::Volumetric => {
            let (z_min, z_max) = local_corners
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                    (lo.min(c.z), hi.max(c.z))
                });
            let height = z_max - z_min;
            if !height.is_finite() || height <= LENGTH_EPSILON {
                return 0.0;
            }
            let n = cell_count(height, step);
            (z_min, n, height / n)
        }
    };

    let along_cells = cell_count(along_len, step);
    let across_cells = cell_count(across_len, step);
    let samples = along_cells * across_cells * z_cells;
    if !samples.is_finite() || samples > MAX_SAMPLES as f64 {
        log::warn!(
            "IoU grid of {:.0} samples at step {} exceeds {}, estimating 0",
            samples,
            step,
            MAX_SAMPLES
        );
        return 0.0;
    }
    let along_step = along_len / along_cells;
    let across_step = across_len / across_cells;
    let (along_cells, across_cells, z_cells) =
        (along_cells as usize, across_cells as usize, z_cells as usize);

    let mut inside: u64 = 0;
    for i in 0..along_cells {
        let d = (i as f64 + 0.5) * along_step;
        for j in 0..across_cells {
            let d2 = (j as f64 + 0.5) * across_step;
            let x = c0.x + d2 * side_x + d * dir_x;
            let y = c0.y + d2 * side_y + d * dir_y;
            match mode {
                IouMode::Planar => {
                    if bound.contains_xy(&Point3::new(x, y, 0.0)) {
                        inside += 1;
                    }
                }
                IouMode::Volumetric => {
                    for k in 0..z_cells {
                        let z = z_min + (k as f64 + 0.5) * z_step;
                        if bound.contains(&Point3::new(x, y, z)) {
                            inside += 1;
                        }
                    }
                }
            }
        }
    }

    let total = samples as u64;
    let (cell, reference) = match mode {
        IouMode::Planar => (along_step * across_step, bound.footprint_area()),
        IouMode::Volumetric => (along_step * across_step * z_step, bound.volume()),
    };

    let union = (total - inside) as f64 * cell + reference;
    if inside == 0 || union <= 0.0 {
        return 0.0;
    }
    (inside as f64 * cell / union).min(1.0)
}

/// Estimates the IoU between a detection and a ground-truth object after
/// moving the detection's corners into the object's local frame.
pub fn estimate_iou(
    detection: &OrientedDetection,
    object: &GroundTruthObject,
    step: f64,
    mode: IouMode,
) -> f64 {
    let local = to_local_frame(&detection.corners, &object.pose);
    discrete_iou(&local, &object.bound, step, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rotation_from_degrees;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn unit_box() -> Aabb {
        Aabb::new(Point3::origin(), Vector3::new(0.5, 0.5, 0.5))
    }

    fn shifted_unit_box(dx: f64) -> [Point3<f64>; 8] {
        Aabb::new(Point3::new(dx, 0.0, 0.0), Vector3::new(0.5, 0.5, 0.5)).corners()
    }

    #[test]
    fn test_coincident_boxes() {
        let corners = unit_box().corners();
        for step in [0.5, 0.1, 0.03] {
            assert_relative_eq!(
                discrete_iou(&corners, &unit_box(), step, IouMode::Planar),
                1.0,
                epsilon = 1e-9
            );
            assert_relative_eq!(
                discrete_iou(&corners, &unit_box(), step, IouMode::Volumetric),
                1.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_disjoint_boxes() {
        let corners = shifted_unit_box(3.0);
        assert_eq!(discrete_iou(&corners, &unit_box(), 0.1, IouMode::Planar), 0.0);
        assert_eq!(discrete_iou(&corners, &unit_box(), 0.1, IouMode::Volumetric), 0.0);
    }

    #[test]
    fn test_half_offset_cubes() {
        // Intersection 0.5, union 1.5.
        let corners = shifted_unit_box(0.5);
        for mode in [IouMode::Planar, IouMode::Volumetric] {
            assert_relative_eq!(
                discrete_iou(&corners, &unit_box(), 0.1, mode),
                1.0 / 3.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn test_finer_step_converges() {
        // Overlap of 0.17 along x: IoU = 0.17 / 1.83.
        let expected = 0.17 / 1.83;
        let corners = shifted_unit_box(0.83);
        let errors: Vec<f64> = [0.25, 0.1, 0.01]
            .iter()
            .map(|&step| (discrete_iou(&corners, &unit_box(), step, IouMode::Volumetric) - expected).abs())
            .collect();
        assert!(errors[0] > errors[1], "{:?}", errors);
        assert!(errors[1] > errors[2], "{:?}", errors);
        assert!(errors[2] < 1e-6, "{:?}", errors);
    }

    #[test]
    fn test_rotated_square() {
        // A unit square rotated 45 degrees about the shared center overlaps
        // in a regular octagon of area 2(sqrt(2) - 1).
        let rotation = rotation_from_degrees(0.0, 0.0, 45.0);
        let corners: Vec<Point3<f64>> = unit_box()
            .corners()
            .iter()
            .map(|c| Point3::from(rotation * c.coords))
            .collect();
        let octagon = 2.0 * (2f64.sqrt() - 1.0);
        let expected = octagon / (2.0 - octagon);
        let planar = discrete_iou(&corners, &unit_box(), 0.01, IouMode::Planar);
        let volumetric = discrete_iou(&corners, &unit_box(), 0.01, IouMode::Volumetric);
        assert!((planar - expected).abs() < 0.01, "planar {}", planar);
        assert!((volumetric - expected).abs() < 0.01, "volumetric {}", volumetric);
    }

    #[test]
    fn test_clockwise_face_matches_counter_clockwise() {
        let ccw = shifted_unit_box(0.25);
        let mut cw = ccw;
        cw.swap(1, 3);
        cw.swap(5, 7);
        for mode in [IouMode::Planar, IouMode::Volumetric] {
            assert_relative_eq!(
                discrete_iou(&cw, &unit_box(), 0.05, mode),
                discrete_iou(&ccw, &unit_box(), 0.05, mode),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_step_larger_than_box_still_samples() {
        let small = Aabb::new(Point3::origin(), Vector3::new(0.1, 0.1, 0.1)).corners();
        let planar = discrete_iou(&small, &unit_box(), 1.0, IouMode::Planar);
        assert_relative_eq!(planar, 0.04, epsilon = 1e-12);
        let volumetric = discrete_iou(&small, &unit_box(), 1.0, IouMode::Volumetric);
        assert_relative_eq!(volumetric, 0.008, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_geometry() {
        let corners = unit_box().corners();
        assert_eq!(discrete_iou(&corners[..3], &unit_box(), 0.1, IouMode::Planar), 0.0);
        assert_eq!(discrete_iou(&corners, &unit_box(), 0.0, IouMode::Planar), 0.0);
        assert_eq!(discrete_iou(&corners, &unit_box(), f64::NAN, IouMode::Planar), 0.0);

        // Flat detection: footprint overlaps, volume does not exist.
        let flat: Vec<Point3<f64>> = corners[..4].to_vec();
        assert_relative_eq!(discrete_iou(&flat, &unit_box(), 0.1, IouMode::Planar), 1.0, epsilon = 1e-9);
        assert_eq!(discrete_iou(&flat, &unit_box(), 0.1, IouMode::Volumetric), 0.0);

        // Collapsed edge.
        let mut collapsed = corners;
        collapsed[3] = collapsed[0];
        assert_eq!(discrete_iou(&collapsed, &unit_box(), 0.1, IouMode::Planar), 0.0);

        // Zero-size reference and no overlap.
        assert_eq!(discrete_iou(&shifted_unit_box(5.0), &Aabb::zero(), 0.1, IouMode::Planar), 0.0);
    }

    #[test]
    fn test_oversized_grid_is_not_sampled() {
        // 4000 × 4000 planar cells, above the sample limit.
        let huge = Aabb::new(Point3::origin(), Vector3::new(200.0, 200.0, 0.5)).corners();
        assert_eq!(discrete_iou(&huge, &unit_box(), 0.1, IouMode::Planar), 0.0);
        assert_eq!(discrete_iou(&huge, &unit_box(), 0.1, IouMode::Volumetric), 0.0);

        // The same box at a coarser step fits the limit.
        let reference = Aabb::new(Point3::origin(), Vector3::repeat(0.7));
        let coarse = discrete_iou(&huge, &reference, 1.0, IouMode::Planar);
        assert!(coarse > 0.0 && coarse < 1e-4);

        // Corners near the float limit overflow the edge lengths.
        let extreme = Aabb::new(Point3::origin(), Vector3::repeat(f64::MAX / 2.0)).corners();
        assert_eq!(discrete_iou(&extreme, &unit_box(), 0.1, IouMode::Planar), 0.0);
        assert_eq!(discrete_iou(&extreme, &unit_box(), 0.1, IouMode::Volumetric), 0.0);
    }
}
