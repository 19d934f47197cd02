// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Local-frame bounds extraction for grouped geometry.
//!
//! A ground-truth object is usually made of several mesh-bearing nodes
//! (frame, seat and legs of a chair). Its reference bound is the minimal
//! axis-aligned box around all node geometry, expressed in the object's own
//! unrotated frame. The computation maps each world-space corner back through
//! the object's pose instead of moving the object, so nothing is mutated.

use crate::geometry::{Aabb, Pose};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// One node of an object's geometry hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryNode {
    /// World pose of the node.
    #[serde(default)]
    pub pose: Pose,
    /// Node scale applied to the mesh bound before the pose.
    #[serde(default = "unit_scale")]
    pub scale: Vector3<f64>,
    /// Bound of the node's mesh in mesh coordinates. Nodes without geometry
    /// contribute their position only.
    #[serde(default)]
    pub mesh: Option<Aabb>,
}

fn unit_scale() -> Vector3<f64> {
    Vector3::repeat(1.0)
}

impl GeometryNode {
    /// A node without geometry.
    pub fn empty(pose: Pose) -> Self {
        Self {
            pose,
            scale: unit_scale(),
            mesh: None,
        }
    }

    pub fn with_mesh(pose: Pose, mesh: Aabb) -> Self {
        Self {
            pose,
            scale: unit_scale(),
            mesh: Some(mesh),
        }
    }

    pub fn with_scale(mut self, scale: Vector3<f64>) -> Self {
        self.scale = scale;
        self
    }

    /// World-space points describing the node: the eight corners of its mesh
    /// bound, or its position when it has no mesh.
    pub fn world_points(&self) -> Vec<Point3<f64>> {
        match &self.mesh {
            Some(mesh) => mesh
                .corners()
                .iter()
                .map(|c| self.pose.to_world(&Point3::from(c.coords.component_mul(&self.scale))))
                .collect(),
            None => vec![self.pose.position],
        }
    }
}

/// Minimal axis-aligned box around `nodes`, expressed in the local frame of
/// `frame`.
///
/// Returns a zero-size box at the origin when `nodes` is empty.
pub fn local_bounds(frame: &Pose, nodes: &[GeometryNode]) -> Aabb {
    let local: Vec<Point3<f64>> = nodes
        .iter()
        .flat_map(GeometryNode::world_points)
        .map(|p| frame.to_local(&p))
        .collect();
    Aabb::from_points(&local).unwrap_or_else(Aabb::zero)
}
