// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Rigid poses and axis-aligned boxes.
//!
//! Points and vectors are [`nalgebra`] types. Rotations are unit quaternions
//! and are serialized as `[x, y, z, w]` arrays, normalized on load.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Position and orientation of an object in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position.
    #[serde(default = "origin")]
    pub position: Point3<f64>,
    /// World rotation.
    #[serde(default = "UnitQuaternion::identity", with = "xyzw")]
    pub rotation: UnitQuaternion<f64>,
}

fn origin() -> Point3<f64> {
    Point3::origin()
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Point3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    /// The pose at the origin with no rotation.
    pub fn identity() -> Self {
        Self::new(Point3::origin(), UnitQuaternion::identity())
    }

    /// Expresses a world-space point in this pose's local frame:
    /// `inverse(rotation) * (world - position)`.
    pub fn to_local(&self, world: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.inverse() * (world - self.position))
    }

    /// Maps a point in this pose's local frame to world space.
    pub fn to_world(&self, local: &Point3<f64>) -> Point3<f64> {
        self.position + self.rotation * local.coords
    }
}

/// Axis-aligned bounding box stored as center and half-extents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Point3<f64>,
    pub half_extents: Vector3<f64>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::zero()
    }
}

impl Aabb {
    pub fn new(center: Point3<f64>, half_extents: Vector3<f64>) -> Self {
        Self {
            center,
            half_extents: half_extents.abs(),
        }
    }

    /// Zero-size box at the origin.
    pub fn zero() -> Self {
        Self::new(Point3::origin(), Vector3::zeros())
    }

    pub fn from_min_max(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self::new(nalgebra::center(&min, &max), (max - min) / 2.0)
    }

    /// Minimal box enclosing `points`, or `None` when there are no points.
    pub fn from_points<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Point3<f64>>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((*first, *first), |(min, max), p| {
            (min.inf(p), max.sup(p))
        });
        Some(Self::from_min_max(min, max))
    }

    pub fn min(&self) -> Point3<f64> {
        self.center - self.half_extents
    }

    pub fn max(&self) -> Point3<f64> {
        self.center + self.half_extents
    }

    /// Full edge lengths along x, y and z.
    pub fn size(&self) -> Vector3<f64> {
        self.half_extents * 2.0
    }

    pub fn volume(&self) -> f64 {
        let size = self.size();
        size.x * size.y * size.z
    }

    /// Area of the box's projection onto the x/y plane.
    pub fn footprint_area(&self) -> f64 {
        let size = self.size();
        size.x * size.y
    }

    /// Inclusive containment test.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let d = (p - self.center).abs();
        d.x <= self.half_extents.x && d.y <= self.half_extents.y && d.z <= self.half_extents.z
    }

    /// Inclusive containment test on the x/y footprint, ignoring z.
    pub fn contains_xy(&self, p: &Point3<f64>) -> bool {
        (p.x - self.center.x).abs() <= self.half_extents.x
            && (p.y - self.center.y).abs() <= self.half_extents.y
    }

    /// The eight corners in detection order: the `z = min` face
    /// counter-clockwise starting at `(min.x, min.y)`, then the `z = max`
    /// face in the same order.
    pub fn corners(&self) -> [Point3<f64>; 8] {
        let (lo, hi) = (self.min(), self.max());
        [
            Point3::new(lo.x, lo.y, lo.z),
            Point3::new(hi.x, lo.y, lo.z),
            Point3::new(hi.x, hi.y, lo.z),
            Point3::new(lo.x, hi.y, lo.z),
            Point3::new(lo.x, lo.y, hi.z),
            Point3::new(hi.x, lo.y, hi.z),
            Point3::new(hi.x, hi.y, hi.z),
            Point3::new(lo.x, hi.y, hi.z),
        ]
    }
}

/// Serde adapter for quaternions written as `[x, y, z, w]`.
pub(crate) mod xyzw {
    use nalgebra::{Quaternion, UnitQuaternion};
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(q: &UnitQuaternion<f64>, s: S) -> Result<S::Ok, S::Error> {
        let c = q.quaternion().coords;
        [c.x, c.y, c.z, c.w].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<UnitQuaternion<f64>, D::Error> {
        let [x, y, z, w] = <[f64; 4]>::deserialize(d)?;
        let q = Quaternion::new(w, x, y, z);
        if !(q.norm() > f64::EPSILON) {
            return Err(D::Error::custom("rotation quaternion has zero length"));
        }
        Ok(UnitQuaternion::from_quaternion(q))
    }
}

/// Builds a rotation from roll/pitch/yaw in degrees.
pub fn rotation_from_degrees(roll: f64, pitch: f64, yaw: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians())
}
