// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Ground-truth objects and oriented detections.

use crate::{
    Error,
    bounds::{GeometryNode, local_bounds},
    classes::{ClassMatching, Tag},
    corners::centroid,
    geometry::{Aabb, Pose},
};
use itertools::Itertools;
use log::debug;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An authoritative object placement.
///
/// `bound` is expressed in the object's own unrotated frame; `pose` places
/// that frame in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthObject {
    /// Stable identity, unique within one [`GroundTruth`].
    pub id: String,
    pub tags: BTreeSet<Tag>,
    pub pose: Pose,
    pub bound: Aabb,
}

impl GroundTruthObject {
    pub fn new<I, T>(id: impl Into<String>, tags: I, pose: Pose, bound: Aabb) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        Self {
            id: id.into(),
            tags: tags.into_iter().map(Into::into).collect(),
            pose,
            bound,
        }
    }

    /// Builds an object whose bound is extracted from its geometry nodes.
    pub fn from_nodes<I, T>(id: impl Into<String>, tags: I, pose: Pose, nodes: &[GeometryNode]) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Tag>,
    {
        let bound = local_bounds(&pose, nodes);
        Self::new(id, tags, pose, bound)
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Center of the bound in world space.
    pub fn world_center(&self) -> Point3<f64> {
        self.pose.to_world(&self.bound.center)
    }

    /// Corners of the bound in world space, in detection corner order.
    pub fn world_corners(&self) -> [Point3<f64>; 8] {
        self.bound.corners().map(|c| self.pose.to_world(&c))
    }
}

/// The ground-truth objects of one environment and the subset of them that
/// a perception system is expected to detect.
#[derive(Debug, Clone, Default)]
pub struct GroundTruth {
    objects: Vec<GroundTruthObject>,
    detectable: Vec<usize>,
}

impl GroundTruth {
    /// Every object is detectable. Object ids must be unique.
    pub fn new(objects: Vec<GroundTruthObject>) -> Result<Self, Error> {
        let detectable = (0..objects.len()).collect();
        Self::checked(objects, detectable)
    }

    /// Only objects carrying a tag reachable from `ontology_classes` are
    /// detectable. Ontology classes that do not resolve are logged and
    /// skipped. Object ids must be unique.
    pub fn with_ontology<S: AsRef<str>>(
        objects: Vec<GroundTruthObject>,
        classes: &ClassMatching,
        ontology_classes: &[S],
    ) -> Result<Self, Error> {
        let detectable = ontology_classes
            .iter()
            .filter_map(|class| {
                let class = class.as_ref();
                let tag = classes.resolve(class);
                if tag.is_none() {
                    debug!("{} failed to resolve to a tag", class);
                }
                tag
            })
            .flat_map(|tag| {
                objects
                    .iter()
                    .enumerate()
                    .filter(move |(_, object)| object.has_tag(tag))
                    .map(|(index, _)| index)
            })
            .unique()
            .sorted()
            .collect();
        Self::checked(objects, detectable)
    }

    /// Retained matches are keyed by object id, so ids must be unique.
    fn checked(objects: Vec<GroundTruthObject>, detectable: Vec<usize>) -> Result<Self, Error> {
        if let Some(id) = objects.iter().map(|o| &o.id).duplicates().next() {
            return Err(Error::InvalidScene(format!("duplicate object id {}", id)));
        }
        Ok(Self {
            objects,
            detectable,
        })
    }

    pub fn objects(&self) -> &[GroundTruthObject] {
        &self.objects
    }

    pub fn get(&self, id: &str) -> Option<&GroundTruthObject> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn detectable(&self) -> impl Iterator<Item = &GroundTruthObject> {
        self.detectable.iter().map(|&i| &self.objects[i])
    }

    /// Indices into [`objects`](Self::objects) of the detectable objects.
    pub fn detectable_indices(&self) -> &[usize] {
        &self.detectable
    }

    pub fn detectable_count(&self) -> usize {
        self.detectable.len()
    }

    /// Detectable objects carrying `tag`, with their indices.
    pub fn candidates<'a>(
        &'a self,
        tag: &'a Tag,
    ) -> impl Iterator<Item = (usize, &'a GroundTruthObject)> + 'a {
        self.detectable
            .iter()
            .map(|&i| (i, &self.objects[i]))
            .filter(move |(_, object)| object.has_tag(tag))
    }
}

fn full_certainty() -> f64 {
    1.0
}

fn single_observation() -> u32 {
    1
}

/// A perception system's estimate of one object: class, confidence and an
/// oriented box given by its eight world-space corners.
///
/// Corners 0..3 are one face in counter-clockwise order, corners 4..7 the
/// opposite face in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrientedDetection {
    /// Class name in the perception system's ontology.
    pub class: String,
    /// Confidence in the detection.
    #[serde(default = "full_certainty")]
    pub certainty: f64,
    /// Number of independent observations merged into this detection.
    #[serde(default = "single_observation")]
    pub observations: u32,
    pub corners: [Point3<f64>; 8],
    /// Reported center. The corner centroid is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Point3<f64>>,
}

impl OrientedDetection {
    pub fn new(class: impl Into<String>, corners: [Point3<f64>; 8]) -> Self {
        Self {
            class: class.into(),
            certainty: full_certainty(),
            observations: single_observation(),
            corners,
            position: None,
        }
    }

    /// A detection of `extents` placed by `pose`.
    pub fn from_box(class: impl Into<String>, pose: &Pose, extents: &Aabb) -> Self {
        Self::new(class, extents.corners().map(|c| pose.to_world(&c)))
    }

    pub fn with_certainty(mut self, certainty: f64) -> Self {
        self.certainty = certainty;
        self
    }

    pub fn with_observations(mut self, observations: u32) -> Self {
        self.observations = observations;
        self
    }

    pub fn with_position(mut self, position: Point3<f64>) -> Self {
        self.position = Some(position);
        self
    }

    /// Center used for distance gating.
    pub fn center(&self) -> Point3<f64> {
        self.position
            .or_else(|| centroid(&self.corners))
            .unwrap_or_else(Point3::origin)
    }
}
