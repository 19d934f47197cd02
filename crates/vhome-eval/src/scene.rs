// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! JSON documents describing a scene's ground truth and a pipeline's
//! detections.
//!
//! A scene lists its objects with either a precomputed local `bound` or the
//! geometry `nodes` the bound is extracted from:
//!
//! ```json
//! {
//!   "name": "house_3",
//!   "objects": [
//!     {
//!       "id": "Chair_0",
//!       "tags": ["Chair"],
//!       "pose": { "position": [1.0, 2.0, 0.0], "rotation": [0.0, 0.0, 0.0, 1.0] },
//!       "bound": { "center": [0.0, 0.0, 0.45], "half_extents": [0.25, 0.25, 0.45] }
//!     }
//!   ],
//!   "class_matching": { "mappings": { "chair": "Chair" }, "vocabulary": ["Chair"] },
//!   "ontology_classes": ["chair"]
//! }
//! ```
//!
//! Detections are a JSON array of [`OrientedDetection`].

use crate::{
    Error,
    bounds::GeometryNode,
    classes::{ClassMatching, Tag},
    geometry::{Aabb, Pose},
    object::{GroundTruth, GroundTruthObject, OrientedDetection},
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

/// One object as stored in a scene document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub pose: Pose,
    /// Bound in the object's local frame. Takes precedence over `nodes`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<Aabb>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<GeometryNode>,
}

impl SceneObject {
    pub fn to_ground_truth(&self) -> Result<GroundTruthObject, Error> {
        let tags = self.tags.iter().cloned();
        match (&self.bound, self.nodes.is_empty()) {
            (Some(bound), _) => Ok(GroundTruthObject::new(&self.id, tags, self.pose, *bound)),
            (None, false) => Ok(GroundTruthObject::from_nodes(&self.id, tags, self.pose, &self.nodes)),
            (None, true) => Err(Error::InvalidScene(format!(
                "object {} has neither a bound nor geometry nodes",
                self.id
            ))),
        }
    }
}

/// Ground truth of one environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub objects: Vec<SceneObject>,
    #[serde(default)]
    pub class_matching: ClassMatching,
    /// Classes the evaluated pipelines can report. When absent every object
    /// is detectable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ontology_classes: Option<Vec<String>>,
}

impl Scene {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        debug!("Loading scene {:?}", path);
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// The class table of the scene. Without an explicit vocabulary, the
    /// tags carried by the scene's objects form the vocabulary.
    pub fn classes(&self) -> ClassMatching {
        if !self.class_matching.is_vocabulary_empty() {
            return self.class_matching.clone();
        }
        self.class_matching
            .clone()
            .with_vocabulary(self.objects.iter().flat_map(|o| o.tags.iter().cloned()))
    }

    /// Builds the ground truth, extracting bounds where needed.
    ///
    /// Object ids must be unique.
    pub fn ground_truth(&self) -> Result<GroundTruth, Error> {
        let objects = self
            .objects
            .iter()
            .map(SceneObject::to_ground_truth)
            .collect::<Result<Vec<_>, _>>()?;
        match &self.ontology_classes {
            Some(ontology) => GroundTruth::with_ontology(objects, &self.classes(), ontology.as_slice()),
            None => GroundTruth::new(objects),
        }
    }
}

/// Loads a JSON array of detections.
pub fn load_detections(path: impl AsRef<Path>) -> Result<Vec<OrientedDetection>, Error> {
    let path = path.as_ref();
    debug!("Loading detections {:?}", path);
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::io::Write;

    const SCENE: &str = r#"{
        "name": "house_3",
        "objects": [
            {
                "id": "Chair_0",
                "tags": ["Chair"],
                "pose": { "position": [1.0, 2.0, 0.0], "rotation": [0.0, 0.0, 0.0, 1.0] },
                "bound": { "center": [0.0, 0.0, 0.45], "half_extents": [0.25, 0.25, 0.45] }
            },
            {
                "id": "Table_0",
                "tags": ["Table"],
                "pose": { "position": [3.0, 0.0, 0.0] },
                "nodes": [
                    {
                        "pose": { "position": [3.0, 0.0, 0.4] },
                        "mesh": { "center": [0.0, 0.0, 0.0], "half_extents": [0.5, 0.5, 0.5] },
                        "scale": [2.0, 1.0, 0.8]
                    }
                ]
            },
            {
                "id": "Door_0",
                "tags": ["Door"],
                "bound": { "center": [0.0, 0.0, 1.0], "half_extents": [0.45, 0.05, 1.0] }
            }
        ],
        "class_matching": { "mappings": { "chair": "Chair", "desk": "Table" } },
        "ontology_classes": ["chair", "desk"]
    }"#;

    #[test]
    fn test_scene_ground_truth() {
        let scene = Scene::from_json(SCENE).unwrap();
        assert_eq!(scene.name.as_deref(), Some("house_3"));

        let gt = scene.ground_truth().unwrap();
        assert_eq!(gt.objects().len(), 3);
        let ids: Vec<&str> = gt.detectable().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["Chair_0", "Table_0"]);

        let table = gt.get("Table_0").unwrap();
        assert_relative_eq!(table.bound.min(), Point3::new(-1.0, -0.5, 0.0), epsilon = 1e-12);
        assert_relative_eq!(table.bound.max(), Point3::new(1.0, 0.5, 0.8), epsilon = 1e-12);
        assert_relative_eq!(gt.get("Chair_0").unwrap().world_center(), Point3::new(1.0, 2.0, 0.45));
    }

    #[test]
    fn test_vocabulary_falls_back_to_object_tags() {
        let scene = Scene::from_json(SCENE).unwrap();
        let classes = scene.classes();
        assert_eq!(classes.resolve("Door").map(Tag::as_str), Some("Door"));
        assert_eq!(classes.resolve("desk").map(Tag::as_str), Some("Table"));
        assert!(classes.resolve("Lamp").is_none());
    }

    #[test]
    fn test_invalid_scenes() {
        let missing = r#"{"objects": [{"id": "Lamp_0", "tags": ["Lamp"]}]}"#;
        assert!(matches!(
            Scene::from_json(missing).unwrap().ground_truth(),
            Err(Error::InvalidScene(_))
        ));

        let duplicate = r#"{"objects": [
            {"id": "A", "bound": {"center": [0,0,0], "half_extents": [1,1,1]}},
            {"id": "A", "bound": {"center": [0,0,0], "half_extents": [1,1,1]}}
        ]}"#;
        assert!(matches!(
            Scene::from_json(duplicate).unwrap().ground_truth(),
            Err(Error::InvalidScene(_))
        ));

        assert!(matches!(Scene::from_json("{"), Err(Error::JsonError(_))));
        assert!(matches!(Scene::load("/nonexistent/scene.json"), Err(Error::IoError(_))));
    }

    #[test]
    fn test_load_files() {
        let dir = tempfile::tempdir().unwrap();
        let scene_path = dir.path().join("scene.json");
        std::fs::write(&scene_path, SCENE).unwrap();
        assert_eq!(Scene::load(&scene_path).unwrap(), Scene::from_json(SCENE).unwrap());

        let detections_path = dir.path().join("detections.json");
        let mut file = File::create(&detections_path).unwrap();
        write!(
            file,
            r#"[{{"class": "chair", "certainty": 0.8, "observations": 3,
                 "corners": [[0,0,0],[1,0,0],[1,1,0],[0,1,0],[0,0,1],[1,0,1],[1,1,1],[0,1,1]]}}]"#
        )
        .unwrap();
        drop(file);
        let detections = load_detections(&detections_path).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, "chair");
        assert_eq!(detections[0].observations, 3);
    }
}
