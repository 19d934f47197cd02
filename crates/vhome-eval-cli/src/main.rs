// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use log::{debug, info, warn};
use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
};
use vhome_eval::{
    Error, EvaluationReport, Evaluator, EvaluatorConfig, IouMode, MatchingStrategy, Scene,
    align_corners, estimate_iou, load_detections,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Evaluator configuration file. Defaults to config.toml in the user
    /// configuration directory when present.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Evaluation Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Evaluate one or more detection files against a scene's ground truth.
    /// Each detection file is one pipeline, named after the file.
    Evaluate {
        /// Scene ground-truth document
        #[clap(long)]
        scene: PathBuf,

        /// Detection files (JSON arrays of oriented detections)
        #[clap(required = true)]
        detections: Vec<PathBuf>,

        /// Matching strategy, overrides the configuration
        #[clap(long)]
        strategy: Option<MatchingStrategy>,

        /// IoU grid spacing, overrides the configuration
        #[clap(long)]
        geometric_accuracy: Option<f64>,

        /// Append semicolon-separated result records to this file
        #[clap(long)]
        record: Option<PathBuf>,

        /// Label of the result records, defaults to the scene name
        #[clap(long)]
        label: Option<String>,

        /// Print the reports as JSON
        #[clap(long)]
        json: bool,
    },
    /// Estimate the overlap between one detection and one ground-truth
    /// object.
    Iou {
        /// Scene ground-truth document
        #[clap(long)]
        scene: PathBuf,

        /// Detection file
        #[clap(long)]
        detections: PathBuf,

        /// Position of the detection in the file
        #[clap(long, default_value_t = 0)]
        index: usize,

        /// Ground-truth object id
        #[clap(long)]
        object: String,

        /// IoU grid spacing, overrides the configuration
        #[clap(long)]
        geometric_accuracy: Option<f64>,
    },
    /// Print the effective evaluator configuration.
    Config,
}

fn default_config_path() -> Option<PathBuf> {
    let path = ProjectDirs::from("ai", "EdgeFirst", "vhome-eval")?
        .config_dir()
        .join("config.toml");
    path.exists().then_some(path)
}

fn load_config(path: Option<&Path>) -> Result<EvaluatorConfig, Error> {
    let path = path.map(Path::to_path_buf).or_else(default_config_path);
    debug!("Using configuration file: {:?}", path);
    EvaluatorConfig::load(path.as_deref())
}

fn pipeline_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn append_records(
    path: &Path,
    label: &str,
    timestamp: &str,
    reports: &[EvaluationReport],
) -> Result<(), Error> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    for report in reports {
        report.write_records(&mut file, label, timestamp)?;
    }
    info!("Appended {} result blocks to {:?}", reports.len(), path);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_evaluate(
    mut config: EvaluatorConfig,
    scene_path: &Path,
    detections: &[PathBuf],
    strategy: Option<MatchingStrategy>,
    geometric_accuracy: Option<f64>,
    record: Option<PathBuf>,
    label: Option<String>,
    json: bool,
) -> Result<(), Error> {
    if let Some(strategy) = strategy {
        config.strategy = strategy;
    }
    if let Some(step) = geometric_accuracy {
        config.geometric_accuracy = step;
    }
    config.validate()?;

    let scene = Scene::load(scene_path)?;
    let ground_truth = scene.ground_truth()?;
    let classes = scene.classes();
    info!(
        "Scene {:?}: {} objects, {} detectable",
        scene_path,
        ground_truth.objects().len(),
        ground_truth.detectable_count()
    );

    let started = chrono::Local::now();
    let mut reports = Vec::with_capacity(detections.len());
    for path in detections {
        let batch = load_detections(path)?;
        let mut evaluator =
            Evaluator::new(pipeline_name(path), &ground_truth, &classes, config.clone())?;
        reports.push(evaluator.evaluate(&batch)?);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            print!("{}", report);
        }
    }

    if let Some(record) = record {
        let label = label
            .or_else(|| scene.name.clone())
            .unwrap_or_else(|| pipeline_name(scene_path));
        let timestamp = started.format("%Y-%m-%d %H:%M:%S").to_string();
        append_records(&record, &label, &timestamp, &reports)?;
    }

    Ok(())
}

fn handle_iou(
    mut config: EvaluatorConfig,
    scene_path: &Path,
    detections: &Path,
    index: usize,
    object_id: &str,
    geometric_accuracy: Option<f64>,
) -> Result<(), Error> {
    if let Some(step) = geometric_accuracy {
        config.geometric_accuracy = step;
    }
    config.validate()?;

    let scene = Scene::load(scene_path)?;
    let ground_truth = scene.ground_truth()?;
    let object = ground_truth
        .get(object_id)
        .ok_or_else(|| Error::UnknownObject(object_id.to_string()))?;
    let batch = load_detections(detections)?;
    let detection = batch.get(index).ok_or_else(|| {
        Error::InvalidParameters(format!(
            "detection index {} out of range, {} has {} detections",
            index,
            detections.display(),
            batch.len()
        ))
    })?;

    let step = config.geometric_accuracy;
    let planar = estimate_iou(detection, object, step, IouMode::Planar);
    let volumetric = estimate_iou(detection, object, step, IouMode::Volumetric);
    let distance = (object.world_center() - detection.center()).norm();
    let (_, corner_error) = align_corners(&object.world_corners(), &detection.corners);

    let resolved = scene.classes().resolve(&detection.class).cloned();
    if !resolved.is_some_and(|tag| object.has_tag(&tag)) {
        warn!(
            "Detection class {} does not match the tags of {}",
            detection.class, object.id
        );
    }

    println!("Object:       {}", object.id);
    println!("Detection:    {} ({})", index, detection.class);
    println!("Planar IoU:   {:.4}", planar);
    println!("Volume IoU:   {:.4}", volumetric);
    println!("Distance:     {:.4}", distance);
    println!("Corner error: {:.4}", corner_error);
    Ok(())
}

#[cfg(feature = "profiling")]
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(FmtSpan::CLOSE)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        warn!("Tracing disabled: {}", err);
    }
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    #[cfg(feature = "profiling")]
    init_tracing();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.cmd {
        Command::Evaluate {
            scene,
            detections,
            strategy,
            geometric_accuracy,
            record,
            label,
            json,
        } => handle_evaluate(
            config,
            &scene,
            &detections,
            strategy,
            geometric_accuracy,
            record,
            label,
            json,
        ),
        Command::Iou {
            scene,
            detections,
            index,
            object,
            geometric_accuracy,
        } => handle_iou(config, &scene, &detections, index, &object, geometric_accuracy),
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
