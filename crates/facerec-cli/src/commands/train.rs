//! `facerec train`: build the LBPH model from `dataset/<person>/*`.

use crate::config::Config;
use anyhow::{Context, Result};
use facerec_core::{Detector, LabelMap, LbphRecognizer, SsdDetector};
use image::GrayImage;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp"];

/// Faces and integer labels gathered from the dataset.
#[derive(Default)]
pub struct TrainingSet {
    pub faces: Vec<GrayImage>,
    pub labels: Vec<i32>,
    pub label_map: LabelMap,
    pub skipped: usize,
}

pub fn run(config: &Config) -> Result<()> {
    if !config.dataset_dir.is_dir() {
        anyhow::bail!("dataset directory {} does not exist", config.dataset_dir.display());
    }
    let mut detector = SsdDetector::load(&config.detector_model_path(), config.min_confidence)?;

    let paths = collect_image_paths(&config.dataset_dir);
    tracing::info!(dir = %config.dataset_dir.display(), images = paths.len(), "scanned dataset");

    let set = gather(&paths, &mut detector)?;
    if set.faces.is_empty() {
        anyhow::bail!("no usable faces found under {}", config.dataset_dir.display());
    }

    let model = LbphRecognizer::train(&set.faces, &set.labels)?;
    model
        .save(&config.lbph_model_path)
        .context("failed to save LBPH model")?;
    set.label_map
        .save(&config.label_map_path)
        .context("failed to save label map")?;

    println!(
        "Trained on {} face(s) from {} person(s); skipped {} image(s)",
        set.faces.len(),
        set.label_map.len(),
        set.skipped
    );
    Ok(())
}

/// Detect the best face in each image and crop it to grayscale. Images that
/// fail to decode or contain no face are skipped.
pub fn gather<D: Detector + ?Sized>(paths: &[PathBuf], detector: &mut D) -> Result<TrainingSet> {
    let mut set = TrainingSet::default();

    for path in paths {
        let Some(label) = label_for(path) else {
            set.skipped += 1;
            continue;
        };
        let image = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                set.skipped += 1;
                continue;
            }
        };

        let region = detector
            .best_face(&image)?
            .and_then(|face| face.clamp(image.width(), image.height()));
        let Some(region) = region else {
            tracing::warn!(path = %path.display(), "skipping image without a face");
            set.skipped += 1;
            continue;
        };

        let id = set.label_map.assign(&label);
        set.faces.push(image::imageops::grayscale(&region.crop(&image)));
        set.labels.push(id);
        tracing::debug!(path = %path.display(), label = %label, id, "training sample");
    }

    Ok(set)
}

/// Image files under `dir`, in sorted walk order.
pub fn collect_image_paths(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| {
            entry.ok().and_then(|entry| {
                let path = entry.path();
                let is_image = path
                    .extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
                (path.is_file() && is_image).then(|| path.to_path_buf())
            })
        })
        .collect()
}

/// Person label for a dataset image: its parent folder name.
pub fn label_for(path: &Path) -> Option<String> {
    path.parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
}
