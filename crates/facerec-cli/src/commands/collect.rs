//! `facerec collect`: save grayscale face crops into the training dataset.

use super::{open_camera, validate_name, CameraFrames};
use crate::config::Config;
use crate::session::run_until_interrupted;
use anyhow::{Context, Result};
use facerec_core::{Detector, SsdDetector};
use facerec_hw::Frame;
use image::imageops::FilterType;
use image::GrayImage;
use std::path::{Path, PathBuf};

/// Side length of stored dataset crops.
pub const CROP_SIZE: u32 = 200;

pub async fn run(config: Config, name: &str, count: usize) -> Result<()> {
    let name = validate_name(name)?.to_string();
    let person_dir = config.dataset_dir.join(&name);
    std::fs::create_dir_all(&person_dir)
        .with_context(|| format!("failed to create {}", person_dir.display()))?;

    let mut detector = SsdDetector::load(&config.detector_model_path(), config.min_confidence)?;

    let saved = run_until_interrupted(move |stop| {
        let camera = open_camera(&config)?;
        let mut stream = camera.stream()?;
        stream.discard(config.warmup_frames);

        let frames = CameraFrames::new(&mut stream, &stop, config.mirror);
        capture_crops(frames, &mut detector, &person_dir, count)
    })
    .await?;

    println!("Saved {saved} face crop(s) for {name}");
    Ok(())
}

/// Save the best face of each frame until `count` crops are written or the
/// frames run out. Detection failures skip the frame; a write failure ends
/// the capture.
pub fn capture_crops<D: Detector + ?Sized>(
    frames: impl Iterator<Item = Frame>,
    detector: &mut D,
    person_dir: &Path,
    count: usize,
) -> Result<usize> {
    let mut saved = 0usize;
    if count == 0 {
        return Ok(saved);
    }

    for frame in frames {
        let face = match detector.best_face(&frame.image) {
            Ok(face) => face,
            Err(e) => {
                tracing::warn!(
                    sequence = frame.sequence,
                    error = %e,
                    "detection failed; skipping frame"
                );
                continue;
            }
        };
        let Some(region) = face.and_then(|face| face.clamp(frame.width(), frame.height())) else {
            continue;
        };

        let crop = image::imageops::grayscale(&region.crop(&frame.image));
        let path = next_sample_path(person_dir);
        save_crop(&crop, &path)?;
        saved += 1;
        tracing::info!(path = %path.display(), sample = saved, of = count, "saved face crop");
        if saved >= count {
            break;
        }
    }

    Ok(saved)
}

/// Resize a face crop to the dataset size and write it as PNG.
pub fn save_crop(face: &GrayImage, path: &Path) -> Result<()> {
    let resized = image::imageops::resize(face, CROP_SIZE, CROP_SIZE, FilterType::Triangle);
    resized
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// First `<n>.png` in `dir` that does not exist yet, counting from 1.
pub fn next_sample_path(dir: &Path) -> PathBuf {
    (1u32..)
        .map(|n| dir.join(format!("{n}.png")))
        .find(|path| !path.exists())
        .unwrap_or_else(|| dir.join("overflow.png"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{frame, FlakyDetector};

    #[test]
    fn test_next_sample_path_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_sample_path(dir.path()), dir.path().join("1.png"));
        std::fs::write(dir.path().join("1.png"), b"").unwrap();
        std::fs::write(dir.path().join("2.png"), b"").unwrap();
        assert_eq!(next_sample_path(dir.path()), dir.path().join("3.png"));
    }

    #[test]
    fn test_capture_crops_skips_failed_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut detector = FlakyDetector {
            calls: 0,
            failing: vec![0],
        };

        let saved = capture_crops((0..5).map(frame), &mut detector, dir.path(), 3).unwrap();

        assert_eq!(saved, 3);
        assert_eq!(detector.calls, 4);
        for n in 1..=3 {
            assert!(dir.path().join(format!("{n}.png")).exists());
        }
        assert!(!dir.path().join("4.png").exists());
    }

    #[test]
    fn test_save_crop_resizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.png");
        save_crop(&GrayImage::from_pixel(40, 60, image::Luma([90])), &path).unwrap();
        let stored = image::open(&path).unwrap().to_luma8();
        assert_eq!(stored.dimensions(), (CROP_SIZE, CROP_SIZE));
        assert_eq!(stored.get_pixel(100, 100), &image::Luma([90]));
    }
}
