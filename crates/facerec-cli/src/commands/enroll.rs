//! `facerec enroll`: capture embeddings of one person from the camera.

use super::{open_camera, validate_name, CameraFrames};
use crate::config::Config;
use crate::session::run_until_interrupted;
use anyhow::{Context, Result};
use facerec_core::{Detector, Extractor, FaceEmbedder, FeatureDatabase, SsdDetector};
use facerec_hw::Frame;
use std::time::Duration;

pub async fn run(config: Config, name: &str, samples: usize, interval: Duration) -> Result<()> {
    let name = validate_name(name)?.to_string();

    let mut detector = SsdDetector::load(&config.detector_model_path(), config.min_confidence)?;
    let mut extractor = FaceEmbedder::load(&config.embedding_model_path())?;
    let mut database = FeatureDatabase::load_or_empty(&config.encodings_path);
    let encodings_path = config.encodings_path.clone();

    let (database, added) = run_until_interrupted(move |stop| {
        let camera = open_camera(&config)?;
        let mut stream = camera.stream()?;
        stream.discard(config.warmup_frames);

        let frames = CameraFrames::new(&mut stream, &stop, config.mirror);
        let added = capture_samples(
            frames,
            &mut detector,
            &mut extractor,
            &mut database,
            &name,
            samples,
            interval,
        );
        Ok((database, added))
    })
    .await?;

    if added == 0 {
        println!("No samples captured; database left unchanged");
        return Ok(());
    }

    database
        .save(&encodings_path)
        .context("failed to save feature database")?;
    println!(
        "Enrolled {added} sample(s); {} now holds {} record(s)",
        encodings_path.display(),
        database.len()
    );
    Ok(())
}

/// Append up to `samples` embeddings of the best face in each frame.
///
/// Frames without a usable face, or where detection or embedding fails, are
/// skipped. Returns the number of records appended, which is short of
/// `samples` when the frames run out first.
pub fn capture_samples<D, E>(
    frames: impl Iterator<Item = Frame>,
    detector: &mut D,
    extractor: &mut E,
    database: &mut FeatureDatabase,
    name: &str,
    samples: usize,
    interval: Duration,
) -> usize
where
    D: Detector + ?Sized,
    E: Extractor + ?Sized,
{
    let mut added = 0usize;
    if samples == 0 {
        return added;
    }

    for frame in frames {
        let face = match detector.best_face(&frame.image) {
            Ok(Some(face)) => face,
            Ok(None) => {
                tracing::debug!(sequence = frame.sequence, "no face in frame");
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    sequence = frame.sequence,
                    error = %e,
                    "detection failed; skipping frame"
                );
                continue;
            }
        };
        let Some(region) = face.clamp(frame.width(), frame.height()) else {
            tracing::debug!(?face, "face outside frame");
            continue;
        };
        let embedding = match extractor.embed(&frame.image, &region) {
            Ok(embedding) => embedding,
            Err(e) => {
                tracing::warn!(error = %e, "embedding failed; skipping frame");
                continue;
            }
        };

        database.append(name, embedding.values);
        added += 1;
        tracing::info!(
            name,
            sample = added,
            of = samples,
            confidence = face.confidence,
            "sample captured"
        );
        if added >= samples {
            break;
        }
        std::thread::sleep(interval);
    }

    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{frame, FlakyDetector};
    use facerec_core::{Embedding, RecognizerError, Region};
    use image::RgbImage;

    /// Embeds a region as the mean red value of its top-left pixel.
    struct PixelExtractor;

    impl Extractor for PixelExtractor {
        fn embed(
            &mut self,
            image: &RgbImage,
            region: &Region,
        ) -> Result<Embedding, RecognizerError> {
            let pixel = image.get_pixel(region.x, region.y);
            Ok(Embedding::new(vec![pixel[0] as f32 / 255.0]))
        }
    }

    #[test]
    fn test_detector_failure_skips_only_that_frame() {
        let mut detector = FlakyDetector {
            calls: 0,
            failing: vec![1],
        };
        let mut database = FeatureDatabase::new();
        let frames = (0..4).map(frame);

        let added = capture_samples(
            frames,
            &mut detector,
            &mut PixelExtractor,
            &mut database,
            "Ann",
            3,
            Duration::ZERO,
        );

        assert_eq!(added, 3);
        assert_eq!(database.label_counts(), vec![("Ann", 3)]);
        assert_eq!(detector.calls, 4);
    }

    #[test]
    fn test_samples_kept_when_frames_run_out() {
        let mut detector = FlakyDetector {
            calls: 0,
            failing: vec![0, 2],
        };
        let mut database = FeatureDatabase::new();
        database.append("Bob", vec![0.0]);

        let added = capture_samples(
            (0..4).map(frame),
            &mut detector,
            &mut PixelExtractor,
            &mut database,
            "Ann",
            10,
            Duration::ZERO,
        );

        assert_eq!(added, 2);
        assert_eq!(database.len(), 3);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("encodings.json");
        database.save(&path).unwrap();
        let reloaded = FeatureDatabase::load(&path).unwrap();
        assert_eq!(reloaded.label_counts(), vec![("Bob", 1), ("Ann", 2)]);
    }

    #[test]
    fn test_stops_at_requested_samples() {
        let mut detector = FlakyDetector {
            calls: 0,
            failing: vec![],
        };
        let mut database = FeatureDatabase::new();
        let added = capture_samples(
            (0..10).map(frame),
            &mut detector,
            &mut PixelExtractor,
            &mut database,
            "Ann",
            2,
            Duration::ZERO,
        );
        assert_eq!(added, 2);
        assert_eq!(detector.calls, 2);
    }
}
