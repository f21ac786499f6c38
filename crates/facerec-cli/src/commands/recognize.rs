//! `facerec run` and `facerec image`: detect and identify faces.

use super::{open_camera, CameraFrames};
use crate::config::Config;
use crate::engine::{self, Engine, Policy};
use crate::session::run_until_interrupted;
use anyhow::{Context, Result};
use facerec_core::overlay;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Frames between FPS log lines.
const FPS_INTERVAL: u64 = 30;

/// Live camera recognition until Ctrl-C. With `snapshot`, the latest
/// annotated frame is written there on exit.
pub async fn run_camera(config: Config, policy: Policy, snapshot: Option<PathBuf>) -> Result<()> {
    let mut engine = Engine::load(&config, policy)?;

    let frames = run_until_interrupted(move |stop| {
        let camera = open_camera(&config)?;
        let mut stream = camera.stream()?;
        stream.discard(config.warmup_frames);

        let mut count = 0u64;
        let mut window_start = Instant::now();
        let mut fps = None;
        let mut last = None;

        for frame in CameraFrames::new(&mut stream, &stop, config.mirror) {
            count += 1;

            match engine.process(&frame.image) {
                Ok(results) => {
                    engine::log_results(count, &results);
                    if snapshot.is_some() {
                        let mut annotated = frame.image;
                        overlay::draw_results(&mut annotated, &results);
                        if let Some(fps) = fps {
                            overlay::draw_fps(&mut annotated, fps);
                        }
                        last = Some(annotated);
                    }
                }
                Err(e) => {
                    tracing::warn!(frame = count, error = %e, "detection failed; skipping frame")
                }
            }

            if count % FPS_INTERVAL == 0 {
                let rate = FPS_INTERVAL as f64 / window_start.elapsed().as_secs_f64();
                tracing::info!(frames = count, fps = rate, "throughput");
                fps = Some(rate);
                window_start = Instant::now();
            }
        }

        if let (Some(path), Some(image)) = (&snapshot, &last) {
            image
                .save(path)
                .with_context(|| format!("failed to write snapshot {}", path.display()))?;
            tracing::info!(path = %path.display(), "saved snapshot");
        }
        Ok(count)
    })
    .await?;

    println!("Processed {frames} frame(s)");
    Ok(())
}

/// Recognize faces in a still image and write an annotated copy.
pub fn run_image(
    config: &Config,
    policy: Policy,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let mut engine = Engine::load(config, policy)?;
    let mut image = image::open(input)
        .with_context(|| format!("failed to open image {}", input.display()))?
        .to_rgb8();

    let results = engine.process(&image)?;
    engine::log_results(0, &results);
    println!("{}", engine::summarize(&results));

    overlay::draw_results(&mut image, &results);
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| annotated_path(input));
    image
        .save(&output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Annotated image written to {}", output.display());
    Ok(())
}

/// Default output path: `photo.jpg` becomes `photo.annotated.png`.
pub fn annotated_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    input.with_file_name(format!("{stem}.annotated.png"))
}
