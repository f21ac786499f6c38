pub mod collect;
pub mod enroll;
pub mod recognize;
pub mod train;

use crate::config::Config;
use crate::session::StopFlag;
use anyhow::{Context, Result};
use facerec_hw::{Camera, Frame, FrameStream};

/// Open the configured camera, failing with the device path in the message.
pub fn open_camera(config: &Config) -> Result<Camera> {
    let camera = Camera::open(&config.camera_device)
        .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );
    Ok(camera)
}

/// Live frames from a capture stream, oriented the same way for every
/// command. Ends on a stop request or the first capture error.
pub struct CameraFrames<'s, 'c> {
    stream: &'s mut FrameStream<'c>,
    stop: &'s StopFlag,
    mirror: bool,
}

impl<'s, 'c> CameraFrames<'s, 'c> {
    pub fn new(stream: &'s mut FrameStream<'c>, stop: &'s StopFlag, mirror: bool) -> Self {
        Self {
            stream,
            stop,
            mirror,
        }
    }
}

impl Iterator for CameraFrames<'_, '_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.stop.is_stopped() {
            return None;
        }
        match self.stream.next_frame() {
            Ok(frame) => Some(oriented(frame, self.mirror)),
            Err(e) => {
                tracing::warn!(error = %e, "capture failed; ending session");
                None
            }
        }
    }
}

/// Mirror a live frame when configured.
pub fn oriented(frame: Frame, mirror: bool) -> Frame {
    if mirror {
        frame.mirrored()
    } else {
        frame
    }
}

/// Reject empty or path-like person names.
pub fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("name must not be empty");
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        anyhow::bail!("name must not contain path separators: {name:?}");
    }
    Ok(name)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("  Ann ").unwrap(), "Ann");
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name("../etc").is_err());
        assert!(validate_name("..").is_err());
    }

    #[test]
    fn test_oriented_mirrors_only_when_enabled() {
        let white = image::Rgb([255, 255, 255]);
        let black = image::Rgb([0, 0, 0]);

        let kept = oriented(test_support::frame(0), false);
        assert_eq!(kept.image.get_pixel(0, 0), &white);

        let flipped = oriented(test_support::frame(0), true);
        assert_eq!(flipped.image.get_pixel(0, 0), &black);
        assert_eq!(flipped.image.get_pixel(99, 0), &white);
    }
}
