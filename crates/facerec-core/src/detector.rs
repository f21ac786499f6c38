//! SSD face detector via ONNX Runtime.
//!
//! Runs the ResNet-10 300×300 single-shot detector (`res10_300x300_ssd`)
//! exported to ONNX. The network takes a mean-subtracted BGR blob and emits
//! one `[image_id, class, confidence, x1, y1, x2, y2]` row per candidate, with
//! coordinates normalised to the input frame.

use crate::types::BoundingBox;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const SSD_INPUT_SIZE: u32 = 300;
/// Per-channel means in B, G, R order.
const SSD_MEAN_BGR: [f32; 3] = [104.0, 177.0, 123.0];
const SSD_ROW_LEN: usize = 7;

/// Minimum detector confidence for a candidate to count as a face.
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (export res10_300x300_ssd to ONNX and place it in models/)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Face detector handle.
pub trait Detector {
    /// Detect faces in an RGB frame, highest confidence first.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;

    /// The single most confident face, if any.
    fn best_face(&mut self, image: &RgbImage) -> Result<Option<BoundingBox>, DetectorError> {
        Ok(self.detect(image)?.into_iter().next())
    }
}

/// SSD-based face detector.
pub struct SsdDetector {
    session: Session,
    min_confidence: f32,
}

impl SsdDetector {
    /// Load the SSD ONNX model from the given path.
    pub fn load(model_path: &str, min_confidence: f32) -> Result<Self, DetectorError> {
        if !Path::new(model_path).exists() {
            return Err(DetectorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            min_confidence,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded SSD face detector"
        );

        Ok(Self {
            session,
            min_confidence,
        })
    }

    /// Resize to 300×300 and build a mean-subtracted BGR NCHW tensor.
    fn preprocess(image: &RgbImage) -> Array4<f32> {
        let size = SSD_INPUT_SIZE as usize;
        let resized =
            image::imageops::resize(image, SSD_INPUT_SIZE, SSD_INPUT_SIZE, FilterType::Triangle);
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let (x, y) = (x as usize, y as usize);
            tensor[[0, 0, y, x]] = b as f32 - SSD_MEAN_BGR[0];
            tensor[[0, 1, y, x]] = g as f32 - SSD_MEAN_BGR[1];
            tensor[[0, 2, y, x]] = r as f32 - SSD_MEAN_BGR[2];
        }

        tensor
    }
}

impl Detector for SsdDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let input = Self::preprocess(image);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("detections: {e}")))?;

        let faces = decode_detections(raw, image.width(), image.height(), self.min_confidence);
        tracing::trace!(count = faces.len(), "SSD detections");
        Ok(faces)
    }
}

/// Decode raw SSD output rows into pixel boxes.
///
/// Keeps rows with confidence strictly above `min_confidence`, scales the
/// normalised corners to the frame, truncates to integer pixels, and sorts by
/// confidence, highest first. A trailing partial row is ignored.
pub fn decode_detections(
    raw: &[f32],
    width: u32,
    height: u32,
    min_confidence: f32,
) -> Vec<BoundingBox> {
    let (w, h) = (width as f32, height as f32);

    let mut faces: Vec<BoundingBox> = raw
        .chunks_exact(SSD_ROW_LEN)
        .filter(|row| row[2] > min_confidence)
        .map(|row| {
            let start_x = (row[3] * w) as i32;
            let start_y = (row[4] * h) as i32;
            let end_x = (row[5] * w) as i32;
            let end_y = (row[6] * h) as i32;
            BoundingBox {
                x: start_x,
                y: start_y,
                width: end_x - start_x,
                height: end_y - start_y,
                confidence: row[2],
            }
        })
        .collect();

    faces.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    faces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(conf: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> [f32; 7] {
        [0.0, 1.0, conf, x1, y1, x2, y2]
    }

    #[test]
    fn test_decode_scales_to_frame() {
        let raw = row(0.9, 0.25, 0.5, 0.75, 1.0);
        let faces = decode_detections(&raw, 640, 480, 0.5);
        assert_eq!(faces.len(), 1);
        assert_eq!(
            faces[0],
            BoundingBox {
                x: 160,
                y: 240,
                width: 320,
                height: 240,
                confidence: 0.9,
            }
        );
    }

    #[test]
    fn test_decode_filters_low_confidence() {
        let mut raw = Vec::new();
        raw.extend(row(0.5, 0.1, 0.1, 0.2, 0.2)); // exactly at minimum: dropped
        raw.extend(row(0.3, 0.1, 0.1, 0.2, 0.2));
        raw.extend(row(0.51, 0.1, 0.1, 0.2, 0.2));
        let faces = decode_detections(&raw, 100, 100, 0.5);
        assert_eq!(faces.len(), 1);
        assert!((faces[0].confidence - 0.51).abs() < 1e-6);
    }

    #[test]
    fn test_decode_sorted_by_confidence() {
        let mut raw = Vec::new();
        raw.extend(row(0.6, 0.0, 0.0, 0.1, 0.1));
        raw.extend(row(0.95, 0.5, 0.5, 0.6, 0.6));
        raw.extend(row(0.8, 0.2, 0.2, 0.3, 0.3));
        let faces = decode_detections(&raw, 100, 100, 0.5);
        let confidences: Vec<f32> = faces.iter().map(|f| f.confidence).collect();
        assert_eq!(confidences, vec![0.95, 0.8, 0.6]);
    }

    #[test]
    fn test_decode_keeps_out_of_frame_coordinates() {
        let raw = row(0.9, -0.1, -0.2, 0.5, 1.2);
        let faces = decode_detections(&raw, 100, 100, 0.5);
        assert_eq!(faces[0].x, -10);
        assert_eq!(faces[0].y, -20);
        assert_eq!(faces[0].width, 60);
        assert_eq!(faces[0].height, 140);
    }

    #[test]
    fn test_decode_ignores_partial_row() {
        let mut raw = row(0.9, 0.1, 0.1, 0.2, 0.2).to_vec();
        raw.extend([0.0, 1.0, 0.99]);
        assert_eq!(decode_detections(&raw, 100, 100, 0.5).len(), 1);
    }

    #[test]
    fn test_decode_empty() {
        assert!(decode_detections(&[], 640, 480, 0.5).is_empty());
    }

    #[test]
    fn test_preprocess_shape_and_mean() {
        let image = RgbImage::from_pixel(64, 48, image::Rgb([123, 177, 104]));
        let tensor = SsdDetector::preprocess(&image);
        assert_eq!(tensor.shape(), &[1, 3, 300, 300]);
        // Pixel equal to the channel means normalises to zero in every channel.
        for c in 0..3 {
            assert!(tensor[[0, c, 150, 150]].abs() < 1e-4, "channel {c}");
        }
    }

    #[test]
    fn test_preprocess_channel_order_is_bgr() {
        let image = RgbImage::from_pixel(10, 10, image::Rgb([255, 0, 0]));
        let tensor = SsdDetector::preprocess(&image);
        assert!((tensor[[0, 0, 0, 0]] - (0.0 - 104.0)).abs() < 1e-4);
        assert!((tensor[[0, 2, 0, 0]] - (255.0 - 123.0)).abs() < 1e-4);
    }
}
