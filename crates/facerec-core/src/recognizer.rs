//! Face embedding extractor via ONNX Runtime.
//!
//! Crops each clamped face region, resizes it to the network input size and
//! runs an embedding model (ArcFace-style, 112×112 RGB input). Output vectors
//! are L2-normalised so Euclidean distances fall in `[0, 2]`.

use crate::types::{Embedding, Region};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const EMBEDDING_INPUT_SIZE: u32 = 112;
const EMBEDDING_MEAN: f32 = 127.5;
const EMBEDDING_STD: f32 = 127.5;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("model file not found: {0} (place a face embedding ONNX model in models/)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Embedding extractor handle.
pub trait Extractor {
    /// Embed the face inside `region` of `image`.
    fn embed(&mut self, image: &RgbImage, region: &Region) -> Result<Embedding, RecognizerError>;
}

/// ONNX face embedding model.
pub struct FaceEmbedder {
    session: Session,
}

impl FaceEmbedder {
    /// Load the embedding ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, RecognizerError> {
        if !Path::new(model_path).exists() {
            return Err(RecognizerError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded face embedding model"
        );

        Ok(Self { session })
    }

    /// Crop, resize and normalise a face into a NCHW float tensor.
    fn preprocess(image: &RgbImage, region: &Region) -> Array4<f32> {
        let size = EMBEDDING_INPUT_SIZE as usize;
        let face = region.crop(image);
        let resized = image::imageops::resize(
            &face,
            EMBEDDING_INPUT_SIZE,
            EMBEDDING_INPUT_SIZE,
            FilterType::Triangle,
        );
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for (c, &value) in pixel.0.iter().enumerate() {
                tensor[[0, c, y as usize, x as usize]] =
                    (value as f32 - EMBEDDING_MEAN) / EMBEDDING_STD;
            }
        }

        tensor
    }
}

impl Extractor for FaceEmbedder {
    fn embed(&mut self, image: &RgbImage, region: &Region) -> Result<Embedding, RecognizerError> {
        let input = Self::preprocess(image, region);

        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| RecognizerError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw_data.is_empty() {
            return Err(RecognizerError::InferenceFailed(
                "model returned an empty embedding".into(),
            ));
        }

        Ok(Embedding::new(l2_normalize(raw_data.to_vec())))
    }
}

/// Scale to unit length. A zero vector is returned unchanged.
fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(x: u32, y: u32, width: u32, height: u32) -> Region {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn test_preprocess_output_shape() {
        let image = RgbImage::from_pixel(200, 150, image::Rgb([128, 128, 128]));
        let region = window(20, 10, 60, 80);
        let tensor = FaceEmbedder::preprocess(&image, &region);
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let image = RgbImage::from_pixel(50, 50, image::Rgb([255, 0, 128]));
        let region = window(0, 0, 50, 50);
        let tensor = FaceEmbedder::preprocess(&image, &region);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 5, 5]] + 1.0).abs() < 1e-6);
        let expected = (128.0 - EMBEDDING_MEAN) / EMBEDDING_STD;
        assert!((tensor[[0, 2, 5, 5]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_uses_region_only() {
        let mut image = RgbImage::from_pixel(100, 100, image::Rgb([0, 0, 0]));
        for y in 50..100 {
            for x in 50..100 {
                image.put_pixel(x, y, image::Rgb([255, 255, 255]));
            }
        }
        let region = window(50, 50, 50, 50);
        let tensor = FaceEmbedder::preprocess(&image, &region);
        assert!(tensor.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }
}
