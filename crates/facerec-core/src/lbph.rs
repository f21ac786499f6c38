//! Local Binary Patterns Histogram (LBPH) face classifier.
//!
//! Each grayscale face crop is turned into a circular LBP code image, split
//! into a grid of cells, and summarised as one normalised 256-bin histogram
//! per cell. Prediction returns the training sample with the smallest
//! chi-square distance to the probe. Distances are dissimilarities: lower is
//! a better match, and typical same-person values sit well under 100.

use crate::store::{self, StoreError};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const LBPH_RADIUS: u32 = 1;
const LBPH_NEIGHBORS: u32 = 8;
const LBPH_GRID_X: u32 = 8;
const LBPH_GRID_Y: u32 = 8;
const LBPH_BINS: usize = 256;
/// Bilinear weights do not sum to exactly 1 in f32.
const LBPH_EQUAL_TOLERANCE: f32 = 1e-3;

#[derive(Error, Debug)]
pub enum LbphError {
    #[error("LBPH model not found: {0} (run `facerec train` first)")]
    ModelNotFound(String),
    #[error("no training samples")]
    EmptyTrainingSet,
    #[error("{samples} training samples but {labels} labels")]
    LabelMismatch { samples: usize, labels: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// Nearest training label and its distance for one probe crop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: i32,
    pub distance: f32,
}

/// Label classifier over grayscale face crops.
pub trait Classifier {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, LbphError>;
}

/// Trained LBPH model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LbphRecognizer {
    radius: u32,
    neighbors: u32,
    grid_x: u32,
    grid_y: u32,
    histograms: Vec<Vec<f32>>,
    labels: Vec<i32>,
}

impl LbphRecognizer {
    /// Train on `faces` with one integer label per face.
    pub fn train(faces: &[GrayImage], labels: &[i32]) -> Result<Self, LbphError> {
        if faces.is_empty() {
            return Err(LbphError::EmptyTrainingSet);
        }
        if faces.len() != labels.len() {
            return Err(LbphError::LabelMismatch {
                samples: faces.len(),
                labels: labels.len(),
            });
        }

        let mut model = Self {
            radius: LBPH_RADIUS,
            neighbors: LBPH_NEIGHBORS,
            grid_x: LBPH_GRID_X,
            grid_y: LBPH_GRID_Y,
            histograms: Vec::with_capacity(faces.len()),
            labels: labels.to_vec(),
        };

        for face in faces {
            let histogram = model.histogram(face)?;
            model.histograms.push(histogram);
        }

        tracing::info!(samples = model.len(), "trained LBPH model");
        Ok(model)
    }

    /// Load a model previously written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self, LbphError> {
        let model: LbphRecognizer = store::read_json(path).map_err(|e| match e {
            StoreError::NotFound(p) => LbphError::ModelNotFound(p),
            other => LbphError::Store(other),
        })?;

        if let Err(reason) = model.check_layout() {
            return Err(LbphError::Store(StoreError::CorruptData {
                path: path.display().to_string(),
                reason,
            }));
        }

        tracing::info!(path = %path.display(), samples = model.len(), "loaded LBPH model");
        Ok(model)
    }

    pub fn save(&self, path: &Path) -> Result<(), LbphError> {
        store::write_json_atomic(path, self)?;
        tracing::info!(path = %path.display(), samples = self.len(), "saved LBPH model");
        Ok(())
    }

    /// Number of training samples.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Reject parameters and histograms that `predict` cannot work with.
    fn check_layout(&self) -> Result<(), String> {
        if self.neighbors != LBPH_NEIGHBORS {
            return Err(format!("{} neighbors, expected {LBPH_NEIGHBORS}", self.neighbors));
        }
        if self.radius == 0 || self.grid_x == 0 || self.grid_y == 0 {
            return Err(format!(
                "radius {} and grid {}x{} must all be at least 1",
                self.radius, self.grid_x, self.grid_y
            ));
        }
        if self.histograms.is_empty() || self.histograms.len() != self.labels.len() {
            return Err(format!(
                "{} histograms for {} labels",
                self.histograms.len(),
                self.labels.len()
            ));
        }
        let expected = (self.grid_x as usize) * (self.grid_y as usize) * LBPH_BINS;
        if let Some(bad) = self.histograms.iter().position(|h| h.len() != expected) {
            return Err(format!(
                "histogram {bad} has {} bins, expected {expected}",
                self.histograms[bad].len()
            ));
        }
        Ok(())
    }

    /// Smallest crop side that leaves at least one LBP code per grid cell.
    fn min_crop_side(&self) -> u32 {
        2 * self.radius + self.grid_x.max(self.grid_y)
    }

    /// Concatenated per-cell histograms of the LBP code image.
    fn histogram(&self, face: &GrayImage) -> Result<Vec<f32>, LbphError> {
        let (width, height) = face.dimensions();
        let min_side = self.min_crop_side();
        if width < min_side || height < min_side {
            return Err(LbphError::InvalidInput(format!(
                "face crop {width}x{height} is smaller than {min_side}x{min_side}"
            )));
        }

        let (codes, code_w, code_h) = lbp_codes(face, self.radius, self.neighbors);
        Ok(spatial_histogram(&codes, code_w, code_h, self.grid_x, self.grid_y))
    }
}

impl Classifier for LbphRecognizer {
    fn predict(&self, face: &GrayImage) -> Result<Prediction, LbphError> {
        if self.histograms.is_empty() {
            return Err(LbphError::EmptyTrainingSet);
        }
        let probe = self.histogram(face)?;

        let mut best = Prediction {
            label: -1,
            distance: f32::MAX,
        };
        for (histogram, &label) in self.histograms.iter().zip(self.labels.iter()) {
            let distance = chi_square(histogram, &probe);
            if distance < best.distance {
                best = Prediction { label, distance };
            }
        }
        Ok(best)
    }
}

/// Circular LBP with bilinear sampling of the neighbours.
///
/// Returns the code image and its dimensions, which are the input
/// dimensions minus `2 * radius`.
fn lbp_codes(face: &GrayImage, radius: u32, neighbors: u32) -> (Vec<u8>, usize, usize) {
    let width = face.width() as usize;
    let height = face.height() as usize;
    let r = radius as usize;
    let code_w = width - 2 * r;
    let code_h = height - 2 * r;
    let src = face.as_raw();
    let mut codes = vec![0u8; code_w * code_h];

    for n in 0..neighbors {
        let angle = 2.0 * std::f32::consts::PI * n as f32 / neighbors as f32;
        let sx = radius as f32 * angle.cos();
        let sy = -(radius as f32) * angle.sin();

        let fx = sx.floor() as isize;
        let fy = sy.floor() as isize;
        let cx = sx.ceil() as isize;
        let cy = sy.ceil() as isize;
        let tx = sx - fx as f32;
        let ty = sy - fy as f32;

        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        let at = |x: usize, y: usize, dx: isize, dy: isize| -> f32 {
            let px = (x as isize + dx) as usize;
            let py = (y as isize + dy) as usize;
            src[py * width + px] as f32
        };

        for y in r..height - r {
            for x in r..width - r {
                let center = src[y * width + x] as f32;
                let sample = w1 * at(x, y, fx, fy)
                    + w2 * at(x, y, cx, fy)
                    + w3 * at(x, y, fx, cy)
                    + w4 * at(x, y, cx, cy);

                if sample > center || (sample - center).abs() < LBPH_EQUAL_TOLERANCE {
                    codes[(y - r) * code_w + (x - r)] |= 1 << n;
                }
            }
        }
    }

    (codes, code_w, code_h)
}

/// Per-cell histograms, each normalised to sum to 1, concatenated row-major.
fn spatial_histogram(
    codes: &[u8],
    width: usize,
    height: usize,
    grid_x: u32,
    grid_y: u32,
) -> Vec<f32> {
    let gx = grid_x as usize;
    let gy = grid_y as usize;
    let cell_w = width / gx;
    let cell_h = height / gy;
    let cell_pixels = (cell_w * cell_h) as f32;

    let mut result = vec![0.0f32; gx * gy * LBPH_BINS];

    for row in 0..gy {
        for col in 0..gx {
            let offset = (row * gx + col) * LBPH_BINS;
            let hist = &mut result[offset..offset + LBPH_BINS];
            for y in row * cell_h..(row + 1) * cell_h {
                for x in col * cell_w..(col + 1) * cell_w {
                    hist[codes[y * width + x] as usize] += 1.0;
                }
            }
            for bin in hist.iter_mut() {
                *bin /= cell_pixels;
            }
        }
    }

    result
}

/// Symmetric chi-square distance: `Σ 2(a-b)² / (a+b)`.
fn chi_square(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let sum = x + y;
            if sum > f32::EPSILON {
                2.0 * (x - y).powi(2) / sum
            } else {
                0.0
            }
        })
        .sum()
}
