use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Score reported for a region that clamps to zero area.
pub const INVALID_REGION_SCORE: f32 = 999.0;

/// Bounding box for a detected face, in frame pixels.
///
/// Coordinates come straight from the detector and may lie partly or wholly
/// outside the frame; use [`clamp`](Self::clamp) before cropping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub confidence: f32,
}

impl BoundingBox {
    /// Clamp the box to a `frame_width` × `frame_height` frame.
    ///
    /// Returns `None` when the clamped region has zero area.
    pub fn clamp(&self, frame_width: u32, frame_height: u32) -> Option<Region> {
        let x1 = i64::from(self.x).max(0);
        let y1 = i64::from(self.y).max(0);
        let x2 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(frame_width));
        let y2 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(frame_height));

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(Region {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        })
    }
}

/// A face region clamped to frame bounds. Always has positive area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// Copy this region out of `image`.
    pub fn crop(&self, image: &RgbImage) -> RgbImage {
        image::imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }
}

/// Face embedding vector produced by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    /// Euclidean distance to a stored feature vector.
    pub fn euclidean_distance(&self, other: &[f32]) -> f32 {
        euclidean_distance(&self.values, other)
    }
}

/// Euclidean distance between two vectors.
///
/// Vectors of different dimension never match: the distance is infinite.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::INFINITY;
    }
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Identity assigned to a single detected face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
    /// Region clamped to zero area; the classifier was not consulted.
    InvalidRegion,
    /// The classifier or extractor failed on this region.
    Failed,
}

impl Identity {
    pub fn as_str(&self) -> &str {
        match self {
            Identity::Known(label) => label,
            Identity::Unknown => "Unknown",
            Identity::InvalidRegion => "Error_ROI",
            Identity::Failed => "Error",
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of matching one face region.
///
/// `score` is a distance: lower means a closer match. It is not a probability.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub identity: Identity,
    pub score: f32,
}

impl MatchResult {
    pub fn known(label: impl Into<String>, score: f32) -> Self {
        Self {
            identity: Identity::Known(label.into()),
            score,
        }
    }

    pub fn unknown(score: f32) -> Self {
        Self {
            identity: Identity::Unknown,
            score,
        }
    }

    pub fn invalid_region() -> Self {
        Self {
            identity: Identity::InvalidRegion,
            score: INVALID_REGION_SCORE,
        }
    }

    pub fn failed() -> Self {
        Self {
            identity: Identity::Failed,
            score: 0.0,
        }
    }
}
