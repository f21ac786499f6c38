//! Per-frame pipeline: detect, clamp, match.
//!
//! Failures are contained to the smallest unit: a detector error fails the
//! frame, while a degenerate region or a classifier/extractor error only
//! affects that face's result.

use crate::detector::{Detector, DetectorError};
use crate::lbph::Classifier;
use crate::matcher::{Matcher, ThresholdMatcher, VoteMatcher};
use crate::recognizer::Extractor;
use crate::store::{FeatureDatabase, LabelMap};
use crate::types::{BoundingBox, MatchResult, Region};
use image::RgbImage;

/// Outcome for one detected face.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceResult {
    pub bbox: BoundingBox,
    /// Clamped region, `None` when the box fell outside the frame.
    pub region: Option<Region>,
    pub result: MatchResult,
}

/// Recognition backend borrowed for one or more frames.
pub enum Recognition<'a> {
    /// Embedding extraction followed by a plurality vote over the database.
    Embedding {
        extractor: &'a mut dyn Extractor,
        database: &'a FeatureDatabase,
        matcher: VoteMatcher,
    },
    /// LBPH prediction resolved through the label map. With no trained
    /// classifier every face is reported as unknown.
    Lbph {
        classifier: Option<&'a dyn Classifier>,
        labels: &'a LabelMap,
        matcher: ThresholdMatcher,
    },
}

impl Recognition<'_> {
    /// Identify the face inside an already clamped region.
    pub fn identify(&mut self, image: &RgbImage, region: &Region) -> MatchResult {
        match self {
            Recognition::Embedding {
                extractor,
                database,
                matcher,
            } => match extractor.embed(image, region) {
                Ok(embedding) => matcher.compare(&embedding, database),
                Err(e) => {
                    tracing::warn!(error = %e, ?region, "embedding extraction failed");
                    MatchResult::failed()
                }
            },
            Recognition::Lbph {
                classifier,
                labels,
                matcher,
            } => {
                let Some(classifier) = classifier else {
                    return MatchResult::unknown(0.0);
                };
                let face = image::imageops::grayscale(&region.crop(image));
                match classifier.predict(&face) {
                    Ok(prediction) => matcher.resolve(prediction, labels),
                    Err(e) => {
                        tracing::warn!(error = %e, ?region, "LBPH prediction failed");
                        MatchResult::failed()
                    }
                }
            }
        }
    }
}

/// Run detection and recognition on one frame.
///
/// Returns one result per detected face, in detector order. No detected
/// faces is not an error.
pub fn process_frame<D: Detector + ?Sized>(
    image: &RgbImage,
    detector: &mut D,
    recognition: &mut Recognition<'_>,
) -> Result<Vec<FaceResult>, DetectorError> {
    let faces = detector.detect(image)?;
    Ok(identify_faces(image, faces, recognition))
}

/// Clamp and identify already detected faces.
pub fn identify_faces(
    image: &RgbImage,
    faces: Vec<BoundingBox>,
    recognition: &mut Recognition<'_>,
) -> Vec<FaceResult> {
    let (width, height) = image.dimensions();

    faces
        .into_iter()
        .map(|bbox| {
            let region = bbox.clamp(width, height);
            let result = match &region {
                Some(region) => recognition.identify(image, region),
                None => MatchResult::invalid_region(),
            };
            FaceResult {
                bbox,
                region,
                result,
            }
        })
        .collect()
}
