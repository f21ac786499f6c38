use crate::config::Config;
use clap::ValueEnum;
use facerec_core::{
    Classifier, DetectorError, FaceEmbedder, FaceResult, FeatureDatabase, LabelMap, LbphRecognizer,
    Recognition, RecognizerError, SsdDetector, ThresholdMatcher, VoteMatcher,
};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Identity matching policy selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Policy {
    /// Plurality vote over enrolled embeddings.
    Embedding,
    /// LBPH classifier with a distance threshold.
    Lbph,
}

/// Loaded recognition state for one policy.
pub enum Backend {
    Embedding {
        extractor: FaceEmbedder,
        database: FeatureDatabase,
        matcher: VoteMatcher,
    },
    Lbph {
        classifier: Option<LbphRecognizer>,
        labels: LabelMap,
        matcher: ThresholdMatcher,
    },
}

/// Detector plus recognition backend, constructed once per process.
pub struct Engine {
    detector: SsdDetector,
    backend: Backend,
}

impl Engine {
    /// Load the detector and the chosen backend. A missing detector or
    /// embedding model is fatal; a missing database or LBPH model is not.
    pub fn load(config: &Config, policy: Policy) -> Result<Self, EngineError> {
        let detector_path = config.detector_model_path();
        let detector = SsdDetector::load(&detector_path, config.min_confidence)?;
        tracing::info!(path = %detector_path, "SSD detector loaded");

        let backend = match policy {
            Policy::Embedding => {
                let embedding_path = config.embedding_model_path();
                let extractor = FaceEmbedder::load(&embedding_path)?;
                tracing::info!(path = %embedding_path, "embedding model loaded");
                Backend::Embedding {
                    extractor,
                    database: FeatureDatabase::load_or_empty(&config.encodings_path),
                    matcher: VoteMatcher::new(config.tolerance),
                }
            }
            Policy::Lbph => Backend::Lbph {
                classifier: load_classifier(&config.lbph_model_path),
                labels: load_labels(&config.label_map_path),
                matcher: ThresholdMatcher::new(config.lbph_threshold),
            },
        };

        Ok(Self { detector, backend })
    }

    /// Detect and identify every face in `image`.
    pub fn process(&mut self, image: &RgbImage) -> Result<Vec<FaceResult>, DetectorError> {
        let mut recognition = match &mut self.backend {
            Backend::Embedding {
                extractor,
                database,
                matcher,
            } => Recognition::Embedding {
                extractor,
                database,
                matcher: *matcher,
            },
            Backend::Lbph {
                classifier,
                labels,
                matcher,
            } => Recognition::Lbph {
                classifier: classifier.as_ref().map(|c| c as &dyn Classifier),
                labels,
                matcher: *matcher,
            },
        };
        facerec_core::process_frame(image, &mut self.detector, &mut recognition)
    }
}

fn load_classifier(path: &Path) -> Option<LbphRecognizer> {
    match LbphRecognizer::load(path) {
        Ok(model) => Some(model),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "no usable LBPH model; every face will be reported as Unknown"
            );
            None
        }
    }
}

fn load_labels(path: &Path) -> LabelMap {
    match LabelMap::load(path) {
        Ok(labels) => labels,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "no label map; predictions resolve to Unknown"
            );
            LabelMap::new()
        }
    }
}

/// One log line per face, in detector order.
pub fn log_results(frame: u64, results: &[FaceResult]) {
    for (index, face) in results.iter().enumerate() {
        tracing::info!(
            frame,
            face = index,
            identity = %face.result.identity,
            score = face.result.score,
            confidence = face.bbox.confidence,
            "face"
        );
    }
}

/// Human-readable summary such as `Ann (0.31), Unknown (0.72)`.
pub fn summarize(results: &[FaceResult]) -> String {
    if results.is_empty() {
        return "no faces".to_string();
    }
    results
        .iter()
        .map(|face| format!("{} ({:.2})", face.result.identity, face.result.score))
        .collect::<Vec<_>>()
        .join(", ")
}
