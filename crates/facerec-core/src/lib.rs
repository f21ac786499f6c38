//! facerec-core: face detection, recognition and identity matching.
//!
//! Detection runs a res10 SSD network and embeddings come from an ONNX face
//! model, both via ONNX Runtime. Identities are decided either by a plurality
//! vote over enrolled embeddings or by an LBPH classifier with a distance
//! threshold.

pub mod detector;
pub mod lbph;
pub mod matcher;
pub mod overlay;
pub mod pipeline;
pub mod recognizer;
pub mod store;
pub mod types;

pub use detector::{Detector, DetectorError, SsdDetector};
pub use lbph::{Classifier, LbphError, LbphRecognizer, Prediction};
pub use matcher::{Matcher, ThresholdMatcher, VoteMatcher};
pub use pipeline::{process_frame, FaceResult, Recognition};
pub use recognizer::{Extractor, FaceEmbedder, RecognizerError};
pub use store::{FeatureDatabase, LabelMap, StoreError};
pub use types::{BoundingBox, Embedding, Identity, MatchResult, Region};
