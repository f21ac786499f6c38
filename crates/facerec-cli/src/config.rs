use anyhow::{Context, Result};
use facerec_core::detector::DEFAULT_MIN_CONFIDENCE;
use facerec_core::matcher::{DEFAULT_LBPH_THRESHOLD, DEFAULT_TOLERANCE};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "facerec.toml";

/// CLI configuration: TOML file, then `FACEREC_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// V4L2 device path or index (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// SSD detector model file name inside `model_dir`.
    pub detector_model: String,
    /// Embedding model file name inside `model_dir`.
    pub embedding_model: String,
    /// Enrolled embeddings.
    pub encodings_path: PathBuf,
    /// Trained LBPH model.
    pub lbph_model_path: PathBuf,
    /// LBPH label id → name map.
    pub label_map_path: PathBuf,
    /// One folder of face images per person.
    pub dataset_dir: PathBuf,
    /// Detections at or below this confidence are dropped.
    pub min_confidence: f32,
    /// Maximum embedding distance for a vote.
    pub tolerance: f32,
    /// LBPH distances below this are accepted.
    pub lbph_threshold: f32,
    /// Frames to discard after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// Flip live frames horizontally.
    pub mirror: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: PathBuf::from("models"),
            detector_model: "res10_300x300_ssd.onnx".to_string(),
            embedding_model: "face_embedding.onnx".to_string(),
            encodings_path: PathBuf::from("data/encodings.json"),
            lbph_model_path: PathBuf::from("data/lbph_model.json"),
            label_map_path: PathBuf::from("data/labels.json"),
            dataset_dir: PathBuf::from("dataset"),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            tolerance: DEFAULT_TOLERANCE,
            lbph_threshold: DEFAULT_LBPH_THRESHOLD,
            warmup_frames: 4,
            mirror: true,
        }
    }
}

impl Config {
    /// Load from `path` (which must exist) or from `facerec.toml` if present,
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACEREC_*` variables. Unparsable values are
    /// ignored with a warning.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACEREC_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACEREC_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEREC_ENCODINGS_PATH") {
            self.encodings_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEREC_LBPH_MODEL_PATH") {
            self.lbph_model_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEREC_LABEL_MAP_PATH") {
            self.label_map_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACEREC_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(v);
        }
        env_parse(&lookup, "FACEREC_MIN_CONFIDENCE", &mut self.min_confidence);
        env_parse(&lookup, "FACEREC_TOLERANCE", &mut self.tolerance);
        env_parse(&lookup, "FACEREC_LBPH_THRESHOLD", &mut self.lbph_threshold);
        env_parse(&lookup, "FACEREC_WARMUP_FRAMES", &mut self.warmup_frames);
        if let Some(v) = lookup("FACEREC_MIRROR") {
            self.mirror = v != "0";
        }
    }

    /// Path to the SSD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join(&self.detector_model)
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the embedding model.
    pub fn embedding_model_path(&self) -> String {
        self.model_dir
            .join(&self.embedding_model)
            .to_string_lossy()
            .into_owned()
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    field: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(value) => *field = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.tolerance, 0.6);
        assert_eq!(config.lbph_threshold, 140.0);
        assert_eq!(config.min_confidence, 0.5);
        assert!(config.mirror);
        assert_eq!(config.detector_model_path(), "models/res10_300x300_ssd.onnx");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("tolerance = 0.45\nmodel_dir = \"/opt/models\"\n").unwrap();
        assert_eq!(config.tolerance, 0.45);
        assert_eq!(config.embedding_model_path(), "/opt/models/face_embedding.onnx");
        assert_eq!(config.lbph_threshold, 140.0);
    }

    #[test]
    fn test_unknown_toml_key_rejected() {
        assert!(Config::from_toml("tolerence = 0.4\n").is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let text = "lbph_threshold = 90.0\ncamera_device = \"/dev/video1\"\n";
        let mut config = Config::from_toml(text).unwrap();
        config.apply_env_from(lookup(&[
            ("FACEREC_LBPH_THRESHOLD", "75"),
            ("FACEREC_CAMERA_DEVICE", "2"),
            ("FACEREC_MIRROR", "0"),
            ("FACEREC_WARMUP_FRAMES", "8"),
        ]));
        assert_eq!(config.lbph_threshold, 75.0);
        assert_eq!(config.camera_device, "2");
        assert!(!config.mirror);
        assert_eq!(config.warmup_frames, 8);
    }

    #[test]
    fn test_unparsable_env_ignored() {
        let mut config = Config::default();
        config.apply_env_from(lookup(&[("FACEREC_TOLERANCE", "loose")]));
        assert_eq!(config.tolerance, 0.6);
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "warmup_frames = 0\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.warmup_frames, 0);
        assert!(Config::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
