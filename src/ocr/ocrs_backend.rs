//! OCRS backend: pure-Rust text recognition, no external binaries.
//!
//! The detection and recognition models are fetched into the data
//! directory the first time a region is read.

use std::path::Path;
use std::sync::OnceLock;
use std::time::Instant;

use image::{DynamicImage, GrayImage};

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
use super::model_utils::{ModelFile, ModelStore};

const MODEL_BASE: &str = "https://ocrs-models.s3-accelerate.amazonaws.com";

const DETECTION: ModelFile = ModelFile {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten",
    filename: "text-detection.rten",
    approx_size: "2.5 MB",
};

const RECOGNITION: ModelFile = ModelFile {
    url: "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten",
    filename: "text-recognition.rten",
    approx_size: "10 MB",
};

const MODELS: ModelStore = ModelStore {
    name: "ocrs",
    files: &[DETECTION, RECOGNITION],
};

/// Shared by every backend instance; the engine only needs `&self`.
static ENGINE: OnceLock<ocrs::OcrEngine> = OnceLock::new();

/// OCRS backend (pure Rust).
pub struct OcrsBackend {
    config: OcrConfig,
}

impl OcrsBackend {
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self { config }
    }

    fn engine(&self) -> Result<&'static ocrs::OcrEngine, OcrError> {
        if let Some(engine) = ENGINE.get() {
            return Ok(engine);
        }

        let dir = MODELS.fetch(self.config.model_path.as_deref())?;
        let engine = ocrs::OcrEngine::new(ocrs::OcrEngineParams {
            detection_model: Some(load_model(&dir, &DETECTION)?),
            recognition_model: Some(load_model(&dir, &RECOGNITION)?),
            ..Default::default()
        })
        .map_err(|e| OcrError::OcrFailed(format!("engine init: {}", e)))?;

        // A concurrent first call may have set it already; either is fine
        let _ = ENGINE.set(engine);
        ENGINE
            .get()
            .ok_or_else(|| OcrError::OcrFailed("engine not initialized".to_string()))
    }
}

fn load_model(dir: &Path, file: &ModelFile) -> Result<rten::Model, OcrError> {
    rten::Model::load_file(dir.join(file.filename))
        .map_err(|e| OcrError::ModelNotFound(format!("{}: {}", file.filename, e)))
}

impl Default for OcrsBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for OcrsBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Ocrs
    }

    fn is_available(&self) -> bool {
        // Models download on demand
        true
    }

    fn availability_hint(&self) -> String {
        match MODELS.locate(self.config.model_path.as_deref()) {
            Some(dir) => format!("OCRS models in {}", dir.display()),
            None => format!(
                "OCRS models (~12 MB) will be downloaded from {} to {}",
                MODEL_BASE,
                MODELS.default_dir().display()
            ),
        }
    }

    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();
        let engine = self.engine()?;

        let rgb = DynamicImage::ImageLuma8(image.clone()).to_rgb8();
        let source = ocrs::ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| OcrError::ImageError(e.to_string()))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| OcrError::OcrFailed(format!("prepare input: {}", e)))?;
        let text = engine
            .get_text(&input)
            .map_err(|e| OcrError::OcrFailed(format!("recognition: {}", e)))?;

        Ok(OcrResult {
            text,
            confidence: None,
            backend: OcrBackendType::Ocrs,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }
}
