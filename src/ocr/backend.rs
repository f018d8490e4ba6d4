//! OCR backend abstraction.
//!
//! Extraction only needs "region image in, best-guess text out". Engines
//! plug in behind [`OcrBackend`]:
//! - Tesseract: traditional OCR via command-line (CPU)
//! - Ocrs: pure Rust OCR engine (CPU, feature `ocr-ocrs`)

use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("Unknown OCR backend: {0}")]
    UnknownBackend(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("OCR timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Result of OCR on one region.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// Recognized text, exactly as the engine produced it.
    pub text: String,
    /// Confidence score (0.0 - 1.0), if available.
    pub confidence: Option<f32>,
    /// Which backend produced this result.
    pub backend: OcrBackendType,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrBackendType {
    /// Tesseract OCR via command-line.
    #[default]
    Tesseract,
    /// Pure Rust OCR engine (ocrs crate).
    Ocrs,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::Tesseract => "tesseract",
            OcrBackendType::Ocrs => "ocrs",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tesseract" => Some(OcrBackendType::Tesseract),
            "ocrs" => Some(OcrBackendType::Ocrs),
            _ => None,
        }
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Check if this backend is available (dependencies installed, models present).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Recognize text in a single enhanced region.
    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError>;
}

/// Configuration for OCR backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Which engine to use.
    pub backend: OcrBackendType,
    /// Language for OCR (e.g., "eng", "deu").
    pub language: String,
    /// Tesseract page segmentation mode (`--psm`); engine default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_segmentation: Option<u8>,
    /// Path to model files (for backends that need them).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<std::path::PathBuf>,
    /// Kill an engine process still running after this long. Filled from
    /// the extraction field timeout, not read from config files.
    #[serde(skip)]
    pub timeout: Option<std::time::Duration>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendType::default(),
            language: "eng".to_string(),
            page_segmentation: None,
            model_path: None,
            timeout: None,
        }
    }
}

/// Build the backend selected by `config`.
pub fn create_backend(config: &OcrConfig) -> Result<Arc<dyn OcrBackend>, OcrError> {
    match config.backend {
        OcrBackendType::Tesseract => Ok(Arc::new(super::TesseractBackend::with_config(
            config.clone(),
        ))),
        #[cfg(feature = "ocr-ocrs")]
        OcrBackendType::Ocrs => Ok(Arc::new(super::OcrsBackend::with_config(config.clone()))),
        #[cfg(not(feature = "ocr-ocrs"))]
        OcrBackendType::Ocrs => Err(OcrError::BackendNotAvailable(
            "ocrs not compiled (enable the ocr-ocrs feature)".to_string(),
        )),
    }
}
