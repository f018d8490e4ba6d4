//! OCR engines for text fields.
//!
//! ## OCR Backends
//!
//! - **Tesseract**: Traditional OCR, widely available, CPU-based (default)
//! - **OCRS**: Pure Rust OCR, no external binaries (feature: ocr-ocrs)
//!
//! Backends receive one enhanced region at a time and return the engine's
//! best guess unchanged; cleanup happens in the extraction layer.

mod backend;
mod model_utils;
mod tesseract;

#[cfg(feature = "ocr-ocrs")]
mod ocrs_backend;

pub use backend::{create_backend, OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
pub use tesseract::TesseractBackend;

#[cfg(feature = "ocr-ocrs")]
pub use ocrs_backend::OcrsBackend;
