//! formscrape - region-based field extraction for fixed-layout scanned forms.
//!
//! A form template maps each field to a rectangle on the page. Every
//! region is cropped, upscaled and binarized, then read either as a
//! checkbox (ink coverage) or as text (OCR plus cleanup rules). The result
//! is a [`FormRecord`] with exactly one entry per template field.

pub mod config;
pub mod extract;
pub mod imaging;
pub mod ocr;
pub mod template;

pub use config::{Config, ConfigError, LoadOptions};
pub use extract::{
    ExtractError, ExtractEvent, FieldValue, FormExtractor, FormRecord, RunOptions,
};
pub use imaging::{ImageFileLoader, PageImage, PageLoader};
pub use ocr::{OcrBackend, OcrBackendType, OcrError};
pub use template::{FieldKind, Rect, Region, RegionCatalog, TemplateError};
