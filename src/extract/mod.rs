//! Field extraction: drives a template over one page.
//!
//! Each region is enhanced, then either classified as a checkbox or read by
//! the OCR backend and normalized. Fields are independent, so a failure in
//! one is recorded in place and the rest of the page is still read. Only
//! configuration problems abort a run.

pub mod checkbox;
pub mod normalize;
mod record;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::imaging::{
    EnhancedRegion, ImagingError, PageImage, PageLoader, PreprocessConfig, RegionEnhancer,
    MAX_UPSCALE_FACTOR,
};
use crate::ocr::{OcrBackend, OcrError};
use crate::template::{FieldKind, Region, RegionCatalog, TemplateError};

pub use checkbox::{CheckboxClassifier, CheckboxConfig, DEFAULT_INK_FRACTION};
pub use normalize::normalize;
pub use record::{FailureKind, FieldFailure, FieldValue, FormRecord, RecordBuilder};

/// Errors that abort an extraction run.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Imaging error: {0}")]
    Imaging(#[from] ImagingError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Fields processed concurrently by `extract_parallel`.
    pub workers: usize,
    /// Per-field OCR deadline in seconds (0 = none).
    pub field_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            field_timeout_secs: 60,
        }
    }
}

impl ExtractConfig {
    pub fn field_timeout(&self) -> Option<Duration> {
        (self.field_timeout_secs > 0).then(|| Duration::from_secs(self.field_timeout_secs))
    }
}

/// Progress events emitted by `extract_parallel`.
#[derive(Debug, Clone)]
pub enum ExtractEvent {
    /// A field was handed to a worker.
    FieldStarted { field: String },
    /// A field produced a value.
    FieldCompleted { field: String, value: FieldValue },
    /// A field was recorded as unreadable.
    FieldFailed { field: String, error: String },
    /// Run finished (possibly cancelled).
    RunComplete {
        fields: usize,
        failed: usize,
        cancelled: bool,
    },
}

/// Options for one parallel run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub workers: usize,
    pub field_timeout: Option<Duration>,
    /// Set to stop launching new fields.
    pub cancel: Option<Arc<AtomicBool>>,
    pub events: Option<mpsc::Sender<ExtractEvent>>,
}

impl RunOptions {
    pub fn from_config(config: &ExtractConfig) -> Self {
        Self {
            workers: config.workers,
            field_timeout: config.field_timeout(),
            ..Default::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    async fn emit(&self, event: ExtractEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// Extracts a [`FormRecord`] from a page using a region catalog.
#[derive(Clone)]
pub struct FormExtractor {
    enhancer: RegionEnhancer,
    classifier: CheckboxClassifier,
    ocr: Arc<dyn OcrBackend>,
}

impl FormExtractor {
    /// Create an extractor, validating the tuning parameters.
    pub fn new(
        preprocess: PreprocessConfig,
        checkbox: CheckboxConfig,
        ocr: Arc<dyn OcrBackend>,
    ) -> Result<Self, ExtractError> {
        if !(1..=MAX_UPSCALE_FACTOR).contains(&preprocess.upscale_factor) {
            return Err(ExtractError::Configuration(format!(
                "upscale factor {} is outside 1 - {}",
                preprocess.upscale_factor, MAX_UPSCALE_FACTOR
            )));
        }
        if !(0.0..=1.0).contains(&checkbox.ink_fraction) {
            return Err(ExtractError::Configuration(format!(
                "checkbox ink fraction {} is outside 0.0 - 1.0",
                checkbox.ink_fraction
            )));
        }

        Ok(Self {
            enhancer: RegionEnhancer::new(preprocess),
            classifier: CheckboxClassifier::new(checkbox),
            ocr,
        })
    }

    /// Extractor with default tuning.
    pub fn with_backend(ocr: Arc<dyn OcrBackend>) -> Self {
        Self {
            enhancer: RegionEnhancer::default(),
            classifier: CheckboxClassifier::default(),
            ocr,
        }
    }

    pub fn backend(&self) -> &dyn OcrBackend {
        self.ocr.as_ref()
    }

    /// Run the OCR backend on an enhanced region, returning its raw text.
    pub fn extract_text(&self, region: &EnhancedRegion) -> Result<String, OcrError> {
        Ok(self.ocr.recognize(&region.image)?.text)
    }

    /// Extract one field.
    ///
    /// Out-of-bounds regions and OCR failures come back as
    /// [`FieldValue::Unreadable`]; only configuration errors are `Err`.
    pub fn extract_field(
        &self,
        page: &PageImage,
        region: &Region,
    ) -> Result<FieldValue, ExtractError> {
        let enhanced = match self.enhancer.enhance(page, region) {
            Ok(enhanced) => enhanced,
            Err(e @ ImagingError::RegionOutOfBounds { .. }) => {
                tracing::warn!("Skipping field {}: {}", region.id, e);
                return Ok(FieldValue::unreadable(FailureKind::OutOfBounds, e.to_string()));
            }
            Err(e @ ImagingError::ScaleOverflow { .. }) => {
                return Err(ExtractError::Configuration(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        match region.kind {
            FieldKind::Checkbox => Ok(FieldValue::Checked(self.classifier.is_checked(&enhanced)?)),
            FieldKind::Text => match self.extract_text(&enhanced) {
                Ok(raw) => Ok(FieldValue::Text(normalize(&raw))),
                Err(e @ OcrError::Timeout(_)) => {
                    tracing::warn!("OCR timed out for field {}: {}", region.id, e);
                    Ok(FieldValue::unreadable(FailureKind::Timeout, e.to_string()))
                }
                Err(e) => {
                    tracing::warn!("OCR failed for field {}: {}", region.id, e);
                    Ok(FieldValue::unreadable(FailureKind::Ocr, e.to_string()))
                }
            },
        }
    }

    /// Extract every field of `catalog`, one at a time, in catalog order.
    pub fn extract(
        &self,
        page: &PageImage,
        catalog: &RegionCatalog,
    ) -> Result<FormRecord, ExtractError> {
        let mut builder = RecordBuilder::new(catalog);
        for region in catalog {
            let value = self.extract_field(page, region)?;
            tracing::debug!("{} = {}", region.id, value);
            builder.set(&region.id, value);
        }

        let record = builder.finish();
        log_summary(&record);
        Ok(record)
    }

    /// Decode a page with `loader` and extract it.
    pub fn extract_file(
        &self,
        loader: &dyn PageLoader,
        path: &std::path::Path,
        catalog: &RegionCatalog,
    ) -> Result<FormRecord, ExtractError> {
        let page = loader.load(path)?;
        self.extract(&page, catalog)
    }

    /// Extract every field on a bounded pool of blocking workers.
    ///
    /// Workers hand back `(field, value)` pairs and only this task writes
    /// the record. Fields not launched before cancellation stay pending.
    pub async fn extract_parallel(
        &self,
        page: Arc<PageImage>,
        catalog: Arc<RegionCatalog>,
        options: &RunOptions,
    ) -> Result<FormRecord, ExtractError> {
        let workers = options.workers.max(1);
        let mut builder = RecordBuilder::new(&catalog);
        let mut handles: Vec<FieldHandle> = Vec::with_capacity(workers);
        let mut cancelled = false;
        let mut failed = 0;

        for index in 0..catalog.len() {
            if options.is_cancelled() {
                tracing::info!("Extraction cancelled, {} fields not started", catalog.len() - index);
                cancelled = true;
                break;
            }

            let field = catalog.regions()[index].id.clone();
            options
                .emit(ExtractEvent::FieldStarted {
                    field: field.clone(),
                })
                .await;

            let extractor = self.clone();
            let page = page.clone();
            let catalog = catalog.clone();
            let deadline = options.field_timeout.map(|t| Instant::now() + t);
            let handle = tokio::task::spawn_blocking(move || {
                extractor.extract_field(&page, &catalog.regions()[index])
            });
            handles.push((field, deadline, handle));

            if handles.len() >= workers {
                failed += drain_batch(&mut handles, &mut builder, options).await?;
            }
        }

        failed += drain_batch(&mut handles, &mut builder, options).await?;

        let record = builder.finish();
        options
            .emit(ExtractEvent::RunComplete {
                fields: record.len(),
                failed,
                cancelled,
            })
            .await;
        log_summary(&record);
        Ok(record)
    }
}

type FieldHandle = (String, Option<Instant>, JoinHandle<Result<FieldValue, ExtractError>>);

/// Collect every launched field, returning how many failed.
///
/// On a run-level error the rest of the batch is still awaited, so no
/// worker outlives the run unobserved, and the first error is returned.
async fn drain_batch(
    handles: &mut Vec<FieldHandle>,
    builder: &mut RecordBuilder,
    options: &RunOptions,
) -> Result<usize, ExtractError> {
    let mut failed = 0;
    let mut first_error = None;

    for (field, deadline, handle) in handles.drain(..) {
        let outcome = await_field(&field, deadline, handle).await;
        if first_error.is_some() {
            continue;
        }
        match outcome {
            Ok(value) => failed += record_value(builder, options, field, value).await,
            Err(e) => first_error = Some(e),
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(failed),
    }
}

/// Wait for one worker, turning timeouts and panics into unreadable values.
async fn await_field(
    field: &str,
    deadline: Option<Instant>,
    handle: JoinHandle<Result<FieldValue, ExtractError>>,
) -> Result<FieldValue, ExtractError> {
    let joined = match deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!("Field {} timed out", field);
                return Ok(FieldValue::unreadable(
                    FailureKind::Timeout,
                    "OCR did not finish before the field deadline",
                ));
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!("Worker for field {} failed: {}", field, e);
            Ok(FieldValue::unreadable(FailureKind::Worker, e.to_string()))
        }
    }
}

/// Store a value and emit its event. Returns 1 if the field failed.
async fn record_value(
    builder: &mut RecordBuilder,
    options: &RunOptions,
    field: String,
    value: FieldValue,
) -> usize {
    let event = match value.failure() {
        Some(failure) => ExtractEvent::FieldFailed {
            field: field.clone(),
            error: failure.message.clone(),
        },
        None => ExtractEvent::FieldCompleted {
            field: field.clone(),
            value: value.clone(),
        },
    };
    let failed = usize::from(value.failure().is_some());

    builder.set(&field, value);
    options.emit(event).await;
    failed
}

fn log_summary(record: &FormRecord) {
    if record.is_template_mismatch() {
        tracing::warn!(
            "No field of template {} fits the page; wrong template or page size?",
            record.template()
        );
    } else {
        tracing::info!(
            "Extracted {} fields from template {} ({} unreadable)",
            record.len(),
            record.template(),
            record.failure_count()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::{BLACK, WHITE};
    use crate::ocr::{OcrBackendType, OcrResult};
    use crate::template::Rect;
    use image::{DynamicImage, GrayImage, Luma};

    /// Returns "" for blank regions and a fixed string otherwise.
    struct InkOcr;

    impl OcrBackend for InkOcr {
        fn backend_type(&self) -> OcrBackendType {
            OcrBackendType::Tesseract
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
            let inked = image.pixels().any(|p| p.0[0] == BLACK);
            Ok(OcrResult {
                text: if inked { "4 2\n0".to_string() } else { String::new() },
                confidence: None,
                backend: OcrBackendType::Tesseract,
                processing_time_ms: 0,
            })
        }
    }

    struct BrokenOcr;

    impl OcrBackend for BrokenOcr {
        fn backend_type(&self) -> OcrBackendType {
            OcrBackendType::Tesseract
        }

        fn is_available(&self) -> bool {
            false
        }

        fn availability_hint(&self) -> String {
            "broken".to_string()
        }

        fn recognize(&self, _image: &GrayImage) -> Result<OcrResult, OcrError> {
            Err(OcrError::BackendNotAvailable("tesseract not found".to_string()))
        }
    }

    /// Sleeps far past any field deadline before answering.
    struct StalledOcr;

    impl OcrBackend for StalledOcr {
        fn backend_type(&self) -> OcrBackendType {
            OcrBackendType::Tesseract
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        fn recognize(&self, _image: &GrayImage) -> Result<OcrResult, OcrError> {
            std::thread::sleep(Duration::from_secs(1));
            Ok(OcrResult {
                text: "late".to_string(),
                confidence: None,
                backend: OcrBackendType::Tesseract,
                processing_time_ms: 1000,
            })
        }
    }

    struct PanickingOcr;

    impl OcrBackend for PanickingOcr {
        fn backend_type(&self) -> OcrBackendType {
            OcrBackendType::Tesseract
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        fn recognize(&self, _image: &GrayImage) -> Result<OcrResult, OcrError> {
            panic!("engine crashed");
        }
    }

    fn catalog() -> RegionCatalog {
        RegionCatalog::new(
            "sample",
            vec![
                Region::text("name", Rect::new(10, 10, 50, 30)),
                Region::checkbox("opt_in", Rect::new(5, 5, 15, 15)),
            ],
        )
        .unwrap()
    }

    fn page(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([WHITE]))
    }

    fn fill(image: &mut GrayImage, rect: Rect) {
        for y in rect.y1..rect.y2 {
            for x in rect.x1..rect.x2 {
                image.put_pixel(x, y, Luma([BLACK]));
            }
        }
    }

    #[test]
    fn test_text_field_is_normalized() {
        let mut image = page(60, 40);
        fill(&mut image, Rect::new(20, 15, 30, 25));
        let page = PageImage::new(DynamicImage::ImageLuma8(image));

        let extractor = FormExtractor::with_backend(Arc::new(InkOcr));
        let value = extractor
            .extract_field(&page, &Region::text("n", Rect::new(10, 10, 50, 30)))
            .unwrap();
        assert_eq!(value, FieldValue::Text("42 0".to_string()));
    }

    #[test]
    fn test_ocr_failure_is_isolated() {
        let page = PageImage::new(DynamicImage::ImageLuma8(page(60, 40)));
        let extractor = FormExtractor::with_backend(Arc::new(BrokenOcr));

        let record = extractor.extract(&page, &catalog()).unwrap();
        assert_eq!(record.get("name").unwrap().failure().unwrap().kind, FailureKind::Ocr);
        assert_eq!(record.get("opt_in"), Some(&FieldValue::Checked(false)));
    }

    #[test]
    fn test_invalid_tuning_rejected() {
        let zero_scale = FormExtractor::new(
            PreprocessConfig {
                upscale_factor: 0,
                ..Default::default()
            },
            CheckboxConfig::default(),
            Arc::new(InkOcr),
        );
        assert!(matches!(zero_scale, Err(ExtractError::Configuration(_))));

        let bad_fraction = FormExtractor::new(
            PreprocessConfig::default(),
            CheckboxConfig { ink_fraction: 1.5 },
            Arc::new(InkOcr),
        );
        assert!(matches!(bad_fraction, Err(ExtractError::Configuration(_))));

        let huge_scale = FormExtractor::new(
            PreprocessConfig {
                upscale_factor: u32::MAX / 4,
                ..Default::default()
            },
            CheckboxConfig::default(),
            Arc::new(InkOcr),
        );
        assert!(matches!(huge_scale, Err(ExtractError::Configuration(_))));
    }

    #[test]
    fn test_engine_timeout_is_recorded_as_timeout() {
        struct TimedOutOcr;

        impl OcrBackend for TimedOutOcr {
            fn backend_type(&self) -> OcrBackendType {
                OcrBackendType::Tesseract
            }

            fn is_available(&self) -> bool {
                true
            }

            fn availability_hint(&self) -> String {
                String::new()
            }

            fn recognize(&self, _image: &GrayImage) -> Result<OcrResult, OcrError> {
                Err(OcrError::Timeout(Duration::from_secs(60)))
            }
        }

        let page = PageImage::new(DynamicImage::ImageLuma8(page(60, 40)));
        let extractor = FormExtractor::with_backend(Arc::new(TimedOutOcr));
        let value = extractor
            .extract_field(&page, &Region::text("n", Rect::new(10, 10, 50, 30)))
            .unwrap();
        assert_eq!(value.failure().unwrap().kind, FailureKind::Timeout);
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential() {
        let mut image = page(60, 40);
        fill(&mut image, Rect::new(5, 5, 15, 15));
        let page = Arc::new(PageImage::new(DynamicImage::ImageLuma8(image)));
        let catalog = Arc::new(catalog());
        let extractor = FormExtractor::with_backend(Arc::new(InkOcr));

        let sequential = extractor.extract(&page, &catalog).unwrap();
        let options = RunOptions {
            workers: 2,
            field_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        };
        let parallel = extractor
            .extract_parallel(page, catalog, &options)
            .await
            .unwrap();
        assert_eq!(parallel, sequential);
        assert!(parallel.is_complete());
    }

    #[tokio::test]
    async fn test_stalled_field_times_out() {
        let page = Arc::new(PageImage::new(DynamicImage::ImageLuma8(page(60, 40))));
        let extractor = FormExtractor::with_backend(Arc::new(StalledOcr));
        let options = RunOptions {
            workers: 1,
            field_timeout: Some(Duration::from_millis(100)),
            ..Default::default()
        };

        let start = std::time::Instant::now();
        let record = extractor
            .extract_parallel(page, Arc::new(catalog()), &options)
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_millis(900));

        let failure = record.get("name").unwrap().failure().unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(record.get("opt_in"), Some(&FieldValue::Checked(false)));
    }

    #[tokio::test]
    async fn test_worker_panic_is_isolated() {
        let page = Arc::new(PageImage::new(DynamicImage::ImageLuma8(page(60, 40))));
        let extractor = FormExtractor::with_backend(Arc::new(PanickingOcr));
        let (tx, mut rx) = mpsc::channel(16);
        let options = RunOptions {
            workers: 2,
            events: Some(tx),
            ..Default::default()
        };

        let record = extractor
            .extract_parallel(page, Arc::new(catalog()), &options)
            .await
            .unwrap();
        drop(options);

        assert_eq!(record.get("name").unwrap().failure().unwrap().kind, FailureKind::Worker);
        assert_eq!(record.get("opt_in"), Some(&FieldValue::Checked(false)));

        let mut failed_fields = Vec::new();
        let mut summary = None;
        while let Some(event) = rx.recv().await {
            match event {
                ExtractEvent::FieldFailed { field, .. } => failed_fields.push(field),
                ExtractEvent::RunComplete { fields, failed, cancelled } => {
                    summary = Some((fields, failed, cancelled))
                }
                ExtractEvent::FieldStarted { .. } | ExtractEvent::FieldCompleted { .. } => {}
            }
        }
        assert_eq!(failed_fields, vec!["name".to_string()]);
        assert_eq!(summary, Some((2, 1, false)));
    }

    #[tokio::test]
    async fn test_run_error_still_awaits_batch() {
        let finished = Arc::new(AtomicBool::new(false));
        let slow = {
            let finished = finished.clone();
            tokio::task::spawn_blocking(move || {
                std::thread::sleep(Duration::from_millis(50));
                finished.store(true, Ordering::SeqCst);
                Ok::<_, ExtractError>(FieldValue::Checked(true))
            })
        };
        let broken = tokio::task::spawn_blocking(|| {
            Err::<FieldValue, _>(ExtractError::Configuration("bad tuning".to_string()))
        });

        let mut handles: Vec<FieldHandle> = vec![
            ("name".to_string(), None, broken),
            ("opt_in".to_string(), None, slow),
        ];
        let mut builder = RecordBuilder::new(&catalog());

        let result = drain_batch(&mut handles, &mut builder, &RunOptions::default()).await;
        assert!(matches!(result, Err(ExtractError::Configuration(_))));
        assert!(handles.is_empty());
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_fields_pending() {
        let page = Arc::new(PageImage::new(DynamicImage::ImageLuma8(page(60, 40))));
        let extractor = FormExtractor::with_backend(Arc::new(InkOcr));
        let options = RunOptions {
            workers: 1,
            cancel: Some(Arc::new(AtomicBool::new(true))),
            ..Default::default()
        };

        let record = extractor
            .extract_parallel(page, Arc::new(catalog()), &options)
            .await
            .unwrap();
        assert_eq!(record.len(), 2);
        assert!(!record.is_complete());
        assert!(record.iter().all(|(_, value)| value.is_pending()));
    }

    #[tokio::test]
    async fn test_events_emitted() {
        let page = Arc::new(PageImage::new(DynamicImage::ImageLuma8(page(60, 40))));
        let extractor = FormExtractor::with_backend(Arc::new(InkOcr));
        let (tx, mut rx) = mpsc::channel(16);
        let options = RunOptions {
            workers: 4,
            events: Some(tx),
            ..Default::default()
        };

        extractor
            .extract_parallel(page, Arc::new(catalog()), &options)
            .await
            .unwrap();
        drop(options);

        let mut started = 0;
        let mut completed = 0;
        let mut finished = false;
        while let Some(event) = rx.recv().await {
            match event {
                ExtractEvent::FieldStarted { .. } => started += 1,
                ExtractEvent::FieldCompleted { .. } => completed += 1,
                ExtractEvent::FieldFailed { .. } => {}
                ExtractEvent::RunComplete { fields, failed, cancelled } => {
                    assert_eq!((fields, failed, cancelled), (2, 0, false));
                    finished = true;
                }
            }
        }
        assert_eq!((started, completed), (2, 2));
        assert!(finished);
    }
}
