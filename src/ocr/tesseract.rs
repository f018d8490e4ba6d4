//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction.
//! Each region is written to a temporary PNG and passed to the binary,
//! which is killed if it outlives the configured timeout.

use std::fs::File;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use image::GrayImage;
use tempfile::TempDir;

use super::backend::{OcrBackend, OcrBackendType, OcrConfig, OcrError, OcrResult};
use super::model_utils::check_binary;

/// How often a running tesseract is checked against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Tesseract OCR backend.
pub struct TesseractBackend {
    config: OcrConfig,
}

impl TesseractBackend {
    pub fn new() -> Self {
        Self::with_config(OcrConfig::default())
    }

    pub fn with_config(config: OcrConfig) -> Self {
        Self { config }
    }

    /// Run the binary on a saved region and return the text it wrote.
    ///
    /// Output goes to files rather than pipes so the child can be polled
    /// and killed at the deadline without risking a full pipe.
    fn run_tesseract(&self, image_path: &Path, out_base: &Path) -> Result<String, OcrError> {
        let log_path = out_base.with_extension("log");

        let mut command = Command::new("tesseract");
        command
            .arg(image_path)
            .arg(out_base)
            .arg("-l")
            .arg(&self.config.language)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(File::create(&log_path)?));
        if let Some(psm) = self.config.page_segmentation {
            command.arg("--psm").arg(psm.to_string());
        }

        let mut child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                OcrError::BackendNotAvailable("tesseract not found on PATH".to_string())
            }
            _ => OcrError::Io(e),
        })?;
        let status = wait_with_deadline(&mut child, self.config.timeout)?;

        if !status.success() {
            let log = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(OcrError::OcrFailed(format!(
                "tesseract exited with {}: {}",
                status,
                log.trim()
            )));
        }

        let text = std::fs::read_to_string(out_base.with_extension("txt"))?;
        Ok(strip_page_separator(&text).to_string())
    }
}

/// Wait for `child`, killing it once `timeout` has elapsed.
fn wait_with_deadline(child: &mut Child, timeout: Option<Duration>) -> Result<ExitStatus, OcrError> {
    let Some(timeout) = timeout else {
        return Ok(child.wait()?);
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            tracing::warn!("Killed tesseract (pid {}) after {:?}", child.id(), timeout);
            return Err(OcrError::Timeout(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Tesseract ends every page with a form feed, usually after a newline.
fn strip_page_separator(text: &str) -> &str {
    let text = text.strip_suffix('\u{c}').unwrap_or(text);
    text.strip_suffix('\n').unwrap_or(text)
}

impl Default for TesseractBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrBackend for TesseractBackend {
    fn backend_type(&self) -> OcrBackendType {
        OcrBackendType::Tesseract
    }

    fn is_available(&self) -> bool {
        check_binary("tesseract")
    }

    fn availability_hint(&self) -> String {
        if check_binary("tesseract") {
            format!("tesseract found (language: {})", self.config.language)
        } else {
            "tesseract not installed; install tesseract-ocr (plus the language data)".to_string()
        }
    }

    fn recognize(&self, image: &GrayImage) -> Result<OcrResult, OcrError> {
        let start = Instant::now();

        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("region.png");
        image
            .save(&image_path)
            .map_err(|e| OcrError::ImageError(format!("Failed to write region: {}", e)))?;

        let text = self.run_tesseract(&image_path, &temp_dir.path().join("region"))?;
        let elapsed = start.elapsed();

        Ok(OcrResult {
            text,
            confidence: None,
            backend: OcrBackendType::Tesseract,
            processing_time_ms: elapsed.as_millis() as u64,
        })
    }
}
