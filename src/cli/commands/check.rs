//! OCR tool availability check.

use console::style;

use formscrape::config::Config;
use formscrape::ocr::{OcrBackend, TesseractBackend};

/// Check OCR backend availability.
pub fn cmd_check(config: &Config) -> anyhow::Result<()> {
    println!("\n{}", style("OCR Backend Status").bold());
    println!("{}", "-".repeat(50));

    let tesseract = TesseractBackend::with_config(config.ocr.clone());
    let tesseract_status = if tesseract.is_available() {
        style("✓ available").green()
    } else {
        style("✗ not available").red()
    };
    println!("  {:<15} {}", "Tesseract", tesseract_status);
    if !tesseract.is_available() {
        println!(
            "                  {}",
            style(tesseract.availability_hint()).dim()
        );
    }

    // OCRS (models auto-download on first use)
    #[cfg(feature = "ocr-ocrs")]
    {
        use formscrape::ocr::OcrsBackend;
        let ocrs = OcrsBackend::with_config(config.ocr.clone());
        println!("  {:<15} {}", "OCRS", style("✓ available").green());
        println!("                  {}", style(ocrs.availability_hint()).dim());
    }
    #[cfg(not(feature = "ocr-ocrs"))]
    {
        println!(
            "  {:<15} {}",
            "OCRS",
            style("not compiled (enable ocr-ocrs feature)").dim()
        );
    }

    println!("\n{}", style("Selected Backend:").cyan());
    println!("  {} (language: {})", config.ocr.backend, config.ocr.language);

    Ok(())
}
