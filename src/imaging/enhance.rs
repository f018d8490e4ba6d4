//! Region enhancement for OCR.
//!
//! Small, low-DPI form fields read far better once they are upscaled and
//! pushed to pure black and white. The steps run in a fixed order:
//! crop, upscale, grayscale, binarize.

use image::imageops::FilterType;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use super::{ImagingError, PageImage};
use crate::template::Region;

/// Default integer upscale factor applied to every crop.
pub const DEFAULT_UPSCALE_FACTOR: u32 = 4;

/// Largest accepted upscale factor.
pub const MAX_UPSCALE_FACTOR: u32 = 16;

/// Default luminance cutoff: darker pixels become black, the rest white.
pub const DEFAULT_BINARIZE_THRESHOLD: u8 = 200;

pub const BLACK: u8 = 0;
pub const WHITE: u8 = 255;

/// Resampling filter used for upscaling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleFilter {
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    #[default]
    Lanczos3,
}

impl From<ResampleFilter> for FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => FilterType::Nearest,
            ResampleFilter::Triangle => FilterType::Triangle,
            ResampleFilter::CatmullRom => FilterType::CatmullRom,
            ResampleFilter::Gaussian => FilterType::Gaussian,
            ResampleFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Tuning knobs for region enhancement.
///
/// These were calibrated against one scanner; recalibrate for other
/// scan pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Integer upscale factor (1 to [`MAX_UPSCALE_FACTOR`]).
    pub upscale_factor: u32,
    /// Pixels below this luminance become black.
    pub binarize_threshold: u8,
    /// Resampling filter for the upscale.
    pub filter: ResampleFilter,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            upscale_factor: DEFAULT_UPSCALE_FACTOR,
            binarize_threshold: DEFAULT_BINARIZE_THRESHOLD,
            filter: ResampleFilter::default(),
        }
    }
}

/// A binarized, upscaled crop of one region.
#[derive(Debug, Clone)]
pub struct EnhancedRegion {
    pub image: GrayImage,
    /// Pixel count after upscaling.
    pub area: u64,
}

impl EnhancedRegion {
    pub fn new(image: GrayImage) -> Self {
        let area = u64::from(image.width()) * u64::from(image.height());
        Self { image, area }
    }

    /// Number of black pixels.
    pub fn dark_pixels(&self) -> u64 {
        self.image.pixels().filter(|p| p.0[0] == BLACK).count() as u64
    }
}

/// Produces [`EnhancedRegion`]s from a page. Stateless apart from its config.
#[derive(Debug, Clone, Default)]
pub struct RegionEnhancer {
    config: PreprocessConfig,
}

impl RegionEnhancer {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Crop, upscale, grayscale and binarize one region of the page.
    pub fn enhance(&self, page: &PageImage, region: &Region) -> Result<EnhancedRegion, ImagingError> {
        let rect = region.rect;
        let (width, height) = page.dimensions();
        if !rect.fits_within(width, height) {
            return Err(ImagingError::RegionOutOfBounds {
                field: region.id.clone(),
                rect,
                width,
                height,
            });
        }

        let crop = page
            .as_image()
            .crop_imm(rect.x1, rect.y1, rect.width(), rect.height());

        let factor = self.config.upscale_factor.max(1);
        let (Some(scaled_width), Some(scaled_height)) = (
            rect.width().checked_mul(factor),
            rect.height().checked_mul(factor),
        ) else {
            return Err(ImagingError::ScaleOverflow {
                field: region.id.clone(),
                rect,
                factor,
            });
        };
        let scaled = crop.resize_exact(scaled_width, scaled_height, self.config.filter.into());

        let mut gray = scaled.to_luma8();
        binarize(&mut gray, self.config.binarize_threshold);

        Ok(EnhancedRegion::new(gray))
    }
}

/// Force every pixel to black or white around `threshold`.
pub fn binarize(image: &mut GrayImage, threshold: u8) {
    for pixel in image.pixels_mut() {
        pixel.0[0] = if pixel.0[0] < threshold { BLACK } else { WHITE };
    }
}
