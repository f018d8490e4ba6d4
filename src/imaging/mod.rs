//! Page decoding and per-region image enhancement.
//!
//! Decoding sits behind [`PageLoader`] so alternate image backends can be
//! plugged in. Enhancement (crop, upscale, grayscale, binarize) lives in
//! [`enhance`].

mod enhance;

use std::path::Path;

use image::DynamicImage;
use thiserror::Error;

use crate::template::Rect;

pub use enhance::{
    binarize, EnhancedRegion, PreprocessConfig, RegionEnhancer, ResampleFilter, BLACK,
    DEFAULT_BINARIZE_THRESHOLD, DEFAULT_UPSCALE_FACTOR, MAX_UPSCALE_FACTOR, WHITE,
};

/// Errors from decoding pages or preparing regions.
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Region {field} {rect} is outside the {width}x{height} page")]
    RegionOutOfBounds {
        field: String,
        rect: Rect,
        width: u32,
        height: u32,
    },

    #[error("Upscaling region {field} {rect} by {factor} overflows the image size")]
    ScaleOverflow { field: String, rect: Rect, factor: u32 },

    #[error("Image decode error: {0}")]
    Decode(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded scan of a form page. Read-only once loaded.
#[derive(Debug, Clone)]
pub struct PageImage {
    image: DynamicImage,
}

impl PageImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn as_image(&self) -> &DynamicImage {
        &self.image
    }
}

impl From<DynamicImage> for PageImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

/// Capability for turning a file path into a decoded page.
pub trait PageLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<PageImage, ImagingError>;
}

/// Loads pages with the `image` crate (format sniffed from content).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFileLoader;

impl PageLoader for ImageFileLoader {
    fn load(&self, path: &Path) -> Result<PageImage, ImagingError> {
        let image = image::ImageReader::open(path)?
            .with_guessed_format()?
            .decode()?;
        tracing::debug!(
            "Decoded {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(PageImage::new(image))
    }
}
