//! Ink-coverage checkbox classifier.
//!
//! A printed box is mostly white when empty. A check or X leaves enough
//! ink to clear a fixed fraction of the box; stray specks and scan noise
//! stay below it.

use serde::{Deserialize, Serialize};

use super::ExtractError;
use crate::imaging::EnhancedRegion;

/// Default dark-pixel fraction at which a box counts as checked.
pub const DEFAULT_INK_FRACTION: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckboxConfig {
    /// Inclusive dark-pixel fraction (0.0 - 1.0) for "checked".
    pub ink_fraction: f64,
}

impl Default for CheckboxConfig {
    fn default() -> Self {
        Self {
            ink_fraction: DEFAULT_INK_FRACTION,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckboxClassifier {
    config: CheckboxConfig,
}

impl CheckboxClassifier {
    pub fn new(config: CheckboxConfig) -> Self {
        Self { config }
    }

    pub fn ink_fraction(&self) -> f64 {
        self.config.ink_fraction
    }

    /// Checked iff dark pixels cover at least the ink fraction of `area`.
    pub fn is_checked(&self, region: &EnhancedRegion) -> Result<bool, ExtractError> {
        if region.area == 0 {
            return Err(ExtractError::Configuration(
                "checkbox region has zero area".to_string(),
            ));
        }

        let coverage = region.dark_pixels() as f64 / region.area as f64;
        Ok(coverage >= self.config.ink_fraction)
    }
}
