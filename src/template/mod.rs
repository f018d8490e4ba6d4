//! Form templates: the fixed map of named fields to page regions.
//!
//! A template is pure data. Each [`Region`] names one field, its rectangle
//! in page-pixel space and whether it holds text or a checkbox. A
//! [`RegionCatalog`] is only valid for one print layout at one scan DPI, so
//! templates carry a revision alongside their name.

mod loader;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use loader::{builtin_f990, TemplateFile, TemplateFormat};

/// Errors from building or loading a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Duplicate field id: {0}")]
    DuplicateField(String),

    #[error("Degenerate rectangle for field {field}: {rect}")]
    DegenerateRect { field: String, rect: Rect },

    #[error("Template {0} has no fields")]
    Empty(String),

    #[error("Unsupported template format: {0}")]
    UnsupportedFormat(String),

    #[error("Template parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rectangle in page pixels. Right and bottom edges are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct Rect {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Rect {
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_degenerate(&self) -> bool {
        self.x1 >= self.x2 || self.y1 >= self.y2
    }

    /// Whether the rectangle lies entirely within a page of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x2 <= width && self.y2 <= height
    }
}

impl From<[u32; 4]> for Rect {
    fn from([x1, y1, x2, y2]: [u32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<Rect> for [u32; 4] {
    fn from(rect: Rect) -> Self {
        [rect.x1, rect.y1, rect.x2, rect.y2]
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// What a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Free text read by the OCR backend.
    Text,
    /// A printed box classified by ink coverage.
    Checkbox,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
        }
    }

    /// Infer the kind from a field id: ids mentioning "checkbox" are checkboxes.
    pub fn infer(id: &str) -> Self {
        if id.contains("checkbox") {
            FieldKind::Checkbox
        } else {
            FieldKind::Text
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One named field on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub id: String,
    pub rect: Rect,
    pub kind: FieldKind,
}

impl Region {
    pub fn new(id: impl Into<String>, rect: Rect, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            rect,
            kind,
        }
    }

    pub fn text(id: impl Into<String>, rect: Rect) -> Self {
        Self::new(id, rect, FieldKind::Text)
    }

    pub fn checkbox(id: impl Into<String>, rect: Rect) -> Self {
        Self::new(id, rect, FieldKind::Checkbox)
    }
}

/// Ordered, validated set of regions for one form template.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    name: String,
    revision: Option<String>,
    regions: Vec<Region>,
}

impl RegionCatalog {
    /// Build a catalog, rejecting duplicate ids and degenerate rectangles.
    pub fn new(name: impl Into<String>, regions: Vec<Region>) -> Result<Self, TemplateError> {
        let name = name.into();
        if regions.is_empty() {
            return Err(TemplateError::Empty(name));
        }

        let mut seen = HashSet::with_capacity(regions.len());
        for region in &regions {
            if !seen.insert(region.id.as_str()) {
                return Err(TemplateError::DuplicateField(region.id.clone()));
            }
            if region.rect.is_degenerate() {
                return Err(TemplateError::DegenerateRect {
                    field: region.id.clone(),
                    rect: region.rect,
                });
            }
        }

        Ok(Self {
            name,
            revision: None,
            regions,
        })
    }

    /// Attach the print-layout revision this catalog was measured against.
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Smallest page size that contains every region.
    pub fn required_page_size(&self) -> (u32, u32) {
        self.regions.iter().fold((0, 0), |(w, h), r| {
            (w.max(r.rect.x2), h.max(r.rect.y2))
        })
    }
}

impl<'a> IntoIterator for &'a RegionCatalog {
    type Item = &'a Region;
    type IntoIter = std::slice::Iter<'a, Region>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions.iter()
    }
}
