//! Template file loading.
//!
//! Templates are declarative files so a new form revision never needs a
//! rebuild. TOML, JSON and YAML are accepted, picked by file extension.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{FieldKind, Rect, Region, RegionCatalog, TemplateError};

/// Built-in template for page 1 of IRS Form 990.
const F990_TEMPLATE: &str = include_str!("../../templates/f990.toml");

/// Supported template file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFormat {
    Toml,
    Json,
    Yaml,
}

impl TemplateFormat {
    /// Pick a format from a file extension.
    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "toml" => Ok(TemplateFormat::Toml),
            "json" => Ok(TemplateFormat::Json),
            "yaml" | "yml" => Ok(TemplateFormat::Yaml),
            _ => Err(TemplateError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// On-disk shape of a template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateFile {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub fields: Vec<FieldSpec>,
}

/// One field entry in a template file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub id: String,
    /// `[x1, y1, x2, y2]` in page pixels.
    pub rect: Rect,
    /// Inferred from the id when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldKind>,
}

impl TemplateFile {
    pub fn parse(content: &str, format: TemplateFormat) -> Result<Self, TemplateError> {
        match format {
            TemplateFormat::Toml => {
                toml::from_str(content).map_err(|e| TemplateError::Parse(e.to_string()))
            }
            TemplateFormat::Json => {
                serde_json::from_str(content).map_err(|e| TemplateError::Parse(e.to_string()))
            }
            TemplateFormat::Yaml => {
                serde_yaml::from_str(content).map_err(|e| TemplateError::Parse(e.to_string()))
            }
        }
    }

    /// Validate into a catalog.
    pub fn into_catalog(self) -> Result<RegionCatalog, TemplateError> {
        let regions = self
            .fields
            .into_iter()
            .map(|field| {
                let kind = field.kind.unwrap_or_else(|| FieldKind::infer(&field.id));
                Region::new(field.id, field.rect, kind)
            })
            .collect();

        let catalog = RegionCatalog::new(self.name, regions)?;
        Ok(match self.revision {
            Some(revision) => catalog.with_revision(revision),
            None => catalog,
        })
    }
}

impl RegionCatalog {
    /// Load and validate a template file.
    pub fn from_path(path: &Path) -> Result<Self, TemplateError> {
        let format = TemplateFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        let catalog = TemplateFile::parse(&content, format)?.into_catalog()?;

        tracing::debug!(
            "Loaded template {} ({} fields) from {}",
            catalog.name(),
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Parse and validate a template from a string.
    pub fn from_str_with_format(content: &str, format: TemplateFormat) -> Result<Self, TemplateError> {
        TemplateFile::parse(content, format)?.into_catalog()
    }
}

/// The built-in IRS Form 990 page 1 catalog.
pub fn builtin_f990() -> Result<RegionCatalog, TemplateError> {
    RegionCatalog::from_str_with_format(F990_TEMPLATE, TemplateFormat::Toml)
}
