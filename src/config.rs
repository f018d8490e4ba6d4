//! Configuration management for formscrape.
//!
//! Settings come from `formscrape.{toml,json,yaml,yml}` (an explicit path
//! wins over the working directory), then environment overrides. Every
//! numeric constant of the pipeline is a calibration parameter and lives
//! here rather than in code.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::extract::{CheckboxConfig, ExtractConfig, ExtractError, FormExtractor};
use crate::imaging::PreprocessConfig;
use crate::ocr::{create_backend, OcrBackendType, OcrConfig};
use crate::template::{builtin_f990, RegionCatalog, TemplateError};

/// Config file basenames searched for, in order.
const CONFIG_BASENAMES: [&str; 1] = ["formscrape"];

/// Config file extensions searched for, in order.
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "yml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Unsupported config format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Invalid environment override {name}={value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template file; the built-in IRS Form 990 template when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    pub preprocess: PreprocessConfig,
    pub checkbox: CheckboxConfig,
    pub ocr: OcrConfig,
    pub extraction: ExtractConfig,
}

/// Options for loading configuration.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Directory to search when no explicit path is given.
    pub search_dir: Option<PathBuf>,
}

impl Config {
    /// Load config using `options`, then apply environment overrides.
    pub fn load(options: &LoadOptions) -> Result<Self, ConfigError> {
        let path = match options.config_path {
            Some(ref path) => Some(path.clone()),
            None => {
                let dir = options
                    .search_dir
                    .clone()
                    .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
                find_config_in(&dir)
            }
        };

        let mut config = match path {
            Some(path) => {
                tracing::debug!("Loading config from {}", path.display());
                Self::load_from_path(&path)?
            }
            None => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse a config file; the format follows the extension.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let parsed: Result<Config, String> = match ext.as_str() {
            "toml" => toml::from_str(&content).map_err(|e| e.to_string()),
            "json" => serde_json::from_str(&content).map_err(|e| e.to_string()),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };

        let mut config = parsed.map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        // Relative template paths resolve against the config file
        if let (Some(template), Some(base)) = (config.template.as_ref(), path.parent()) {
            if template.is_relative() {
                config.template = Some(base.join(template));
            }
        }

        Ok(config)
    }

    /// Apply `FORMSCRAPE_*` overrides read through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(template) = lookup("FORMSCRAPE_TEMPLATE").filter(|s| !s.is_empty()) {
            tracing::debug!("Using FORMSCRAPE_TEMPLATE from environment: {}", template);
            self.template = Some(PathBuf::from(template));
        }

        if let Some(backend) = lookup("FORMSCRAPE_OCR_BACKEND").filter(|s| !s.is_empty()) {
            self.ocr.backend =
                OcrBackendType::from_str(&backend).ok_or(ConfigError::InvalidEnv {
                    name: "FORMSCRAPE_OCR_BACKEND",
                    value: backend.clone(),
                })?;
        }

        if let Some(workers) = lookup("FORMSCRAPE_WORKERS").filter(|s| !s.is_empty()) {
            self.extraction.workers = workers.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "FORMSCRAPE_WORKERS",
                value: workers.clone(),
            })?;
        }

        Ok(())
    }

    /// Load the configured template, or the built-in one.
    pub fn load_catalog(&self) -> Result<RegionCatalog, TemplateError> {
        match self.template {
            Some(ref path) => RegionCatalog::from_path(path),
            None => builtin_f990(),
        }
    }

    /// OCR settings with the engine timeout tied to the field timeout.
    pub fn ocr_config(&self) -> OcrConfig {
        OcrConfig {
            timeout: self.extraction.field_timeout(),
            ..self.ocr.clone()
        }
    }

    /// Build an extractor with the configured backend and tuning.
    pub fn build_extractor(&self) -> Result<FormExtractor, ExtractError> {
        let backend = create_backend(&self.ocr_config())?;
        if !backend.is_available() {
            tracing::warn!("{}", backend.availability_hint());
        }
        FormExtractor::new(self.preprocess.clone(), self.checkbox.clone(), backend)
    }
}

/// Look for a config file in `dir`.
fn find_config_in(dir: &Path) -> Option<PathBuf> {
    for basename in CONFIG_BASENAMES {
        for ext in CONFIG_EXTENSIONS {
            let path = dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ResampleFilter;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.preprocess.upscale_factor, 4);
        assert_eq!(config.preprocess.binarize_threshold, 200);
        assert_eq!(config.preprocess.filter, ResampleFilter::Lanczos3);
        assert_eq!(config.checkbox.ink_fraction, 0.10);
        assert_eq!(config.ocr.backend, OcrBackendType::Tesseract);
        assert_eq!(config.extraction.workers, 4);
        assert!(config.template.is_none());
    }

    #[test]
    fn test_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formscrape.toml");
        std::fs::write(
            &path,
            r#"
template = "templates/w9.toml"

[preprocess]
binarize_threshold = 180
filter = "catmull-rom"

[ocr]
page_segmentation = 7
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.preprocess.binarize_threshold, 180);
        assert_eq!(config.preprocess.upscale_factor, 4);
        assert_eq!(config.preprocess.filter, ResampleFilter::CatmullRom);
        assert_eq!(config.ocr.page_segmentation, Some(7));
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(
            config.template,
            Some(dir.path().join("templates/w9.toml"))
        );
    }

    #[test]
    fn test_discovery_in_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("formscrape.json"),
            r#"{"checkbox": {"ink_fraction": 0.2}}"#,
        )
        .unwrap();

        let options = LoadOptions {
            config_path: None,
            search_dir: Some(dir.path().to_path_buf()),
        };
        let config = Config::load(&options).unwrap();
        assert_eq!(config.checkbox.ink_fraction, 0.2);
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formscrape.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FORMSCRAPE_TEMPLATE", "/forms/f990.yaml"),
            ("FORMSCRAPE_OCR_BACKEND", "OCRS"),
            ("FORMSCRAPE_WORKERS", "8"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_env_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.template, Some(PathBuf::from("/forms/f990.yaml")));
        assert_eq!(config.ocr.backend, OcrBackendType::Ocrs);
        assert_eq!(config.extraction.workers, 8);
    }

    #[test]
    fn test_invalid_env_override() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|name| {
            (name == "FORMSCRAPE_WORKERS").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_engine_timeout_follows_field_timeout() {
        let mut config = Config::default();
        assert_eq!(
            config.ocr_config().timeout,
            Some(std::time::Duration::from_secs(60))
        );

        config.extraction.field_timeout_secs = 0;
        assert_eq!(config.ocr_config().timeout, None);
    }

    #[test]
    fn test_builtin_catalog_by_default() {
        let catalog = Config::default().load_catalog().unwrap();
        assert_eq!(catalog.name(), "irs-990");
    }
}
