//! Helpers shared by OCR backends: tool lookup and model files.

// Model helpers are only used when the ocr-ocrs feature is enabled
#![cfg_attr(not(feature = "ocr-ocrs"), allow(dead_code))]

use std::path::{Path, PathBuf};
use std::process::Command;

use super::backend::OcrError;

/// Download tools tried in order, with the flags that write to a given path.
const DOWNLOADERS: [(&str, &[&str]); 2] = [("curl", &["-fsSL", "-o"]), ("wget", &["-q", "-O"])];

/// Whether `name` resolves on PATH.
pub fn check_binary(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A model file fetched on first use.
pub struct ModelFile {
    pub url: &'static str,
    pub filename: &'static str,
    /// Shown in the download log line.
    pub approx_size: &'static str,
}

/// The set of model files one backend needs, and where they live.
pub struct ModelStore {
    /// Directory name under `<data dir>/formscrape/models`.
    pub name: &'static str,
    pub files: &'static [ModelFile],
}

impl ModelStore {
    /// Where downloads go.
    pub fn default_dir(&self) -> PathBuf {
        dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("formscrape")
            .join("models")
            .join(self.name)
    }

    fn search_dirs(&self, configured: Option<&Path>) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(3);
        dirs.extend(configured.map(Path::to_path_buf));
        dirs.push(self.default_dir());
        dirs.push(PathBuf::from("/usr/share/formscrape/models").join(self.name));
        dirs
    }

    /// Whether `dir` holds every file of the store.
    pub fn is_complete(&self, dir: &Path) -> bool {
        self.files.iter().all(|file| dir.join(file.filename).is_file())
    }

    /// First directory holding the full set, preferring `configured`.
    pub fn locate(&self, configured: Option<&Path>) -> Option<PathBuf> {
        self.search_dirs(configured)
            .into_iter()
            .find(|dir| self.is_complete(dir))
    }

    /// Locate the models, downloading missing files into the default dir.
    pub fn fetch(&self, configured: Option<&Path>) -> Result<PathBuf, OcrError> {
        if let Some(dir) = self.locate(configured) {
            return Ok(dir);
        }

        let dir = self.default_dir();
        std::fs::create_dir_all(&dir)?;
        for file in self.files {
            let dest = dir.join(file.filename);
            if dest.is_file() {
                continue;
            }
            tracing::info!("Downloading {} (~{})", file.filename, file.approx_size);
            download(file.url, &dest)?;
        }
        Ok(dir)
    }
}

/// Fetch `url` into `dest` with the first available download tool.
pub fn download(url: &str, dest: &Path) -> Result<(), OcrError> {
    for (tool, flags) in DOWNLOADERS {
        match Command::new(tool).args(flags).arg(dest).arg(url).status() {
            Ok(status) if status.success() => return Ok(()),
            Ok(status) => {
                let _ = std::fs::remove_file(dest);
                return Err(OcrError::OcrFailed(format!(
                    "{} {} while fetching {}",
                    tool, status, url
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(OcrError::Io(e)),
        }
    }
    Err(OcrError::BackendNotAvailable(
        "neither curl nor wget found; cannot download models".to_string(),
    ))
}
