//! Discovery of voice models in the model directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::voice::default_config_path;

/// A voice model found on disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFile {
    pub filename: String,
    pub path: String,
    /// Whether `<model>.onnx.json` sits next to the model
    pub has_config: bool,
    /// Size in MiB, rounded to one decimal
    pub size_mb: f64,
}

/// Lists `.onnx` models in one directory. Not recursive.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    dir: PathBuf,
}

impl ModelCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Models sorted by filename. A missing or unreadable directory yields an empty list.
    pub fn list(&self) -> Vec<ModelFile> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if self.dir.exists() {
                    warn!("Cannot read model directory {}: {}", self.dir.display(), e);
                }
                return Vec::new();
            }
        };

        let mut models: Vec<ModelFile> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "onnx"))
            .map(|path| {
                let size = fs::metadata(&path).map(|m| m.len()).unwrap_or_default();
                ModelFile {
                    filename: path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(),
                    has_config: default_config_path(&path).is_file(),
                    size_mb: round_mb(size),
                    path: path.to_string_lossy().to_string(),
                }
            })
            .collect();

        models.sort_by(|a, b| a.filename.cmp(&b.filename));
        models
    }

    pub fn count(&self) -> usize {
        self.list().len()
    }

    /// Print the catalog as a table.
    pub fn print_models(&self) {
        let models = self.list();

        println!("═══════════════════════════════════════════════════════════════════");
        println!("  Voice models in {} ({} found)", self.dir.display(), models.len());
        println!("═══════════════════════════════════════════════════════════════════");
        println!();

        if models.is_empty() {
            println!("No .onnx models found. Download a Piper voice, e.g. en_US-lessac-medium.onnx");
            println!("together with its en_US-lessac-medium.onnx.json config.");
            println!();
            return;
        }

        println!("{:<40} {:>9} CONFIG", "MODEL", "SIZE");
        println!("{}", "─".repeat(60));
        for model in &models {
            let config = if model.has_config { "yes" } else { "missing" };
            println!("{:<40} {:>6.1} MB {}", model.filename, model.size_mb, config);
        }

        println!();
        println!("Usage:");
        println!("  ./voice-service --model {}", models[0].path);
        println!();
    }
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 10.0).round() / 10.0
}
