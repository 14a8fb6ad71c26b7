//! # File Management Module
//!
//! Questo modulo gestisce tutte le operazioni sui file dell'ottimizzatore.
//!
//! ## Responsabilità:
//! - Calcolo del path finale `{output_dir}/{nome}_optimized{ext}`
//! - Creazione dei file temporanei per ogni iterazione dentro `output_dir`
//! - Discovery ricorsiva dei file PNG in una directory
//! - Utilità per dimensioni e percentuali di riduzione
//!
//! ## File temporanei:
//! Ogni iterazione scrive su un `TempPath` con nome univoco. Il file viene
//! cancellato automaticamente se il `TempPath` viene droppato, quindi nessun
//! percorso di errore lascia file intermedi nella directory di output.
//!
//! ## Esempio:
//! ```ignore
//! let final_path = FileManager::final_output_path(&input, &output_dir)?;
//! let temp = FileManager::create_iteration_file(&output_dir, &input, window)?;
//! ```

use crate::config::QualityWindow;
use crate::error::OptimizationError;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Inputs of a batch, split by whether their final path is free
#[derive(Debug, Default)]
pub struct OutputPlan {
    pub accepted: Vec<PathBuf>,
    pub conflicts: Vec<OutputConflict>,
}

/// An input whose artifact would overwrite another input's
#[derive(Debug)]
pub struct OutputConflict {
    pub input: PathBuf,
    pub claimed_by: PathBuf,
    pub final_path: PathBuf,
}

impl fmt::Display for OutputConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} would overwrite {} (already produced from {})",
            self.input.display(),
            self.final_path.display(),
            self.claimed_by.display()
        )
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Size in bytes of an existing file
    pub async fn file_size(path: &Path) -> Result<u64, OptimizationError> {
        Ok(fs::metadata(path).await?.len())
    }

    /// Size of `path`, or `None` if it is missing or empty
    pub async fn non_empty_size(path: &Path) -> Option<u64> {
        match fs::metadata(path).await {
            Ok(metadata) if metadata.is_file() && metadata.len() > 0 => Some(metadata.len()),
            _ => None,
        }
    }

    /// `{output_dir}/{stem}_optimized{.ext}`, keeping the input's name bytes as-is
    pub fn final_output_path(input: &Path, output_dir: &Path) -> Result<PathBuf, OptimizationError> {
        let mut filename = Self::stem(input)?;
        filename.push("_optimized");
        if let Some(ext) = input.extension() {
            filename.push(".");
            filename.push(ext);
        }
        Ok(output_dir.join(filename))
    }

    /// Fresh uniquely-named file inside `output_dir` for one compression attempt
    pub fn create_iteration_file(
        output_dir: &Path,
        input: &Path,
        window: QualityWindow,
    ) -> Result<TempPath, OptimizationError> {
        let mut prefix = Self::stem(input)?;
        prefix.push(format!("_q{}-", window.min));
        let mut suffix = OsString::from("_iter");
        if let Some(ext) = input.extension() {
            suffix.push(".");
            suffix.push(ext);
        }

        let file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .tempfile_in(output_dir)?;

        Ok(file.into_temp_path())
    }

    fn stem(input: &Path) -> Result<OsString, OptimizationError> {
        input
            .file_stem()
            .map(OsStr::to_os_string)
            .ok_or_else(|| OptimizationError::InvalidInput(format!("Invalid file name: {}", input.display())))
    }

    /// Find all PNG files in a directory.
    ///
    /// Directories resolving to `exclude` are not descended into, so an output
    /// directory nested inside the input tree is never picked up again.
    pub fn find_png_files(dir: &Path, exclude: Option<&Path>) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_entry(|e| match exclude {
                Some(excluded) if e.file_type().is_dir() => std::fs::canonicalize(e.path())
                    .map(|p| p.as_path() != excluded)
                    .unwrap_or(true),
                _ => true,
            })
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::is_png(path))
            .collect();
        files.sort();
        files
    }

    /// Split a batch into inputs that own their final path and inputs that would
    /// overwrite the artifact of an earlier one.
    ///
    /// The same file listed twice is kept once.
    pub fn plan_outputs(files: Vec<PathBuf>, output_dir: &Path) -> OutputPlan {
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut plan = OutputPlan::default();

        for input in files {
            // Unusable names are left for the optimizer to report
            let Ok(final_path) = Self::final_output_path(&input, output_dir) else {
                plan.accepted.push(input);
                continue;
            };

            match claimed.get(&final_path) {
                Some(owner) if Self::same_input(owner, &input) => {
                    debug!("Skipping duplicate input {}", input.display());
                }
                Some(owner) => plan.conflicts.push(OutputConflict {
                    input,
                    claimed_by: owner.clone(),
                    final_path,
                }),
                None => {
                    claimed.insert(final_path, input.clone());
                    plan.accepted.push(input);
                }
            }
        }
        plan
    }

    fn same_input(a: &Path, b: &Path) -> bool {
        match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }

    /// Check if a file is a PNG (by extension, case-insensitive)
    pub fn is_png(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("png"))
            .unwrap_or(false)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
