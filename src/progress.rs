//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di un batch di file.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche (target raggiunto, best effort, originali invariati, errori)
//! - Calcolo byte risparmiati e percentuale di riduzione complessiva
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 3/5 (60%) ✅ banner.png: 67.1% saved
//! ```
//!
//! ## Esempio:
//! ```ignore
//! let progress = ProgressManager::new(total_files);
//! let mut stats = OptimizationStats::new();
//!
//! // Per ogni file processato:
//! stats.add_report(&report);
//! progress.update("banner.png: 67.1% saved");
//!
//! // Alla fine:
//! progress.finish(&stats.format_summary());
//! ```

use crate::file_manager::FileManager;
use crate::optimizer::{OptimizationReport, Resolution};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Manages progress reporting for a batch of files
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hidden bar, for JSON mode
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Set a custom message without incrementing
    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics tracker for a batch
#[derive(Debug, Default, Clone, Serialize)]
pub struct OptimizationStats {
    pub files_processed: usize,
    pub files_reached_target: usize,
    pub files_best_effort: usize,
    pub files_unchanged: usize,
    pub total_bytes_saved: u64,
    pub total_original_size: u64,
    pub errors: usize,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_report(&mut self, report: &OptimizationReport) {
        self.files_processed += 1;
        self.total_original_size += report.original_size;
        self.total_bytes_saved += report.original_size.saturating_sub(report.final_size);
        match report.resolution {
            Resolution::TargetReached { .. } => self.files_reached_target += 1,
            Resolution::BestEffort { .. } => self.files_best_effort += 1,
            Resolution::PassThrough | Resolution::OriginalFallback => self.files_unchanged += 1,
        }
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Target reached: {} | Best effort: {} | Unchanged: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_reached_target,
            self.files_best_effort,
            self.files_unchanged,
            self.errors,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
