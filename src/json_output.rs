//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per i consumatori programmatici
//! (ad esempio l'interfaccia grafica o l'assemblatore del documento).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio del batch con la configurazione effettiva
//! - `file_complete`: File ottimizzato (path finale, dimensioni, tentativi)
//! - `file_error`: Errore su un singolo file
//! - `complete`: Fine del batch con statistiche finali
//!
//! Un messaggio per riga su stdout.

use crate::config::OptimizationTarget;
use crate::optimizer::{CompressionAttempt, OptimizationReport, Resolution};
use crate::progress::OptimizationStats;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Inizio del batch
    Start {
        output_dir: PathBuf,
        total_files: usize,
        target: OptimizationTarget,
        upper_bound: u64,
    },

    /// Fine elaborazione di un file specifico
    FileComplete {
        input: PathBuf,
        final_path: PathBuf,
        original_size: u64,
        final_size: u64,
        reduction_percent: f64,
        resolution: Resolution,
        width: Option<u32>,
        height: Option<u32>,
        attempts: Vec<CompressionAttempt>,
    },

    /// Errore su un singolo file
    FileError { input: PathBuf, message: String },

    /// Batch completato
    Complete {
        stats: OptimizationStats,
        duration_seconds: f64,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(output_dir: PathBuf, total_files: usize, target: &OptimizationTarget) -> Self {
        Self::Start {
            output_dir,
            total_files,
            upper_bound: target.upper_bound(),
            target: target.clone(),
        }
    }

    /// `dimensions` is `None` when the final artifact could not be decoded
    pub fn file_complete(input: PathBuf, report: &OptimizationReport, dimensions: Option<(u32, u32)>) -> Self {
        Self::FileComplete {
            input,
            final_path: report.final_path.clone(),
            original_size: report.original_size,
            final_size: report.final_size,
            reduction_percent: report.reduction_percent(),
            resolution: report.resolution,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            attempts: report.attempts.clone(),
        }
    }

    pub fn file_error(input: PathBuf, message: String) -> Self {
        Self::FileError { input, message }
    }

    pub fn complete(stats: &OptimizationStats, duration_seconds: f64) -> Self {
        Self::Complete {
            stats: stats.clone(),
            duration_seconds,
        }
    }
}
