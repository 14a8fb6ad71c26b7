//! # Optimization Report
//!
//! What a finished call hands back to its caller: the final artifact, its size,
//! how the search ended, and the per-iteration history.

use crate::compressor::CompressionOutcome;
use crate::config::QualityWindow;
use crate::error::OptimizationError;
use crate::file_manager::FileManager;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// One loop iteration's result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionAttempt {
    /// Zero-based iteration index
    pub iteration: u32,
    pub window: QualityWindow,
    pub outcome: CompressionOutcome,
    /// Set when the invocation itself failed (spawn or wait error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompressionAttempt {
    /// Size of the produced file, if any
    pub fn size(&self) -> Option<u64> {
        match self.outcome {
            CompressionOutcome::Success { size } => Some(size),
            _ => None,
        }
    }

    /// The absorbed failure behind this attempt, for logs and reports
    pub fn failure(&self, tool: &str, timeout: Duration) -> Option<OptimizationError> {
        if let Some(ref reason) = self.error {
            return Some(OptimizationError::ToolInvocationFailed {
                tool: tool.to_string(),
                reason: reason.clone(),
            });
        }

        match self.outcome {
            CompressionOutcome::TimedOut => Some(OptimizationError::ToolTimeout {
                iteration: self.iteration,
                timeout,
            }),
            CompressionOutcome::Failed { code } => Some(OptimizationError::ToolInvocationFailed {
                tool: tool.to_string(),
                reason: match code {
                    Some(code) => format!("exited with code {} at quality {}", code, self.window),
                    None => format!("terminated by signal at quality {}", self.window),
                },
            }),
            CompressionOutcome::Success { .. } | CompressionOutcome::Declined => None,
        }
    }
}

/// How the final artifact was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Input already in-band, copied verbatim
    PassThrough,
    /// An attempt landed in-band and the search stopped there
    TargetReached { iteration: u32 },
    /// Budget exhausted, smallest out-of-band improvement kept
    BestEffort { iteration: u32 },
    /// Nothing beat the original, which was copied verbatim
    OriginalFallback,
}

impl Resolution {
    pub fn describe(&self) -> String {
        match self {
            Self::PassThrough => "already within target".to_string(),
            Self::TargetReached { iteration } => format!("target reached on iteration {}", iteration + 1),
            Self::BestEffort { iteration } => format!("best effort from iteration {}", iteration + 1),
            Self::OriginalFallback => "no improvement, original kept".to_string(),
        }
    }
}

/// Result of a successful `optimize` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub final_path: PathBuf,
    pub original_size: u64,
    pub final_size: u64,
    pub resolution: Resolution,
    pub attempts: Vec<CompressionAttempt>,
}

impl OptimizationReport {
    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.final_size)
    }

    /// Number of compressor invocations made
    pub fn invocations(&self) -> usize {
        self.attempts.len()
    }

    /// Pixel width and height of the final artifact, as needed for document assembly
    pub fn dimensions(&self) -> Result<(u32, u32), OptimizationError> {
        Ok(image::image_dimensions(&self.final_path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(outcome: CompressionOutcome) -> CompressionAttempt {
        CompressionAttempt {
            iteration: 2,
            window: QualityWindow { min: 55, max: 70 },
            outcome,
            error: None,
        }
    }

    #[test]
    fn test_attempt_failure_mapping() {
        let timeout = Duration::from_secs(60);
        assert!(attempt(CompressionOutcome::Success { size: 10 }).failure("pngquant", timeout).is_none());
        assert!(attempt(CompressionOutcome::Declined).failure("pngquant", timeout).is_none());
        assert!(matches!(
            attempt(CompressionOutcome::TimedOut).failure("pngquant", timeout),
            Some(OptimizationError::ToolTimeout { iteration: 2, .. })
        ));

        let failed = attempt(CompressionOutcome::Failed { code: Some(1) }).failure("pngquant", timeout);
        let message = failed.unwrap().to_string();
        assert!(message.contains("code 1"));
        assert!(message.contains("55-70"));
    }

    #[test]
    fn test_report_serializes_resolution() {
        let report = OptimizationReport {
            final_path: PathBuf::from("/out/a_optimized.png"),
            original_size: 2000,
            final_size: 500,
            resolution: Resolution::TargetReached { iteration: 0 },
            attempts: vec![attempt(CompressionOutcome::Success { size: 500 })],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["resolution"]["kind"], "target_reached");
        assert_eq!(json["attempts"][0]["outcome"]["status"], "success");
        assert_eq!(report.reduction_percent(), 75.0);
        assert_eq!(report.invocations(), 1);
    }

    #[test]
    fn test_dimensions_reads_png_header() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tiny.png");
        image::RgbaImage::new(3, 2).save(&path).unwrap();

        let report = OptimizationReport {
            final_path: path,
            original_size: 1,
            final_size: 1,
            resolution: Resolution::PassThrough,
            attempts: Vec::new(),
        };
        assert_eq!(report.dimensions().unwrap(), (3, 2));
    }
}
