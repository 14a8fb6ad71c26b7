//! # Compressor Capability
//!
//! The optimizer never spawns processes itself: it talks to a [`Compressor`],
//! which runs one lossy compression of the original input into a given output
//! file and reports what happened. [`PngquantCompressor`] is the production
//! implementation; tests substitute a scripted fake.
//!
//! ## pngquant contract
//!
//! ```text
//! pngquant --force --quality=<min>-<max> --skip-if-larger --output <out> <in>
//! ```
//!
//! | Result                                  | Outcome     |
//! |-----------------------------------------|-------------|
//! | exit 0, non-empty output                | `Success`   |
//! | exit 0, missing or empty output         | `Declined`  |
//! | exit 98 (larger than input)             | `Declined`  |
//! | exit 99 (quality below minimum)         | `Declined`  |
//! | any other exit code                     | `Failed`    |
//! | still running after the timeout         | `TimedOut`  |

use crate::config::QualityWindow;
use crate::error::OptimizationError;
use crate::file_manager::FileManager;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// pngquant exit code when `--skip-if-larger` rejected the result
const PNGQUANT_SKIPPED_LARGER: i32 = 98;
/// pngquant exit code when the minimum quality could not be met
const PNGQUANT_QUALITY_TOO_LOW: i32 = 99;

/// Result of a single compressor invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CompressionOutcome {
    /// Output written, `size` bytes
    Success { size: u64 },
    /// Tool ran but chose not to produce output
    Declined,
    /// Tool exited with an error (`None` when killed by a signal)
    Failed { code: Option<i32> },
    /// Tool exceeded its timeout and was killed
    TimedOut,
}

/// One lossy compression of `input` into `output`
#[allow(async_fn_in_trait)]
pub trait Compressor {
    async fn compress(
        &self,
        tool: &Path,
        input: &Path,
        output: &Path,
        window: QualityWindow,
        timeout: Duration,
    ) -> Result<CompressionOutcome, OptimizationError>;
}

/// Runs the external `pngquant` binary
#[derive(Debug, Clone, Default)]
pub struct PngquantCompressor;

impl PngquantCompressor {
    pub fn new() -> Self {
        Self
    }

    /// Command line for one attempt
    pub fn build_args(input: &Path, output: &Path, window: QualityWindow) -> Vec<std::ffi::OsString> {
        vec![
            "--force".into(),
            format!("--quality={}", window).into(),
            "--skip-if-larger".into(),
            "--output".into(),
            output.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }

    fn classify_exit(code: Option<i32>) -> Option<CompressionOutcome> {
        match code {
            Some(0) => None,
            Some(PNGQUANT_SKIPPED_LARGER) | Some(PNGQUANT_QUALITY_TOO_LOW) => Some(CompressionOutcome::Declined),
            code => Some(CompressionOutcome::Failed { code }),
        }
    }
}

impl Compressor for PngquantCompressor {
    async fn compress(
        &self,
        tool: &Path,
        input: &Path,
        output: &Path,
        window: QualityWindow,
        timeout: Duration,
    ) -> Result<CompressionOutcome, OptimizationError> {
        let args = Self::build_args(input, output, window);
        debug!("Running {:?} with {:?}", tool, args);

        let child = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OptimizationError::ToolInvocationFailed {
                tool: tool.display().to_string(),
                reason: e.to_string(),
            })?;

        let start_time = Instant::now();
        // Dropping the wait future on timeout drops the child, which kills it
        let output_data = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| OptimizationError::ToolInvocationFailed {
                tool: tool.display().to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!("pngquant killed after exceeding {:?} (quality {})", timeout, window);
                return Ok(CompressionOutcome::TimedOut);
            }
        };
        let elapsed = start_time.elapsed();

        let stdout = String::from_utf8_lossy(&output_data.stdout);
        let stderr = String::from_utf8_lossy(&output_data.stderr);
        if !stdout.trim().is_empty() {
            debug!("pngquant stdout: {}", stdout.trim());
        }
        if !stderr.trim().is_empty() {
            debug!("pngquant stderr: {}", stderr.trim());
        }

        let code = output_data.status.code();
        debug!("pngquant finished in {:?} with code {:?}", elapsed, code);

        if let Some(outcome) = Self::classify_exit(code) {
            return Ok(outcome);
        }

        Ok(match FileManager::non_empty_size(output).await {
            Some(size) => CompressionOutcome::Success { size },
            None => CompressionOutcome::Declined,
        })
    }
}
