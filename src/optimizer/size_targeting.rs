//! # Size-Targeting Optimizer
//!
//! Closed-loop search over the compressor's quality window until the output
//! lands within `[0, target + margin]`.
//!
//! ## Flusso:
//! 1. Resolve the compressor (fatal `ToolNotFound` before touching `output_dir`)
//! 2. Pass-through copy if the original is already in-band
//! 3. Bounded, strictly sequential attempts at decreasing quality, always
//!    compressing the **original** input
//! 4. First in-band result wins and is promoted immediately
//! 5. On exhaustion: promote the best strict improvement, or copy the original
//!
//! Every path leaves exactly one artifact, `{output_dir}/{name}_optimized{ext}`.
//! Iteration files are `TempPath`s, so an early `?` return deletes them too.

use crate::compressor::{CompressionOutcome, Compressor, PngquantCompressor};
use crate::config::{OptimizationTarget, QualityWindow};
use crate::error::OptimizationError;
use crate::file_manager::FileManager;
use crate::optimizer::candidate::{discard, BestCandidate};
use crate::optimizer::report::{CompressionAttempt, OptimizationReport, Resolution};
use crate::tool_resolver::ToolLocator;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Drives a [`Compressor`] toward the configured size band
pub struct SizeTargetingOptimizer<C = PngquantCompressor> {
    target: OptimizationTarget,
    compressor: C,
}

impl SizeTargetingOptimizer<PngquantCompressor> {
    /// Optimizer backed by the external pngquant binary
    pub fn with_pngquant(target: OptimizationTarget) -> Result<Self, OptimizationError> {
        Self::new(target, PngquantCompressor::new())
    }
}

impl<C: Compressor> SizeTargetingOptimizer<C> {
    pub fn new(target: OptimizationTarget, compressor: C) -> Result<Self, OptimizationError> {
        target.validate()?;
        Ok(Self { target, compressor })
    }

    pub fn target(&self) -> &OptimizationTarget {
        &self.target
    }

    /// Optimize `input` into `output_dir`.
    ///
    /// Callers must not run two optimizations of the same input into the same
    /// `output_dir` concurrently: they would race on the final path.
    pub async fn optimize<L: ToolLocator + ?Sized>(
        &self,
        input: &Path,
        output_dir: &Path,
        locator: &L,
    ) -> Result<OptimizationReport, OptimizationError> {
        let tool = locator.locate().map_err(|e| {
            error!("Cannot resolve compressor: {}", e);
            e
        })?;
        debug!("Using compressor at {}", tool.display());

        let input_metadata = fs::metadata(input).await.map_err(|e| {
            OptimizationError::InvalidInput(format!("Cannot read {}: {}", input.display(), e))
        })?;
        if !input_metadata.is_file() {
            return Err(OptimizationError::InvalidInput(format!(
                "Not a regular file: {}",
                input.display()
            )));
        }
        let original_size = input_metadata.len();

        fs::create_dir_all(output_dir).await.map_err(|e| {
            error!("Failed to create output directory {}: {}", output_dir.display(), e);
            OptimizationError::Io(e)
        })?;
        let final_path = FileManager::final_output_path(input, output_dir)?;

        let upper_bound = self.target.upper_bound();
        if self.target.is_in_band(original_size) {
            info!(
                "'{}' ({}) already within target ({}), copying",
                input.display(),
                FileManager::format_size(original_size),
                FileManager::format_size(upper_bound)
            );
            let final_size = self.copy_original(input, &final_path).await?;
            return Ok(OptimizationReport {
                final_path,
                original_size,
                final_size,
                resolution: Resolution::PassThrough,
                attempts: Vec::new(),
            });
        }

        info!(
            "🎯 Optimizing '{}' ({}) toward {}",
            input.display(),
            FileManager::format_size(original_size),
            FileManager::format_size(upper_bound)
        );

        let mut best = BestCandidate::original(original_size);
        let mut attempts = Vec::new();
        let timeout = self.target.timeout();
        let tool_label = tool.display().to_string();

        for (iteration, window) in (0u32..).zip(self.target.quality_schedule()) {
            info!(
                "Iteration {}/{}: quality {}",
                iteration + 1,
                self.target.max_iterations,
                window
            );

            let temp = FileManager::create_iteration_file(output_dir, input, window)?;
            let attempt = self.run_attempt(&tool, input, &temp, iteration, window).await;

            if let Some(failure) = attempt.failure(&tool_label, timeout) {
                warn!("  {}", failure);
            }

            match attempt.outcome {
                CompressionOutcome::Success { size } => {
                    info!("  Result: {}", FileManager::format_size(size));
                    best.offer(temp, size, iteration);
                }
                CompressionOutcome::Declined => {
                    info!("  No usable output at quality {} (declined)", window);
                    discard(temp);
                }
                CompressionOutcome::Failed { .. } | CompressionOutcome::TimedOut => discard(temp),
            }
            attempts.push(attempt);

            if best.is_compressed() && self.target.is_in_band(best.size()) {
                info!(
                    "✅ Target {} reached ({})",
                    FileManager::format_size(upper_bound),
                    FileManager::format_size(best.size())
                );
                return self
                    .finish(best, input, final_path, original_size, attempts)
                    .await;
            }
        }

        if attempts.len() < self.target.max_iterations as usize {
            info!("Reached minimum allowed quality ({})", self.target.quality_floor);
        }
        info!("Search finished without reaching the target");

        self.finish(best, input, final_path, original_size, attempts).await
    }

    /// Run one compressor invocation, absorbing invocation errors into the attempt record
    async fn run_attempt(
        &self,
        tool: &Path,
        input: &Path,
        temp: &TempPath,
        iteration: u32,
        window: QualityWindow,
    ) -> CompressionAttempt {
        let result = self
            .compressor
            .compress(tool, input, temp, window, self.target.timeout())
            .await;

        let (outcome, error) = match result {
            // Never trust a success whose file is missing or empty
            Ok(CompressionOutcome::Success { .. }) => match FileManager::non_empty_size(temp).await {
                Some(size) => (CompressionOutcome::Success { size }, None),
                None => (CompressionOutcome::Declined, None),
            },
            Ok(outcome) => (outcome, None),
            Err(e) => (CompressionOutcome::Failed { code: None }, Some(e.to_string())),
        };

        CompressionAttempt {
            iteration,
            window,
            outcome,
            error,
        }
    }

    /// Resolve the best candidate to the final path
    async fn finish(
        &self,
        mut best: BestCandidate,
        input: &Path,
        final_path: PathBuf,
        original_size: u64,
        attempts: Vec<CompressionAttempt>,
    ) -> Result<OptimizationReport, OptimizationError> {
        if best.size() >= original_size {
            best.discard_compressed(original_size);
        }

        let (final_size, resolution) = match best {
            BestCandidate::Compressed { file, size, iteration } => {
                let resolution = if self.target.is_in_band(size) {
                    Resolution::TargetReached { iteration }
                } else {
                    info!(
                        "Best attempt ({}) beats the original, keeping it",
                        FileManager::format_size(size)
                    );
                    Resolution::BestEffort { iteration }
                };
                self.promote(file, input, &final_path).await?;
                (size, resolution)
            }
            BestCandidate::Original { .. } => {
                info!("No attempt improved on the original, copying it");
                let size = self.copy_original(input, &final_path).await?;
                (size, Resolution::OriginalFallback)
            }
        };

        info!(
            "Final file: {} ({}, {})",
            final_path.display(),
            FileManager::format_size(final_size),
            resolution.describe()
        );

        Ok(OptimizationReport {
            final_path,
            original_size,
            final_size,
            resolution,
            attempts,
        })
    }

    /// Move a candidate onto the final path, replacing any stale file there
    async fn promote(&self, file: TempPath, input: &Path, final_path: &Path) -> Result<(), OptimizationError> {
        if fs::metadata(final_path).await.is_ok() {
            debug!("Replacing stale {}", final_path.display());
            fs::remove_file(final_path).await?;
        }

        file.persist(final_path).map_err(|e| {
            error!("Failed to promote candidate to {}: {}", final_path.display(), e.error);
            OptimizationError::Io(e.error)
        })?;

        // Temp files are created owner-only; give the artifact the input's permissions
        if let Ok(metadata) = fs::metadata(input).await {
            if let Err(e) = fs::set_permissions(final_path, metadata.permissions()).await {
                warn!("Could not copy permissions to {}: {}", final_path.display(), e);
            }
        }
        Ok(())
    }

    /// Copy the untouched original to the final path, returning its size
    async fn copy_original(&self, input: &Path, final_path: &Path) -> Result<u64, OptimizationError> {
        if Self::same_file(input, final_path).await {
            debug!("Input already lives at the final path, nothing to copy");
            return FileManager::file_size(final_path).await;
        }

        fs::copy(input, final_path).await.map_err(|e| {
            error!("Failed to copy original to {}: {}", final_path.display(), e);
            OptimizationError::NoValidOutput(format!(
                "copying {} to {} failed: {}",
                input.display(),
                final_path.display(),
                e
            ))
        })
    }

    /// Final names always gain `_optimized`, so only a symlink can make these equal
    async fn same_file(a: &Path, b: &Path) -> bool {
        match (fs::canonicalize(a).await, fs::canonicalize(b).await) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    const KB: u64 = 1024;

    /// Scripted compressor: pops one step per call and records the windows it saw
    struct FakeCompressor {
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(PathBuf, QualityWindow)>>,
    }

    #[derive(Clone, Copy)]
    enum Step {
        Write(u64),
        Declined,
        Failed,
        TimedOut,
        SuccessWithoutFile,
        SpawnError,
    }

    impl FakeCompressor {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: Mutex::new(steps.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn windows(&self) -> Vec<QualityWindow> {
            self.calls.lock().unwrap().iter().map(|(_, w)| *w).collect()
        }

        fn inputs(&self) -> Vec<PathBuf> {
            self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    impl Compressor for FakeCompressor {
        async fn compress(
            &self,
            _tool: &Path,
            input: &Path,
            output: &Path,
            window: QualityWindow,
            _timeout: Duration,
        ) -> Result<CompressionOutcome, OptimizationError> {
            self.calls.lock().unwrap().push((input.to_path_buf(), window));
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Declined);
            if let Step::SpawnError = step {
                return Err(OptimizationError::ToolInvocationFailed {
                    tool: "pngquant".to_string(),
                    reason: "No such file or directory".to_string(),
                });
            }
            Ok(match step {
                Step::Write(size) => {
                    std::fs::write(output, vec![7u8; size as usize])?;
                    CompressionOutcome::Success { size }
                }
                Step::Declined => CompressionOutcome::Declined,
                Step::Failed => CompressionOutcome::Failed { code: Some(1) },
                Step::TimedOut => CompressionOutcome::TimedOut,
                Step::SuccessWithoutFile => CompressionOutcome::Success { size: 123 },
                Step::SpawnError => unreachable!(),
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        input: PathBuf,
        output_dir: PathBuf,
    }

    fn fixture(input_size: u64) -> Fixture {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("banner.png");
        std::fs::write(&input, vec![1u8; input_size as usize]).unwrap();
        let output_dir = dir.path().join("out");
        Fixture {
            _dir: dir,
            input,
            output_dir,
        }
    }

    fn fake_tool() -> Result<PathBuf, OptimizationError> {
        Ok(PathBuf::from("/usr/bin/pngquant"))
    }

    fn missing_tool() -> Result<PathBuf, OptimizationError> {
        Err(OptimizationError::ToolNotFound {
            tool: "pngquant".to_string(),
            searched: vec![PathBuf::from("tools/pngquant")],
        })
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn optimizer(compressor: FakeCompressor) -> SizeTargetingOptimizer<FakeCompressor> {
        SizeTargetingOptimizer::new(OptimizationTarget::default(), compressor).unwrap()
    }

    #[tokio::test]
    async fn test_in_band_input_is_copied_verbatim() {
        let fx = fixture(650 * KB);
        let opt = optimizer(FakeCompressor::new([]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::PassThrough);
        assert_eq!(report.final_size, 650 * KB);
        assert_eq!(report.final_path, fx.output_dir.join("banner_optimized.png"));
        assert_eq!(std::fs::read(&report.final_path).unwrap(), std::fs::read(&fx.input).unwrap());
        assert!(opt.compressor.windows().is_empty());
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_first_iteration_in_band_stops_search() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::Write(680 * KB), Step::Write(10 * KB)]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::TargetReached { iteration: 0 });
        assert_eq!(report.final_size, 680 * KB);
        assert_eq!(report.invocations(), 1);
        assert_eq!(opt.compressor.windows(), vec![QualityWindow { min: 65, max: 80 }]);
        assert_eq!(std::fs::metadata(&report.final_path).unwrap().len(), 680 * KB);
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_exhausted_search_keeps_best_out_of_band_result() {
        let fx = fixture(2048 * KB);
        let target = OptimizationTarget {
            target_size_bytes: 600 * KB,
            ..Default::default()
        };
        let compressor = FakeCompressor::new([
            Step::Write(800 * KB),
            Step::Write(760 * KB),
            Step::Write(750 * KB),
            Step::Write(720 * KB),
            Step::Write(755 * KB),
        ]);
        let opt = SizeTargetingOptimizer::new(target, compressor).unwrap();

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::BestEffort { iteration: 3 });
        assert_eq!(report.final_size, 720 * KB);
        assert_eq!(report.invocations(), 5);
        assert_eq!(std::fs::metadata(&report.final_path).unwrap().len(), 720 * KB);
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_missing_tool_fails_before_writing() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::Write(10 * KB)]));

        let result = opt.optimize(&fx.input, &fx.output_dir, &missing_tool).await;

        assert!(matches!(result, Err(OptimizationError::ToolNotFound { .. })));
        assert!(!fx.output_dir.exists());
        assert!(opt.compressor.windows().is_empty());
    }

    #[tokio::test]
    async fn test_all_timeouts_fall_back_to_original() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::TimedOut; 5]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::OriginalFallback);
        assert_eq!(report.final_size, 2048 * KB);
        assert_eq!(report.invocations(), 5);
        assert!(report.attempts.iter().all(|a| a.outcome == CompressionOutcome::TimedOut));
        assert_eq!(std::fs::read(&report.final_path).unwrap(), std::fs::read(&fx.input).unwrap());
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_windows_decrease_and_always_use_original_input() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([
            Step::Write(1500 * KB),
            Step::Failed,
            Step::Write(1200 * KB),
            Step::Declined,
            Step::Write(1300 * KB),
        ]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        let windows = opt.compressor.windows();
        assert_eq!(windows.len(), 5);
        assert!(windows.windows(2).all(|pair| pair[1].min < pair[0].min && pair[1].max < pair[0].max));
        assert!(windows.iter().all(|w| w.min >= opt.target().quality_floor));
        assert!(opt.compressor.inputs().iter().all(|p| p == &fx.input));

        assert_eq!(report.resolution, Resolution::BestEffort { iteration: 2 });
        assert_eq!(report.final_size, 1200 * KB);
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_floor_limits_invocations() {
        let fx = fixture(2048 * KB);
        let target = OptimizationTarget {
            initial_quality_min: 50,
            initial_quality_max: 60,
            quality_floor: 45,
            max_iterations: 10,
            ..Default::default()
        };
        let opt = SizeTargetingOptimizer::new(target, FakeCompressor::new([])).unwrap();

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(
            opt.compressor.windows(),
            vec![QualityWindow { min: 50, max: 60 }, QualityWindow { min: 45, max: 55 }]
        );
        assert_eq!(report.resolution, Resolution::OriginalFallback);
    }

    #[tokio::test]
    async fn test_never_worse_than_original() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::Write(3000 * KB), Step::Write(2048 * KB)]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::OriginalFallback);
        assert!(report.final_size <= report.original_size);
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_success_without_file_is_treated_as_declined() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::SuccessWithoutFile]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.attempts[0].outcome, CompressionOutcome::Declined);
        assert_eq!(report.resolution, Resolution::OriginalFallback);
    }

    #[tokio::test]
    async fn test_invocation_errors_are_absorbed_per_iteration() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::SpawnError; 5]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::OriginalFallback);
        assert_eq!(report.invocations(), 5);
        assert!(report
            .attempts
            .iter()
            .all(|a| a.outcome == CompressionOutcome::Failed { code: None } && a.error.is_some()));
        assert!(matches!(
            report.attempts[0].failure("pngquant", opt.target().timeout()),
            Some(OptimizationError::ToolInvocationFailed { .. })
        ));
        assert_eq!(std::fs::read(&report.final_path).unwrap(), std::fs::read(&fx.input).unwrap());
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_invocation_error_does_not_stop_later_attempts() {
        let fx = fixture(2048 * KB);
        let opt = optimizer(FakeCompressor::new([Step::SpawnError, Step::Write(600 * KB)]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(report.resolution, Resolution::TargetReached { iteration: 1 });
        assert!(report.attempts[0].error.is_some());
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_uncreatable_output_dir_is_io_error() {
        let fx = fixture(2048 * KB);
        std::fs::write(&fx.output_dir, b"not a directory").unwrap();
        let opt = optimizer(FakeCompressor::new([Step::Write(10 * KB)]));

        let result = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await;

        assert!(matches!(result, Err(OptimizationError::Io(_))));
        assert!(opt.compressor.windows().is_empty());
        assert!(fx.output_dir.is_file());
    }

    #[tokio::test]
    async fn test_stale_final_file_is_replaced() {
        let fx = fixture(2048 * KB);
        std::fs::create_dir_all(&fx.output_dir).unwrap();
        std::fs::write(fx.output_dir.join("banner_optimized.png"), b"stale").unwrap();
        let opt = optimizer(FakeCompressor::new([Step::Write(500 * KB)]));

        let report = opt.optimize(&fx.input, &fx.output_dir, &fake_tool).await.unwrap();

        assert_eq!(std::fs::metadata(&report.final_path).unwrap().len(), 500 * KB);
        assert_eq!(dir_entries(&fx.output_dir), vec!["banner_optimized.png"]);
    }

    #[tokio::test]
    async fn test_missing_input_is_invalid() {
        let fx = fixture(10);
        let opt = optimizer(FakeCompressor::new([]));
        let result = opt
            .optimize(&fx.input.with_file_name("absent.png"), &fx.output_dir, &fake_tool)
            .await;
        assert!(matches!(result, Err(OptimizationError::InvalidInput(_))));
        assert!(!fx.output_dir.exists());
    }

    #[test]
    fn test_invalid_target_is_rejected() {
        let target = OptimizationTarget {
            quality_step: 0,
            ..Default::default()
        };
        assert_err!(SizeTargetingOptimizer::new(target, FakeCompressor::new([])).map(|_| ()));
        assert_ok!(SizeTargetingOptimizer::new(OptimizationTarget::default(), FakeCompressor::new([])).map(|_| ()));
    }
}
