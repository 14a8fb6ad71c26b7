//! # Configuration Management Module
//!
//! Questo modulo gestisce la configurazione dell'ottimizzatore a dimensione target.
//!
//! ## Responsabilità:
//! - Definisce la struct `OptimizationTarget` con tutti i parametri della ricerca
//! - Fornisce validazione robusta dei parametri
//! - Calcola la banda di tolleranza e lo schedule delle finestre di qualità
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//!
//! ## Parametri di configurazione:
//! - `target_size_bytes`: Dimensione obiettivo (default: 700 KB)
//! - `margin_fraction`: Margine accettabile sopra l'obiettivo (default: 0.05)
//! - `initial_quality_min` / `initial_quality_max`: Prima finestra (default: 65-80)
//! - `quality_floor`: Qualità minima assoluta (default: 40)
//! - `quality_step`: Riduzione per iterazione (default: 5)
//! - `max_iterations`: Numero massimo di tentativi (default: 5)
//! - `timeout_secs`: Timeout per ogni invocazione di pngquant (default: 60)
//!
//! ## Esempio:
//! ```ignore
//! let target = OptimizationTarget {
//!     target_size_bytes: 500 * 1024,
//!     ..Default::default()
//! };
//! target.validate()?;
//! for window in target.quality_schedule() {
//!     println!("{}", window); // 65-80, 60-75, ...
//! }
//! ```

use crate::error::OptimizationError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Quality range handed to the compressor for one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityWindow {
    pub min: u8,
    pub max: u8,
}

impl fmt::Display for QualityWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Immutable parameters of one size-targeted optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationTarget {
    /// Target size in bytes
    pub target_size_bytes: u64,
    /// Acceptable overshoot as a fraction of the target
    pub margin_fraction: f64,
    /// Lower bound of the first quality window
    pub initial_quality_min: u8,
    /// Upper bound of the first quality window
    pub initial_quality_max: u8,
    /// No attempt runs with a window minimum below this
    pub quality_floor: u8,
    /// Amount the window moves down after each iteration
    pub quality_step: u8,
    /// Maximum number of compressor invocations
    pub max_iterations: u32,
    /// Per-invocation timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OptimizationTarget {
    fn default() -> Self {
        Self {
            target_size_bytes: 700 * 1024,
            margin_fraction: 0.05,
            initial_quality_min: 65,
            initial_quality_max: 80,
            quality_floor: 40,
            quality_step: 5,
            max_iterations: 5,
            timeout_secs: 60,
        }
    }
}

impl OptimizationTarget {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), OptimizationError> {
        if self.target_size_bytes == 0 {
            return Err(OptimizationError::InvalidConfig(
                "Target size must be greater than 0".to_string(),
            ));
        }

        if !self.margin_fraction.is_finite() || self.margin_fraction < 0.0 {
            return Err(OptimizationError::InvalidConfig(
                "Margin fraction must be a finite value >= 0".to_string(),
            ));
        }

        if self.initial_quality_max > 100 || self.initial_quality_min > self.initial_quality_max {
            return Err(OptimizationError::InvalidConfig(format!(
                "Quality window must satisfy min <= max <= 100 (got {}-{})",
                self.initial_quality_min, self.initial_quality_max
            )));
        }

        if self.quality_floor > self.initial_quality_min {
            return Err(OptimizationError::InvalidConfig(format!(
                "Quality floor ({}) must not exceed the initial minimum quality ({})",
                self.quality_floor, self.initial_quality_min
            )));
        }

        if self.quality_step == 0 {
            return Err(OptimizationError::InvalidConfig(
                "Quality step must be greater than 0".to_string(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(OptimizationError::InvalidConfig(
                "Max iterations must be at least 1".to_string(),
            ));
        }

        if self.timeout_secs == 0 {
            return Err(OptimizationError::InvalidConfig(
                "Timeout must be greater than 0 seconds".to_string(),
            ));
        }

        Ok(())
    }

    /// Largest size still considered in-band
    pub fn upper_bound(&self) -> u64 {
        let margin = (self.target_size_bytes as f64 * self.margin_fraction).floor() as u64;
        self.target_size_bytes.saturating_add(margin)
    }

    /// Whether `size` falls within `[0, target + margin]`
    pub fn is_in_band(&self, size: u64) -> bool {
        size <= self.upper_bound()
    }

    /// Per-invocation timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Quality windows in iteration order.
    ///
    /// Stops before the first window whose minimum would fall below the floor,
    /// so the schedule may be shorter than `max_iterations`.
    pub fn quality_schedule(&self) -> impl Iterator<Item = QualityWindow> + '_ {
        (0..self.max_iterations).map_while(move |iteration| {
            let drop = u32::from(self.quality_step).checked_mul(iteration)?;
            let min = u32::from(self.initial_quality_min).checked_sub(drop)?;
            if min < u32::from(self.quality_floor) {
                return None;
            }
            let max = u32::from(self.initial_quality_max).saturating_sub(drop);
            Some(QualityWindow {
                min: min as u8,
                max: max as u8,
            })
        })
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let target: OptimizationTarget = serde_json::from_str(&content)?;
        target.validate()?;
        Ok(target)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
