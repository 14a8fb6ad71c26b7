//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore dell'ottimizzatore a dimensione target.
//!
//! ## Responsabilità:
//! - Definisce `OptimizationError` enum per categorizzare tutti gli errori possibili
//! - Fornisce messaggi di errore descrittivi e strutturati
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `ToolNotFound`: pngquant non trovato (fatale, nessun file scritto)
//! - `ToolInvocationFailed`: il tool non parte o termina con errore (per iterazione, recuperato)
//! - `ToolTimeout`: il tool supera il timeout (per iterazione, recuperato)
//! - `Io`: Errori di I/O (creazione directory, copia, rename)
//! - `NoValidOutput`: impossibile produrre qualsiasi artifact finale
//! - `InvalidConfig` / `InvalidInput`: validazione parametri e path
//! - `Image`: lettura dimensioni dell'immagine finale
//!
//! ## Propagazione:
//! Solo gli errori fatali arrivano al chiamante. Gli errori per iterazione vengono
//! loggati e assorbiti dal loop di ricerca.
//!
//! ## Esempio:
//! ```ignore
//! if !tool_exists {
//!     return Err(OptimizationError::ToolNotFound {
//!         tool: "pngquant".to_string(),
//!         searched: vec![],
//!     });
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Custom error types for size-targeted optimization
#[derive(thiserror::Error, Debug)]
pub enum OptimizationError {
    #[error("Tool not found: {tool} (searched: {})", format_searched(.searched))]
    ToolNotFound { tool: String, searched: Vec<PathBuf> },

    #[error("Tool invocation failed: {tool}: {reason}")]
    ToolInvocationFailed { tool: String, reason: String },

    #[error("Tool timed out on iteration {iteration} after {timeout:?}")]
    ToolTimeout { iteration: u32, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No valid output could be produced: {0}")]
    NoValidOutput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl OptimizationError {
    /// Whether this error should abort a whole batch rather than a single file
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. } | Self::InvalidConfig(_))
    }
}

fn format_searched(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "nothing".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
