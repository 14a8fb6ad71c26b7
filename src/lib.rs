//! # PNG Size Optimizer Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!   (ad esempio l'assemblatore del documento SVG, che riceve path e dimensioni)
//!
//! ## Architettura dei moduli:
//! - `config`: Parametri della ricerca (target, margine, finestre di qualità)
//! - `error`: Tipi di errore custom
//! - `tool_resolver`: Ricerca di pngquant (path configurato, `TOOLS_DIR`, `PATH`)
//! - `compressor`: Invocazione di pngquant con timeout
//! - `file_manager`: Path finali, file temporanei, discovery PNG
//! - `optimizer`: Loop iterativo a dimensione target
//! - `progress`: Progress bar e statistiche batch
//! - `json_output`: Messaggi JSON per consumatori programmatici
//!
//! ## Utilizzo:
//! ```ignore
//! use png_size_optimizer::{OptimizationTarget, SizeTargetingOptimizer, ToolPathResolver};
//!
//! let optimizer = SizeTargetingOptimizer::with_pngquant(OptimizationTarget::default())?;
//! let report = optimizer.optimize(&input, &output_dir, &ToolPathResolver::new()).await?;
//! let (width, height) = report.dimensions()?;
//! ```

pub mod compressor;
pub mod config;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod optimizer;
pub mod progress;
pub mod tool_resolver;

pub use compressor::{CompressionOutcome, Compressor, PngquantCompressor};
pub use config::{OptimizationTarget, QualityWindow};
pub use error::OptimizationError;
pub use optimizer::{OptimizationReport, Resolution, SizeTargetingOptimizer};
pub use tool_resolver::{ToolLocator, ToolPathResolver};
