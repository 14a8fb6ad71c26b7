//! # Optimizer Module
//!
//! Modulo che separa le responsabilità della ricerca a dimensione target:
//! - `size_targeting`: loop di ricerca e risoluzione dell'artifact finale
//! - `candidate`: tracking del miglior risultato e cancellazione dei superati
//! - `report`: tentativi per iterazione e risultato restituito al chiamante

pub mod candidate;
pub mod report;
pub mod size_targeting;

pub use candidate::BestCandidate;
pub use report::{CompressionAttempt, OptimizationReport, Resolution};
pub use size_targeting::SizeTargetingOptimizer;
