//! # Best Candidate Tracking
//!
//! Running state of the search: the smallest result seen so far, or the
//! untouched original when no attempt has beaten it yet.

use std::path::Path;
use tempfile::TempPath;
use tracing::{debug, warn};

/// Smallest result seen so far
#[derive(Debug)]
pub enum BestCandidate {
    /// No compressed result has beaten the original yet
    Original { size: u64 },
    /// A compressed file owned by the optimizer until promotion or deletion
    Compressed { file: TempPath, size: u64, iteration: u32 },
}

impl BestCandidate {
    pub fn original(size: u64) -> Self {
        Self::Original { size }
    }

    pub fn size(&self) -> u64 {
        match self {
            Self::Original { size } | Self::Compressed { size, .. } => *size,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Original { .. } => None,
            Self::Compressed { file, .. } => Some(&**file),
        }
    }

    /// Offer a fresh compressed result.
    ///
    /// Accepted only when strictly smaller than the current best; the superseded
    /// file (or the rejected one) is deleted before returning.
    pub fn offer(&mut self, file: TempPath, size: u64, iteration: u32) -> bool {
        if size >= self.size() {
            debug!(
                "Iteration {} result ({} bytes) does not beat current best ({} bytes)",
                iteration + 1,
                size,
                self.size()
            );
            discard(file);
            return false;
        }

        let previous = std::mem::replace(self, Self::Compressed { file, size, iteration });
        if let Self::Compressed { file: superseded, .. } = previous {
            discard(superseded);
        }
        true
    }

    /// Drop any compressed file, reverting to the original
    pub fn discard_compressed(&mut self, original_size: u64) {
        let previous = std::mem::replace(self, Self::Original { size: original_size });
        if let Self::Compressed { file, .. } = previous {
            discard(file);
        }
    }
}

/// Delete a temporary file, logging instead of failing
pub(crate) fn discard(file: TempPath) {
    let path = file.to_path_buf();
    if let Err(e) = file.close() {
        warn!("Failed to remove temporary file {}: {}", path.display(), e);
    } else {
        debug!("Removed temporary file {}", path.display());
    }
}
