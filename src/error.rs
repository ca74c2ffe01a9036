use std::path::PathBuf;

use thiserror::Error;

use morota_common::MorotaError;
use morota_io::IoError;

/// Top-level error surfaced by `main`. Every fatal condition in the
/// simulation pipeline (§7 "Configuration errors", "Inventory invariant
/// violations", "Optimizer preconditions") funnels into one of these
/// variants and is printed with `Display` before the process exits
/// non-zero.
#[derive(Debug, Error)]
pub enum AppError {
    /// Failed to load the scenario document or one of its assets.
    #[error(transparent)]
    Io(#[from] IoError),
    /// A domain invariant was violated while assembling the initial state.
    #[error(transparent)]
    Model(#[from] MorotaError),
    /// The output directory could not be created.
    #[error("failed to create output directory {}: {source}", path.display())]
    OutputDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
