use std::path::PathBuf;

use thiserror::Error;

use morota_common::MorotaError;

/// Fatal configuration/asset-loading errors (§7 "Configuration errors"):
/// missing key, wrong shape, unknown type in `type_priority`, nonexistent
/// asset path. Every variant identifies the offending file.
#[derive(Debug, Error)]
pub enum IoError {
    /// A scenario or `robot_setup` document is missing a required key.
    #[error("{}: missing key '{key}'", path.display())]
    MissingKey {
        /// File the key was expected in.
        path: PathBuf,
        /// The missing key, dotted for nested fields (e.g. `sim.max_steps`).
        key: &'static str,
    },
    /// A `class` field named a component implementation with no registry entry.
    #[error("{}: unknown {component} class '{class}'", path.display())]
    UnknownComponentClass {
        /// File the reference appeared in.
        path: PathBuf,
        /// Which component slot (`failure_model`, `configuration_planner`, `task_allocator`).
        component: &'static str,
        /// The unresolved class name.
        class: String,
    },
    /// An asset path named in the scenario document does not exist.
    #[error("{}: asset not found", path.display())]
    AssetNotFound {
        /// The missing path.
        path: PathBuf,
    },
    /// Failed to read a file from disk.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse a scenario or `robot_setup` YAML document.
    #[error("failed to parse {}: {source}", path.display())]
    Yaml {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: serde_yaml::Error,
    },
    /// Failed to parse `modules.csv` or `tasks.csv`.
    #[error("failed to parse {}: {source}", path.display())]
    Csv {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying parser error.
        #[source]
        source: csv::Error,
    },
    /// Failed to write a data-collector CSV row.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// The output file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A depot/module inventory invariant was violated while assembling the
    /// initial world state (e.g. duplicate module id across `modules.csv`).
    #[error("inventory invariant violated while loading {}: {source}", path.display())]
    Inventory {
        /// The asset file responsible.
        path: PathBuf,
        /// Underlying invariant violation.
        #[source]
        source: MorotaError,
    },
    /// `type_priority` and `robot_types` don't name exactly the same set of
    /// robot types (§6: "Every key in `type_priority` must appear in
    /// `robot_types`").
    #[error("{}: {detail}", path.display())]
    TypePriorityMismatch {
        /// The `robot_setup` file responsible.
        path: PathBuf,
        /// Human-readable description of the mismatch.
        detail: String,
    },
}
