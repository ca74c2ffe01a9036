use thiserror::Error;

use crate::{ModuleId, ModuleType};

/// Fatal errors shared across the simulation, optimizer, and I/O crates.
///
/// These always indicate a programmer error or a malformed input file —
/// never a condition the simulation is expected to recover from at
/// runtime. Soft conditions (depot coverage misses, zero-capability
/// motion, infeasible GA individuals) are not represented here; they are
/// absorbed or logged at the call site instead.
#[derive(Debug, Error)]
pub enum MorotaError {
    /// Two modules were loaded (or returned to the depot) sharing the same id.
    #[error("duplicate module id {0:?}: every module id must be unique")]
    DuplicateModuleId(ModuleId),
    /// A `type_priority` entry names a type missing from `robot_types`.
    #[error("type_priority references unknown robot type {0:?}")]
    UnknownRobotType(String),
    /// A module referenced a type not declared in the scenario's module list.
    #[error("module references unknown module type {0:?}")]
    UnknownModuleType(ModuleType),
    /// A GA/NSGA-II precondition was violated (mismatched parent shapes, empty front, ...).
    #[error("optimizer precondition violated: {0}")]
    OptimizerPrecondition(String),
}
