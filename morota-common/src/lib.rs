//! Shared value types for the MoRoTA fleet simulator.
//!
//! This crate holds the plain data model described by the simulation's
//! specification: [`Module`], [`Task`], [`Position`], and [`RobotTypeSpec`].
//! None of these types carry simulation behavior (stepping, depot
//! arithmetic, optimization) — that lives in `morota-sim` and `morota-opt`,
//! which both depend on this crate for their vocabulary.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

mod error;
mod module;
mod position;
mod robot_type;
mod task;

pub use error::MorotaError;
pub use module::{Module, ModuleId, ModuleState, ModuleType};
pub use position::{Position, EPS};
pub use robot_type::{resolve_realized_type, RobotTypeName, RobotTypeSpec};
pub use task::{Task, TaskId, TaskStatus};
