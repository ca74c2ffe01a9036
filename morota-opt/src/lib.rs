//! # MoRoTA optimization layer
//!
//! The two search policies injected into `morota_sim::Scheduler` —
//! [`config_planner::GaConfigPlanner`] (NSGA-II over worker-type vectors) and
//! [`task_allocator::GaTaskAllocator`] (a single-objective GA over task
//! routes) — plus the [`makespan::expected_makespan`] evaluator the latter
//! optimizes against. [`ga`] holds the selection/ranking primitives both
//! searches share.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod ga;
mod config_planner;
mod makespan;
mod task_allocator;

pub use config_planner::{ConfigPlannerParams, CrossoverKind, GaConfigPlanner};
pub use makespan::{expected_makespan, poisson_binomial};
pub use task_allocator::{GaTaskAllocator, MutationWeights, TaskAllocatorParams};
