//! # MoRoTA simulation core
//!
//! The discrete-time agent simulator: a [`Depot`] holding the shared module
//! inventory, a [`FailureModel`] trait mapping fatigue to failure
//! probability, [`Worker`] agents that move/work/reconstruct/fail, and the
//! [`Scheduler`] that steps the whole fleet forward in lockstep.
//!
//! This crate knows nothing about how workers decide what to build or what
//! to do next — those policies (`ConfigPlanner`, `TaskAllocator`) live in
//! `morota-opt` and are injected into the [`Scheduler`] as trait objects.

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

mod depot;
mod failure_model;
mod scheduler;
mod worker;

pub use depot::Depot;
pub use failure_model::{Action, FailureModel, WeibullFailureModel};
pub use scheduler::{ConfigPlanner, Makespan, Scheduler, TaskAllocator, TaskPlan, TaskStepRow};
pub use worker::{Worker, WorkerId, WorkerMode};
