//! # MoRoTA I/O layer
//!
//! Scenario/`robot_setup` document loading ([`config`]), CSV asset
//! ingestion ([`assets`]), and per-step data collectors ([`collector`]).
//! Every fallible entry point returns [`IoError`], identifying the
//! offending file (§7 "Configuration errors").

#![deny(missing_docs, missing_debug_implementations, rust_2018_idioms)]

mod assets;
mod collector;
mod config;
mod error;

pub use assets::{load_modules_csv, load_robot_setup, load_tasks_csv, RobotSetup};
pub use collector::{ParetoEntry, ParetoFrontCollector, TaskProgressCollector};
pub use config::{
    build_config_planner, build_failure_model, build_task_allocator, ComponentConfig, ScenarioConfig, SimConfig,
    load_scenario,
};
pub use error::IoError;
