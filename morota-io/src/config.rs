//! The top-level scenario document and the static registries that resolve
//! a `class` field to a concrete policy implementation (§6, §9 "Dynamic
//! dispatch for policies").

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;

use morota_common::Position;
use morota_opt::{ConfigPlannerParams, GaConfigPlanner, GaTaskAllocator, TaskAllocatorParams};
use morota_sim::{ConfigPlanner, FailureModel, TaskAllocator, WeibullFailureModel};

use crate::error::IoError;

/// One `{module, class, params}` entry naming a pluggable component (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentConfig {
    /// Which source module the class is resolved from (informational; the
    /// registries below key purely on `class`).
    pub module: String,
    /// Name of the concrete implementation.
    pub class: String,
    /// Implementation-specific parameter bag, deserialized once the class
    /// is resolved.
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Deserialize)]
struct SpaceConfig {
    width: f64,
    height: f64,
}

/// Scalar simulation tunables (§6 `sim`).
#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    /// Hard step budget; the run terminates once reached even if tasks remain.
    pub max_steps: u64,
    /// Seconds consumed by a full reconstruction round trip.
    pub reconstruct_duration: f64,
    /// Seconds of wall-clock time advanced per step.
    pub time_step: f64,
    /// Upper bound on the number of worker slots the planner may use.
    #[serde(rename = "H_limit")]
    pub num_workers_max: usize,
    /// Run the configuration planner every this many steps.
    #[serde(default = "default_interval")]
    pub planner_interval: u64,
    /// Run the task allocator every this many steps.
    #[serde(default = "default_interval")]
    pub allocator_interval: u64,
}

fn default_interval() -> u64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct ModuleDepotConfig {
    position: [f64; 2],
}

/// The fully parsed scenario document (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    /// Human-readable name, used as a file-name prefix for CSV output.
    pub scenario_name: String,
    /// Directory data collectors write their CSVs into.
    pub output_dir: PathBuf,
    space: SpaceConfig,
    /// Scalar simulation tunables.
    pub sim: SimConfig,
    module_depot: ModuleDepotConfig,
    /// Fatigue/failure policy descriptor.
    pub failure_model: ComponentConfig,
    /// Configuration planner descriptor.
    pub configuration_planner: ComponentConfig,
    /// Task allocator descriptor.
    pub task_allocator: ComponentConfig,
    /// Path to `modules.csv`, relative to the scenario document unless absolute.
    pub modules: PathBuf,
    /// Path to the `robot_setup` YAML document.
    pub robot_setup: PathBuf,
    /// Path to `tasks.csv`.
    pub tasks: PathBuf,
}

impl ScenarioConfig {
    /// Width/height of the simulated space.
    pub fn space_size(&self) -> (f64, f64) {
        (self.space.width, self.space.height)
    }

    /// Fixed depot location workers travel to for reconstruction.
    pub fn depot_position(&self) -> Position {
        Position::new(self.module_depot.position[0], self.module_depot.position[1])
    }
}

/// Load and parse a scenario document. Paths inside it are resolved
/// relative to `path`'s parent directory.
pub fn load_scenario(path: &Path) -> Result<ScenarioConfig, IoError> {
    if !path.exists() {
        return Err(IoError::AssetNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut doc: ScenarioConfig = serde_yaml::from_str(&text).map_err(|source| IoError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    doc.modules = resolve_relative(base, &doc.modules);
    doc.robot_setup = resolve_relative(base, &doc.robot_setup);
    doc.tasks = resolve_relative(base, &doc.tasks);
    Ok(doc)
}

fn resolve_relative(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn deserialize_params<T: for<'de> Deserialize<'de>>(
    scenario_path: &Path,
    component: &ComponentConfig,
) -> Result<T, IoError> {
    serde_yaml::from_value(component.params.clone()).map_err(|source| IoError::Yaml {
        path: scenario_path.to_path_buf(),
        source,
    })
}

/// Resolve `failure_model.class` into a concrete [`FailureModel`].
pub fn build_failure_model(
    scenario_path: &Path,
    component: &ComponentConfig,
) -> Result<Box<dyn FailureModel>, IoError> {
    match component.class.as_str() {
        "Weibull" | "WeibullFailureModel" => {
            let params: WeibullFailureModel = deserialize_params(scenario_path, component)?;
            Ok(Box::new(params))
        }
        other => Err(IoError::UnknownComponentClass {
            path: scenario_path.to_path_buf(),
            component: "failure_model",
            class: other.to_owned(),
        }),
    }
}

/// Resolve `configuration_planner.class` into a concrete [`ConfigPlanner`].
pub fn build_config_planner(
    scenario_path: &Path,
    component: &ComponentConfig,
) -> Result<Box<dyn ConfigPlanner>, IoError> {
    match component.class.as_str() {
        "GaConfigPlanner" | "Ga" | "NSGA2" => {
            let params: ConfigPlannerParams = deserialize_params(scenario_path, component)?;
            Ok(Box::new(GaConfigPlanner::new(params)))
        }
        other => Err(IoError::UnknownComponentClass {
            path: scenario_path.to_path_buf(),
            component: "configuration_planner",
            class: other.to_owned(),
        }),
    }
}

/// Resolve `task_allocator.class` into a concrete [`TaskAllocator`].
pub fn build_task_allocator(
    scenario_path: &Path,
    component: &ComponentConfig,
) -> Result<Box<dyn TaskAllocator>, IoError> {
    match component.class.as_str() {
        "GaTaskAllocator" | "Ga" => {
            let params: TaskAllocatorParams = deserialize_params(scenario_path, component)?;
            Ok(Box::new(GaTaskAllocator::new(params)))
        }
        other => Err(IoError::UnknownComponentClass {
            path: scenario_path.to_path_buf(),
            component: "task_allocator",
            class: other.to_owned(),
        }),
    }
}
