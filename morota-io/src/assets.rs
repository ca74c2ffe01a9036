//! Loaders for the three asset files a scenario document names:
//! `modules.csv`, `tasks.csv`, and the `robot_setup` YAML document (§6).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use morota_common::{Module, ModuleId, ModuleType, Position, RobotTypeName, RobotTypeSpec, Task, TaskId};

use crate::error::IoError;

#[derive(Debug, Deserialize)]
struct ModuleRow {
    id: u64,
    x: f64,
    y: f64,
    #[serde(rename = "type")]
    module_type: String,
    #[serde(default)]
    h: f64,
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    id: u64,
    x: f64,
    y: f64,
    total_work: f64,
    remaining_work: Option<f64>,
}

fn read_to_string(path: &Path) -> Result<String, IoError> {
    if !path.exists() {
        return Err(IoError::AssetNotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Load `modules.csv` (columns `id, x, y, type, h`, header required; `h`
/// defaults to `0`) into the depot's initial inventory.
pub fn load_modules_csv(path: &Path) -> Result<Vec<Module>, IoError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let mut modules = Vec::new();
    for row in reader.deserialize::<ModuleRow>() {
        let row = row.map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let mut module = Module::new(
            ModuleId(row.id),
            ModuleType::from(row.module_type),
            Position::new(row.x, row.y),
        );
        module.fatigue = row.h;
        modules.push(module);
    }
    Ok(modules)
}

/// Load `tasks.csv` (columns `id, x, y, total_work, remaining_work`, header
/// required; `remaining_work` defaults to `total_work`).
pub fn load_tasks_csv(path: &Path) -> Result<Vec<Task>, IoError> {
    let mut reader = csv::Reader::from_path(path).map_err(|source| IoError::Csv {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tasks = Vec::new();
    for row in reader.deserialize::<TaskRow>() {
        let row = row.map_err(|source| IoError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let remaining = row.remaining_work.unwrap_or(row.total_work);
        tasks.push(Task::new(
            TaskId(row.id),
            Position::new(row.x, row.y),
            row.total_work,
            remaining,
        ));
    }
    Ok(tasks)
}

#[derive(Debug, Deserialize)]
struct RobotSetupDoc {
    modules: Vec<String>,
    robot_types: HashMap<String, RobotTypeDoc>,
    type_priority: HashMap<String, i64>,
}

#[derive(Debug, Deserialize)]
struct RobotTypeDoc {
    required_modules: HashMap<String, u32>,
    performance: PerformanceDoc,
}

#[derive(Debug, Deserialize)]
struct PerformanceDoc {
    speed: f64,
    throughput: f64,
}

/// The `robot_setup` document, fully resolved: the declared module type
/// vocabulary and the robot type catalog with `type_priority` folded in.
#[derive(Debug, Clone)]
pub struct RobotSetup {
    /// Module type names declared usable by this scenario.
    pub modules: Vec<ModuleType>,
    /// Robot type catalog, priority-annotated.
    pub robot_types: Vec<RobotTypeSpec>,
}

/// Load and validate a `robot_setup` YAML document (§6).
pub fn load_robot_setup(path: &Path) -> Result<RobotSetup, IoError> {
    let text = read_to_string(path)?;
    let doc: RobotSetupDoc = serde_yaml::from_str(&text).map_err(|source| IoError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    let type_names: std::collections::HashSet<&String> = doc.robot_types.keys().collect();
    let priority_names: std::collections::HashSet<&String> = doc.type_priority.keys().collect();
    if type_names != priority_names {
        let missing_priority: Vec<&String> = type_names.difference(&priority_names).copied().collect();
        let unknown_types: Vec<&String> = priority_names.difference(&type_names).copied().collect();
        return Err(IoError::TypePriorityMismatch {
            path: path.to_path_buf(),
            detail: format!(
                "robot_types without a type_priority entry: {missing_priority:?}; \
                 type_priority entries with no matching robot_type: {unknown_types:?}"
            ),
        });
    }

    let robot_types = doc
        .robot_types
        .into_iter()
        .map(|(name, spec)| RobotTypeSpec {
            name: RobotTypeName::from(name.as_str()),
            required_modules: spec
                .required_modules
                .into_iter()
                .map(|(ty, n)| (ModuleType::from(ty), n))
                .collect(),
            speed: spec.performance.speed,
            throughput: spec.performance.throughput,
            priority: doc.type_priority[&name],
        })
        .collect();

    Ok(RobotSetup {
        modules: doc.modules.into_iter().map(ModuleType::from).collect(),
        robot_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn modules_csv_defaults_missing_h_to_zero() {
        let file = write_tmp("id,x,y,type\n1,0,0,Body\n", ".csv");
        let modules = load_modules_csv(file.path()).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].fatigue, 0.0);
    }

    #[test]
    fn tasks_csv_defaults_remaining_to_total() {
        let file = write_tmp("id,x,y,total_work\n1,0,0,10\n", ".csv");
        let tasks = load_tasks_csv(file.path()).unwrap();
        assert_eq!(tasks[0].remaining_work, 10.0);
    }

    #[test]
    fn robot_setup_rejects_priority_mismatch() {
        let yaml = "modules: [Body]\nrobot_types:\n  A:\n    required_modules: {Body: 1}\n    performance: {speed: 1, throughput: 1}\ntype_priority:\n  B: 0\n";
        let file = write_tmp(yaml, ".yaml");
        let result = load_robot_setup(file.path());
        assert!(matches!(result, Err(IoError::TypePriorityMismatch { .. })));
    }

    #[test]
    fn robot_setup_resolves_priority_onto_spec() {
        let yaml = "modules: [Body]\nrobot_types:\n  A:\n    required_modules: {Body: 1}\n    performance: {speed: 2, throughput: 3}\ntype_priority:\n  A: 5\n";
        let file = write_tmp(yaml, ".yaml");
        let setup = load_robot_setup(file.path()).unwrap();
        assert_eq!(setup.robot_types[0].priority, 5);
    }
}
