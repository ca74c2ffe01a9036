//! Per-step CSV data collectors (§6).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use morota_common::{TaskId, TaskStatus};
use morota_sim::{TaskPlan, TaskStepRow};

use crate::error::IoError;

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Done => "done",
    }
}

#[derive(Debug, Serialize)]
struct TaskRowRecord {
    step: u64,
    task_id: u64,
    remaining_work: f64,
    total_work: f64,
    progress: f64,
    status: &'static str,
    finished_step: Option<u64>,
}

/// Appends one row per task per step to `{scenario_name}_{prefix}_tasks.csv`
/// (columns `step,task_id,remaining_work,total_work,progress,status,finished_step`).
#[derive(Debug)]
pub struct TaskProgressCollector {
    path: PathBuf,
    writer: Option<csv::Writer<std::fs::File>>,
}

impl TaskProgressCollector {
    /// Name a (not-yet-opened) collector writing into `output_dir`.
    pub fn new(output_dir: &Path, scenario_name: &str, prefix: &str) -> Self {
        let path = output_dir.join(format!("{scenario_name}_{prefix}_tasks.csv"));
        Self { path, writer: None }
    }

    /// Create the output file and write its header.
    pub fn open(&mut self) -> Result<(), IoError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| IoError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        let writer = csv::Writer::from_path(&self.path).map_err(|source| IoError::Csv {
            path: self.path.clone(),
            source,
        })?;
        self.writer = Some(writer);
        Ok(())
    }

    /// Append one row per task, keyed to the total work known at scenario
    /// load time (needed because [`TaskStepRow`] only carries the remaining
    /// figure, matching what the live scheduler emits per step).
    pub fn collect(&mut self, rows: &[TaskStepRow], total_work: impl Fn(TaskId) -> f64) -> Result<(), IoError> {
        let writer = self.writer.as_mut().expect("collect called before open");
        for row in rows {
            let total = total_work(row.task_id);
            let progress = if total > 0.0 {
                1.0 - row.remaining_work / total
            } else {
                1.0
            };
            let finished_step = matches!(row.status, TaskStatus::Done).then_some(row.step);
            writer
                .serialize(TaskRowRecord {
                    step: row.step,
                    task_id: row.task_id.0,
                    remaining_work: row.remaining_work,
                    total_work: total,
                    progress,
                    status: status_label(row.status),
                    finished_step,
                })
                .map_err(|source| IoError::Csv {
                    path: self.path.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Flush and close the underlying file.
    pub fn close(&mut self) -> Result<(), IoError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().map_err(|source| IoError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct ParetoRowRecord {
    event_id: u64,
    step: u64,
    rank: usize,
    objectives_json: String,
    violation: bool,
    worker_types_json: String,
    routes_json: String,
    repairs_json: String,
}

/// One Pareto-front member, as surfaced by the configuration planner for
/// logging purposes (§6, optional).
#[derive(Debug, Clone)]
pub struct ParetoEntry {
    /// Non-dominated-sort rank (0 = front).
    pub rank: usize,
    /// Objective vector.
    pub objectives: Vec<f64>,
    /// `true` if this individual violated a feasibility constraint.
    pub violation: bool,
    /// Desired robot type per worker slot, as type names (`None` = unused).
    pub worker_types: Vec<Option<String>>,
}

/// Logs every generation's Pareto front, plus the chosen individual, to
/// `{scenario_name}_{prefix}_pareto.csv` / `_chosen.csv` (§6, optional;
/// only meaningful when the configuration planner is NSGA-II-based).
#[derive(Debug)]
pub struct ParetoFrontCollector {
    scenario_name: String,
    prefix: String,
    output_dir: PathBuf,
    pareto_path: PathBuf,
    chosen_path: PathBuf,
    pareto_writer: Option<csv::Writer<std::fs::File>>,
    chosen_writer: Option<csv::Writer<std::fs::File>>,
    next_event_id: u64,
}

#[derive(Debug, Serialize)]
struct ChosenRowRecord {
    event_id: u64,
    step: u64,
    preference_json: String,
    objectives_json: String,
    violation: bool,
    worker_types_json: String,
    routes_json: String,
    repairs_json: String,
}

impl ParetoFrontCollector {
    /// Name a (not-yet-opened) collector writing into `output_dir`.
    pub fn new(output_dir: &Path, scenario_name: &str, prefix: &str) -> Self {
        Self {
            scenario_name: scenario_name.to_string(),
            prefix: prefix.to_string(),
            pareto_path: output_dir.join(format!("{scenario_name}_{prefix}_pareto.csv")),
            chosen_path: output_dir.join(format!("{scenario_name}_{prefix}_chosen.csv")),
            output_dir: output_dir.to_path_buf(),
            pareto_writer: None,
            chosen_writer: None,
            next_event_id: 0,
        }
    }

    /// Create both output files and write their headers.
    pub fn open(&mut self) -> Result<(), IoError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|source| IoError::Write {
            path: self.output_dir.clone(),
            source,
        })?;
        self.pareto_writer = Some(csv::Writer::from_path(&self.pareto_path).map_err(|source| IoError::Csv {
            path: self.pareto_path.clone(),
            source,
        })?);
        self.chosen_writer = Some(csv::Writer::from_path(&self.chosen_path).map_err(|source| IoError::Csv {
            path: self.chosen_path.clone(),
            source,
        })?);
        let _ = (&self.scenario_name, &self.prefix);
        Ok(())
    }

    /// Log one optimization event: the full Pareto front, the chosen
    /// individual's preference weights, and its realized plan.
    pub fn log_optimization(
        &mut self,
        step: u64,
        front: &[ParetoEntry],
        chosen: &ParetoEntry,
        preference: &[f64],
        plan: &TaskPlan,
    ) -> Result<(), IoError> {
        let event_id = self.next_event_id;
        self.next_event_id += 1;

        let routes: BTreeMap<u32, Vec<u64>> = plan
            .routes
            .iter()
            .map(|(w, route)| (w.0, route.iter().map(|t| t.0).collect()))
            .collect();
        let repairs: BTreeMap<u32, Vec<bool>> = plan.repairs.iter().map(|(w, flags)| (w.0, flags.clone())).collect();
        let routes_json = serde_json::to_string(&routes).unwrap_or_default();
        let repairs_json = serde_json::to_string(&repairs).unwrap_or_default();

        let writer = self.pareto_writer.as_mut().expect("log_optimization called before open");
        for entry in front {
            writer
                .serialize(ParetoRowRecord {
                    event_id,
                    step,
                    rank: entry.rank,
                    objectives_json: serde_json::to_string(&entry.objectives).unwrap_or_default(),
                    violation: entry.violation,
                    worker_types_json: serde_json::to_string(&entry.worker_types).unwrap_or_default(),
                    routes_json: routes_json.clone(),
                    repairs_json: repairs_json.clone(),
                })
                .map_err(|source| IoError::Csv {
                    path: self.pareto_path.clone(),
                    source,
                })?;
        }

        let chosen_writer = self.chosen_writer.as_mut().expect("log_optimization called before open");
        chosen_writer
            .serialize(ChosenRowRecord {
                event_id,
                step,
                preference_json: serde_json::to_string(preference).unwrap_or_default(),
                objectives_json: serde_json::to_string(&chosen.objectives).unwrap_or_default(),
                violation: chosen.violation,
                worker_types_json: serde_json::to_string(&chosen.worker_types).unwrap_or_default(),
                routes_json,
                repairs_json,
            })
            .map_err(|source| IoError::Csv {
                path: self.chosen_path.clone(),
                source,
            })?;
        Ok(())
    }

    /// Flush and close both underlying files.
    pub fn close(&mut self) -> Result<(), IoError> {
        if let Some(mut writer) = self.pareto_writer.take() {
            writer.flush().map_err(|source| IoError::Write {
                path: self.pareto_path.clone(),
                source,
            })?;
        }
        if let Some(mut writer) = self.chosen_writer.take() {
            writer.flush().map_err(|source| IoError::Write {
                path: self.chosen_path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}
