use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use morota_common::{Module, Position, RobotTypeName, RobotTypeSpec, Task, TaskId, TaskStatus};

use crate::depot::Depot;
use crate::failure_model::FailureModel;
use crate::worker::{Worker, WorkerId, WorkerMode};

/// A task allocator's output: per-worker routes and repair schedules (§4.6).
#[derive(Debug, Clone, Default)]
pub struct TaskPlan {
    /// `routes[w]` is the ordered list of task ids assigned to worker `w`.
    /// The union across all workers is exactly the set of non-done tasks,
    /// each appearing once.
    pub routes: HashMap<WorkerId, Vec<TaskId>>,
    /// `repairs[w][l]` is true iff worker `w` should reconstruct before
    /// starting the `l`-th task in its route.
    pub repairs: HashMap<WorkerId, Vec<bool>>,
}

/// The makespan of a completed (or terminated) run: the last finish step
/// times `time_step`, or `max_steps * time_step` if any task remains (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Makespan(pub f64);

/// Searches for a configuration plan: a desired robot type (or `None` for
/// "unused") per worker slot, given the current world state (§4.5).
///
/// Implementors only *search*; enacting the returned plan against the depot
/// and worker slots is the scheduler's job (the enaction rules in §4.5's
/// table are mechanical, not optimizer-specific).
pub trait ConfigPlanner: Debug {
    /// Produce a vector of length `num_workers_max`, one desired type per slot.
    fn plan(
        &mut self,
        workers: &[Worker],
        depot: &Depot,
        robot_types: &[RobotTypeSpec],
        num_workers_max: usize,
        rng: &mut StdRng,
    ) -> Vec<Option<RobotTypeName>>;
}

/// Searches for a task-order plan (§4.6). Like [`ConfigPlanner`], only the
/// search is optimizer-specific; per-step dispatch of the resulting plan is
/// mechanical and lives on [`Scheduler`].
pub trait TaskAllocator: Debug {
    /// Produce routes and repair flags for the current worker/task state.
    /// `reconstruct_duration` and `depot_position` are passed through so the
    /// allocator's expected-makespan objective (§4.7) can cost synthetic
    /// reconstruction segments the same way the live scheduler would.
    #[allow(clippy::too_many_arguments)]
    fn plan(
        &mut self,
        workers: &[Worker],
        tasks: &[Task],
        depot: &Depot,
        robot_types: &[RobotTypeSpec],
        failure_model: &dyn FailureModel,
        reconstruct_duration: f64,
        depot_position: Position,
        rng: &mut StdRng,
    ) -> TaskPlan;
}

/// One row of the per-task, per-step data collector output (§4.1 step 6).
#[derive(Debug, Clone)]
pub struct TaskStepRow {
    /// The step this row describes.
    pub step: u64,
    /// The task this row describes.
    pub task_id: TaskId,
    /// Remaining work after this step's finalization.
    pub remaining_work: f64,
    /// Status after this step's finalization.
    pub status: TaskStatus,
}

/// Owns the full simulation state and drives discrete time forward one
/// `time_step` at a time, per the six-step sequence in §4.1.
pub struct Scheduler {
    /// Current worker slots, indexed by `WorkerId`.
    pub workers: Vec<Worker>,
    /// Current tasks.
    pub tasks: Vec<Task>,
    /// The shared module inventory.
    pub depot: Depot,
    /// Declared robot types available to the planner and allocator.
    pub robot_types: Vec<RobotTypeSpec>,
    /// Fatigue/failure model shared by every worker's modules.
    pub failure_model: Box<dyn FailureModel>,
    /// The model's single seedable RNG (§5: "all pseudo-randomness must flow
    /// from a single seedable generator owned by the model").
    pub rng: StdRng,
    /// Seconds of wall-clock time advanced per step.
    pub time_step: f64,
    /// Run the configuration planner every this many steps.
    pub planner_interval: u64,
    /// Run the task allocator every this many steps.
    pub allocator_interval: u64,
    /// Terminate once `step >= max_steps` even if tasks remain.
    pub max_steps: u64,
    /// Upper bound on the number of worker slots the planner may use.
    pub num_workers_max: usize,
    /// Duration consumed by a reconstruction round trip once at the depot.
    pub reconstruct_duration: f64,
    /// Fixed depot location workers travel to for reconstruction.
    pub depot_position: Position,

    config_planner: Box<dyn ConfigPlanner>,
    task_allocator: Box<dyn TaskAllocator>,
    current_plan: Option<TaskPlan>,
    step: u64,
    /// Modules removed from a worker by a failure roll, kept around (rather
    /// than dropped) so the module-conservation invariant (§8 invariant 1)
    /// holds against `depot.count_by_type()` + live workers' modules + this.
    failed_modules: Vec<Module>,
}

impl Scheduler {
    /// Construct a scheduler ready to run from step 1.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workers: Vec<Worker>,
        tasks: Vec<Task>,
        depot: Depot,
        robot_types: Vec<RobotTypeSpec>,
        failure_model: Box<dyn FailureModel>,
        rng: StdRng,
        time_step: f64,
        planner_interval: u64,
        allocator_interval: u64,
        max_steps: u64,
        num_workers_max: usize,
        reconstruct_duration: f64,
        depot_position: Position,
        config_planner: Box<dyn ConfigPlanner>,
        task_allocator: Box<dyn TaskAllocator>,
    ) -> Self {
        Scheduler {
            workers,
            tasks,
            depot,
            robot_types,
            failure_model,
            rng,
            time_step,
            planner_interval,
            allocator_interval,
            max_steps,
            num_workers_max,
            reconstruct_duration,
            depot_position,
            config_planner,
            task_allocator,
            current_plan: None,
            step: 0,
            failed_modules: Vec::new(),
        }
    }

    /// Modules permanently removed from service by a failure roll, grouped
    /// by type. Used with `depot.count_by_type()` and the live workers'
    /// modules to verify the module-conservation invariant (§8 invariant 1).
    pub fn failed_module_counts(&self) -> HashMap<morota_common::ModuleType, u32> {
        let mut counts = HashMap::new();
        for m in &self.failed_modules {
            *counts.entry(m.module_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// The step counter, incremented once per call to [`Scheduler::step`].
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// `true` once every task has reached `Done`.
    pub fn all_tasks_done(&self) -> bool {
        self.tasks.iter().all(|t| t.is_done())
    }

    /// `true` once the run should stop: all tasks done, or the step budget
    /// is exhausted (§4.1 "Termination").
    pub fn is_terminated(&self) -> bool {
        self.all_tasks_done() || self.step >= self.max_steps
    }

    /// The makespan of the run so far: the last finish step times
    /// `time_step`, or `max_steps * time_step` if any task remains.
    pub fn makespan(&self) -> Makespan {
        if self.all_tasks_done() {
            let last = self.tasks.iter().filter_map(|t| t.finished_step).max().unwrap_or(0);
            Makespan(last as f64 * self.time_step)
        } else {
            Makespan(self.max_steps as f64 * self.time_step)
        }
    }

    /// Advance the simulation by one `time_step`, running the six-step
    /// sequence of §4.1, and return one data-collector row per task.
    pub fn step(&mut self) -> Vec<TaskStepRow> {
        self.step += 1;
        tracing::trace!(step = self.step, workers = self.workers.len(), "stepping simulation");

        // 1. Configuration planner, if due.
        if (self.step - 1) % self.planner_interval.max(1) == 0 {
            let desired = self.config_planner.plan(
                &self.workers,
                &self.depot,
                &self.robot_types,
                self.num_workers_max,
                &mut self.rng,
            );
            self.enact_config_plan(desired);
        }

        // 2. Reset every task's per-step scratch.
        for task in &mut self.tasks {
            task.reset_step_scratch();
        }

        // 3. Task allocator, if due; otherwise reuse the last plan.
        if (self.step - 1) % self.allocator_interval.max(1) == 0 {
            let plan = self.task_allocator.plan(
                &self.workers,
                &self.tasks,
                &self.depot,
                &self.robot_types,
                self.failure_model.as_ref(),
                self.reconstruct_duration,
                self.depot_position,
                &mut self.rng,
            );
            self.current_plan = Some(plan);
        }
        self.dispatch();

        // 4. Step every agent once in a shuffled order.
        let mut order: Vec<usize> = (0..self.workers.len()).collect();
        order.shuffle(&mut self.rng);
        for idx in order {
            self.step_worker(idx);
        }

        // 5. Finalize every task.
        for task in &mut self.tasks {
            task.finalize_step(self.step);
        }

        // 6. Emit one row per task.
        self.tasks
            .iter()
            .map(|t| TaskStepRow {
                step: self.step,
                task_id: t.id,
                remaining_work: t.remaining_work,
                status: t.status,
            })
            .collect()
    }

    /// Ensure `self.workers` has exactly `num_workers_max` slots, appending
    /// fresh idle slots at the depot as needed.
    fn ensure_slots(&mut self, count: usize) {
        while self.workers.len() < count {
            let id = WorkerId(self.workers.len() as u32);
            self.workers.push(Worker::new_idle(id, self.depot_position));
        }
    }

    /// Enact a configuration plan per §4.5's enaction table.
    fn enact_config_plan(&mut self, desired: Vec<Option<RobotTypeName>>) {
        self.ensure_slots(desired.len());
        for (i, want) in desired.into_iter().enumerate() {
            let alive = self.workers[i].is_alive();
            match want {
                Some(type_name) => {
                    if alive {
                        self.workers[i].declared_type = Some(type_name);
                    } else {
                        let spec = self.robot_types.iter().find(|s| s.name == type_name).cloned();
                        if let Some(spec) = spec {
                            if let Some(granted) = self.depot.take(&spec.required_modules) {
                                for m in granted {
                                    self.workers[i].modules.insert(m.id, m);
                                }
                                self.workers[i].declared_type = Some(type_name);
                                self.workers[i].position = self.depot_position;
                                self.workers[i].mode = WorkerMode::Idle;
                                self.workers[i].last_repair_index = None;
                            }
                            // Infeasible at enaction: skip this slot for this replan (§4.5).
                        }
                    }
                }
                None => {
                    if alive {
                        let returning: Vec<Module> =
                            self.workers[i].modules.drain().map(|(_, m)| m).collect();
                        self.depot
                            .put(returning)
                            .expect("modules returned from a live worker have unique ids");
                    }
                    self.workers[i].declared_type = None;
                    self.workers[i].mode = WorkerMode::Idle;
                    self.workers[i].last_repair_index = None;
                }
            }
        }
    }

    /// Apply the current task plan's dispatch rules (§4.6's "Per-step
    /// dispatch") to every worker not already reconstructing.
    fn dispatch(&mut self) {
        let Some(plan) = self.current_plan.clone() else {
            return;
        };
        let done_ids: HashSet<TaskId> = self.tasks.iter().filter(|t| t.is_done()).map(|t| t.id).collect();
        let specs = self.robot_types.clone();

        for worker in &mut self.workers {
            if matches!(worker.mode, WorkerMode::GoReconstruction | WorkerMode::Reconstruction { .. }) {
                continue;
            }

            let route = plan.routes.get(&worker.id).cloned().unwrap_or_default();
            let current_work = route.iter().position(|tid| !done_ids.contains(tid)).unwrap_or(route.len());

            let declared_spec = worker
                .declared_type
                .as_ref()
                .and_then(|name| specs.iter().find(|s| &s.name == name));
            let deficit = declared_spec
                .map(|s| s.deficit(&worker.module_type_counts()))
                .unwrap_or_default();
            let depot_counts = self.depot.count_by_type();
            let depot_can_cover = !deficit.is_empty()
                && deficit.iter().all(|(ty, need)| depot_counts.get(ty).copied().unwrap_or(0) >= *need);

            let planned_repair = current_work < route.len()
                && plan
                    .repairs
                    .get(&worker.id)
                    .and_then(|flags| flags.get(current_work))
                    .copied()
                    .unwrap_or(false);
            if planned_repair && !depot_can_cover && worker.last_repair_index != Some(current_work) {
                tracing::warn!(worker = worker.id.0, "planned repair deferred: depot cannot cover deficit");
            }
            let should_trigger_planned =
                planned_repair && depot_can_cover && worker.last_repair_index != Some(current_work);
            // Safety fallback (§4.6): a worker with an off-plan deficit the depot
            // can cover is allowed to preempt to reconstruction regardless of route.
            let should_trigger_safety = !should_trigger_planned && depot_can_cover;

            if should_trigger_planned {
                worker.last_repair_index = Some(current_work);
                worker.mode = WorkerMode::GoReconstruction;
            } else if should_trigger_safety {
                worker.mode = WorkerMode::GoReconstruction;
            } else if current_work >= route.len() {
                worker.mode = WorkerMode::Idle;
            } else {
                worker.mode = WorkerMode::Work {
                    task: route[current_work],
                    arrived: false,
                };
            }
        }
    }

    /// Step a single worker through at most one logical phase (§4.2).
    fn step_worker(&mut self, idx: usize) {
        let dt = self.time_step;
        let depot_position = self.depot_position;
        let reconstruct_duration = self.reconstruct_duration;
        let specs = self.robot_types.clone();

        // Destructure into disjoint field borrows so a worker and a task can
        // be mutated in the same phase without aliasing `self` as a whole.
        let Scheduler {
            workers,
            tasks,
            depot,
            failure_model,
            rng,
            failed_modules,
            ..
        } = self;
        let failure_model = failure_model.as_ref();

        let mode = workers[idx].mode.clone();
        match mode {
            WorkerMode::Idle => {}
            WorkerMode::Work { task, arrived } => {
                let (speed, throughput) = workers[idx].nominal(&specs);
                if speed == 0.0 && throughput == 0.0 {
                    tracing::warn!(worker = workers[idx].id.0, task = task.0, "worker has no resolvable type; producing zero work this step");
                }
                let Some(task_idx) = tasks.iter().position(|t| t.id == task) else {
                    workers[idx].mode = WorkerMode::Idle;
                    return;
                };
                let target_pos = tasks[task_idx].position;

                let (new_arrived, dt_work) = if arrived {
                    (true, dt)
                } else {
                    let leftover = workers[idx].step_motion(target_pos, speed, dt, failure_model);
                    if leftover > 0.0 {
                        (true, leftover)
                    } else {
                        (false, 0.0)
                    }
                };
                if new_arrived && dt_work > 0.0 {
                    workers[idx].step_work(&mut tasks[task_idx], throughput, dt_work, failure_model);
                }
                workers[idx].mode = WorkerMode::Work {
                    task,
                    arrived: new_arrived,
                };
            }
            WorkerMode::GoReconstruction => {
                let (speed, _) = workers[idx].nominal(&specs);
                let leftover = workers[idx].step_motion(depot_position, speed, dt, failure_model);
                if leftover > 0.0 {
                    let declared_spec = workers[idx]
                        .declared_type
                        .as_ref()
                        .and_then(|name| specs.iter().find(|s| &s.name == name))
                        .cloned();
                    match declared_spec {
                        Some(spec) => {
                            workers[idx].begin_reconstruction(&spec, reconstruct_duration);
                            workers[idx].step_reconstruction(leftover, depot);
                        }
                        None => workers[idx].mode = WorkerMode::Idle,
                    }
                }
            }
            WorkerMode::Reconstruction { .. } => {
                workers[idx].step_reconstruction(dt, depot);
            }
        }

        // Failure roll (§4.2): skipped while still reconstructing. Failed
        // modules leave service permanently (never returned to the depot,
        // §3) but are retained in `failed_modules` for conservation checks.
        let failed = workers[idx].roll_failures(failure_model, rng);
        failed_modules.extend(failed);
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("step", &self.step)
            .field("workers", &self.workers.len())
            .field("tasks", &self.tasks.len())
            .finish()
    }
}
