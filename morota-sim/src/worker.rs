use std::collections::HashMap;

use rand::Rng;

use morota_common::{Module, ModuleId, ModuleType, Position, RobotTypeName, RobotTypeSpec, Task};

use crate::depot::Depot;
use crate::failure_model::{Action, FailureModel};

/// Identifies a worker slot. Stable across the whole run even as the slot's
/// occupant is created, retired, and recreated by the configuration planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub u32);

/// A worker's current activity (§4.2).
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMode {
    /// Waiting for the allocator to assign a target.
    Idle,
    /// Moving to, then working on, a task.
    Work {
        /// The task currently targeted.
        task: morota_common::TaskId,
        /// Whether the worker has arrived and is actively adding work.
        arrived: bool,
    },
    /// Moving back to the depot to reconstruct.
    GoReconstruction,
    /// At the depot, consuming `dt` against `reconstruct_duration`.
    Reconstruction {
        /// Deficit snapshot taken on entry, still outstanding.
        deficit: HashMap<ModuleType, u32>,
        /// Modules slated to be returned to the depot on completion.
        excess: Vec<ModuleId>,
        /// Remaining duration before the round-trip completes.
        remaining: f64,
    },
}

/// A single worker slot: a set of modules, a declared and realized robot
/// type, a position, and a mode state machine (§4.2).
#[derive(Debug, Clone)]
pub struct Worker {
    /// Stable slot identity.
    pub id: WorkerId,
    /// Current position.
    pub position: Position,
    /// The modules currently mounted, keyed by id for fast lookup.
    pub modules: HashMap<ModuleId, Module>,
    /// Type the planner most recently assigned this slot.
    pub declared_type: Option<RobotTypeName>,
    /// Current mode.
    pub mode: WorkerMode,
    /// Index into the worker's route of the task last reconstructed before,
    /// or `None` if no reconstruction has yet been triggered for this route.
    pub last_repair_index: Option<usize>,
    /// Depot coordinates, used as the reconstruction destination.
    depot_position: Position,
}

impl Worker {
    /// Create a new, idle worker slot at the depot.
    pub fn new_idle(id: WorkerId, depot_position: Position) -> Self {
        Worker {
            id,
            position: depot_position,
            modules: HashMap::new(),
            declared_type: None,
            mode: WorkerMode::Idle,
            last_repair_index: None,
            depot_position,
        }
    }

    /// Whether this slot currently has any modules mounted, i.e. is "alive"
    /// in the planner's vocabulary (§4.5).
    pub fn is_alive(&self) -> bool {
        !self.modules.is_empty()
    }

    /// The robot type actually realized by the modules currently mounted,
    /// resolved by priority (§4.5's `infer_robot_type_from_modules`
    /// equivalent), or `None` if no spec is fully satisfied.
    pub fn realized_type<'a>(&self, specs: &'a [RobotTypeSpec]) -> Option<&'a RobotTypeSpec> {
        let counts = self.module_type_counts();
        morota_common::resolve_realized_type(specs, &counts)
    }

    /// Per-type module counts currently mounted.
    pub fn module_type_counts(&self) -> HashMap<ModuleType, u32> {
        let mut counts = HashMap::new();
        for m in self.modules.values() {
            *counts.entry(m.module_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Speed and throughput derived from the realized type, or `(0, 0)` if
    /// the declared type isn't resolvable from current modules (§4.2 edge
    /// case).
    pub fn nominal(&self, specs: &[RobotTypeSpec]) -> (f64, f64) {
        match self.realized_type(specs) {
            Some(spec) => (spec.speed, spec.throughput),
            None => (0.0, 0.0),
        }
    }

    /// Move towards `target`, accruing move fatigue scaled by actual travel
    /// time. Returns the unconsumed remainder of `dt` (zero unless the
    /// target was reached).
    pub fn step_motion(
        &mut self,
        target: Position,
        speed: f64,
        dt: f64,
        failure_model: &dyn FailureModel,
    ) -> f64 {
        let distance = self.position.distance_to(&target);
        let reachable = speed * dt;
        let (arrived, travel_time) = if distance <= reachable || distance < morota_common::EPS {
            self.position = target;
            let travel_time = if speed > 0.0 { distance / speed } else { 0.0 };
            (true, travel_time.min(dt))
        } else {
            self.position.step_towards(&target, reachable);
            (false, dt)
        };
        self.accrue_fatigue(Action::Move, travel_time, failure_model);
        if arrived {
            dt - travel_time
        } else {
            0.0
        }
    }

    /// Add `throughput * dt_work` to `task`'s per-step accumulator and
    /// accrue work fatigue over `dt_work`.
    pub fn step_work(
        &mut self,
        task: &mut Task,
        throughput: f64,
        dt_work: f64,
        failure_model: &dyn FailureModel,
    ) {
        if dt_work <= 0.0 {
            return;
        }
        task.add_work(throughput * dt_work);
        self.accrue_fatigue(Action::Work, dt_work, failure_model);
    }

    fn accrue_fatigue(&mut self, action: Action, time: f64, failure_model: &dyn FailureModel) {
        if time <= 0.0 {
            return;
        }
        let rates = failure_model.fatigue(action);
        for module in self.modules.values_mut() {
            let rate = rates.get(&module.module_type).copied().unwrap_or(0.0);
            module.accrue_fatigue(rate, time);
        }
    }

    /// Enter reconstruction mode: snapshot the deficit against `declared`'s
    /// requirement and the excess (highest-`H` modules first, §4.2).
    pub fn begin_reconstruction(&mut self, declared: &RobotTypeSpec, reconstruct_duration: f64) {
        let counts = self.module_type_counts();
        let mut deficit = HashMap::new();
        for (ty, need) in &declared.required_modules {
            let have = counts.get(ty).copied().unwrap_or(0);
            if have < *need {
                deficit.insert(ty.clone(), need - have);
            }
        }
        let mut excess: Vec<(ModuleId, f64)> =
            self.modules.values().map(|m| (m.id, m.fatigue)).collect();
        // Break fatigue ties by ModuleId rather than HashMap iteration order,
        // which is randomized per process (same reasoning as `roll_failures`).
        excess.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        let excess_ids: Vec<ModuleId> = excess
            .into_iter()
            .filter(|(id, _)| {
                let ty = &self.modules[id].module_type;
                let have = counts.get(ty).copied().unwrap_or(0);
                let need = declared.required_modules.get(ty).copied().unwrap_or(0);
                have > need
            })
            .map(|(id, _)| id)
            .collect();
        self.mode = WorkerMode::Reconstruction {
            deficit,
            excess: excess_ids,
            remaining: reconstruct_duration,
        };
    }

    /// Advance reconstruction by `dt`. Returns `Some(leftover_dt)` once the
    /// round trip completes (excess returned, deficit taken atomically with
    /// take-what-you-can semantics, per the Open Question decision in
    /// DESIGN.md), or `None` if still in progress.
    pub fn step_reconstruction(&mut self, dt: f64, depot: &mut Depot) -> Option<f64> {
        let (deficit, excess, remaining) = match &mut self.mode {
            WorkerMode::Reconstruction {
                deficit,
                excess,
                remaining,
            } => (deficit.clone(), excess.clone(), remaining),
            _ => return None,
        };
        *remaining -= dt;
        if *remaining > 0.0 {
            return None;
        }
        let leftover = -*remaining;

        let returned: Vec<Module> = excess
            .iter()
            .filter_map(|id| self.modules.remove(id))
            .collect();
        depot.put(returned).expect("excess modules have unique ids");

        let available = depot.count_by_type();
        let coverable: HashMap<ModuleType, u32> = deficit
            .iter()
            .map(|(ty, need)| (ty.clone(), (*need).min(available.get(ty).copied().unwrap_or(0))))
            .filter(|(_, n)| *n > 0)
            .collect();
        if let Some(granted) = depot.take(&coverable) {
            for m in granted {
                self.modules.insert(m.id, m);
            }
        }

        self.mode = WorkerMode::Idle;
        Some(leftover)
    }

    /// Failure roll (§4.2): unless in `Reconstruction`, sample a Bernoulli
    /// per module with `failure_prob_step(H, ΔH)` and remove failures. Reset
    /// every module's `ΔH` to zero regardless of mode.
    pub fn roll_failures(
        &mut self,
        failure_model: &dyn FailureModel,
        rng: &mut impl Rng,
    ) -> Vec<Module> {
        let skip_roll = matches!(self.mode, WorkerMode::Reconstruction { .. });
        let mut failed = Vec::new();
        if !skip_roll {
            // Draw in ModuleId order, not HashMap iteration order: the map's
            // default hasher is randomized per process, so an unordered walk
            // would make the RNG stream (and hence every later draw this
            // step) depend on process-specific hash seeding rather than the
            // model's seed (§5, §8 invariant 8).
            let mut ordered: Vec<&Module> = self.modules.values().collect();
            ordered.sort_by_key(|m| m.id);
            let failing_ids: Vec<ModuleId> = ordered
                .into_iter()
                .filter(|m| {
                    let p = failure_model.failure_prob_step(m.fatigue, m.fatigue_delta);
                    rng.gen_bool(p.clamp(0.0, 1.0))
                })
                .map(|m| m.id)
                .collect();
            for id in failing_ids {
                if let Some(mut m) = self.modules.remove(&id) {
                    m.state = morota_common::ModuleState::Failed;
                    failed.push(m);
                }
            }
        }
        for m in self.modules.values_mut() {
            m.reset_fatigue_delta();
        }
        failed
    }

    /// The depot position this worker reconstructs at.
    pub fn depot_position(&self) -> Position {
        self.depot_position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure_model::WeibullFailureModel;
    use morota_common::ModuleState;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> WeibullFailureModel {
        WeibullFailureModel {
            lambda: 10.0,
            k: 2.0,
            fatigue_move: HashMap::from([(ModuleType::from("Leg"), 1.0)]),
            fatigue_work: HashMap::from([(ModuleType::from("Arm"), 1.0)]),
        }
    }

    #[test]
    fn motion_within_eps_is_arrival() {
        let mut w = Worker::new_idle(WorkerId(0), Position::new(0.0, 0.0));
        let leftover = w.step_motion(Position::new(1e-9, 0.0), 1.0, 1.0, &model());
        assert!(leftover > 0.9);
    }

    #[test]
    fn motion_partial_step_consumes_all_dt() {
        let mut w = Worker::new_idle(WorkerId(0), Position::new(0.0, 0.0));
        let leftover = w.step_motion(Position::new(100.0, 0.0), 1.0, 1.0, &model());
        assert_eq!(leftover, 0.0);
        assert_eq!(w.position, Position::new(1.0, 0.0));
    }

    #[test]
    fn motion_exact_arrival_returns_remainder() {
        let mut w = Worker::new_idle(WorkerId(0), Position::new(0.0, 0.0));
        let leftover = w.step_motion(Position::new(2.0, 0.0), 1.0, 5.0, &model());
        assert_eq!(w.position, Position::new(2.0, 0.0));
        assert_eq!(leftover, 3.0);
    }

    #[test]
    fn roll_failures_skipped_during_reconstruction() {
        let mut w = Worker::new_idle(WorkerId(0), Position::new(0.0, 0.0));
        let mut m = Module::new(ModuleId(1), ModuleType::from("Leg"), Position::new(0.0, 0.0));
        m.fatigue = 1000.0;
        m.fatigue_delta = 1000.0;
        w.modules.insert(m.id, m);
        w.mode = WorkerMode::Reconstruction {
            deficit: HashMap::new(),
            excess: vec![],
            remaining: 1.0,
        };
        let mut rng = StdRng::seed_from_u64(0);
        let failed = w.roll_failures(&model(), &mut rng);
        assert!(failed.is_empty());
        assert_eq!(w.modules.values().next().unwrap().fatigue_delta, 0.0);
    }

    #[test]
    fn roll_failures_removes_and_resets_delta() {
        let mut w = Worker::new_idle(WorkerId(0), Position::new(0.0, 0.0));
        let mut m = Module::new(ModuleId(1), ModuleType::from("Leg"), Position::new(0.0, 0.0));
        m.fatigue = 1000.0;
        m.fatigue_delta = 1000.0;
        w.modules.insert(m.id, m);
        let mut rng = StdRng::seed_from_u64(1);
        let failed = w.roll_failures(&model(), &mut rng);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].state, ModuleState::Failed);
        assert!(w.modules.is_empty());
    }
}
