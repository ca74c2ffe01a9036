use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use morota_common::{Position, RobotTypeSpec, Task, TaskId};
use morota_sim::{Depot, FailureModel, TaskAllocator, TaskPlan, Worker, WorkerId};

use crate::ga::{median_trial_index, scalar_tournament};
use crate::makespan::expected_makespan;

/// The three mutation operators of §4.6, with relative selection weights.
#[derive(Debug, Clone, Deserialize)]
pub struct MutationWeights {
    /// Weight for an intra-worker swap of two tasks.
    pub intra_swap: f64,
    /// Weight for an intra-worker remove-and-reinsert.
    pub intra_remove_insert: f64,
    /// Weight for an inter-worker exchange of one task each.
    pub inter_exchange: f64,
}

/// Tunables for [`GaTaskAllocator`] (the `task_allocator` component's
/// parameter bag, §6).
#[derive(Debug, Clone, Deserialize)]
pub struct TaskAllocatorParams {
    /// Population size per generation.
    pub pop_size: usize,
    /// Generations per trial.
    pub generations: usize,
    /// Independent trials; the median-objective trial wins (§4.6).
    pub trials: usize,
    /// Fixed length of each worker's repair-flag vector.
    pub l_max: usize,
    /// Per-flag probability of `true` at initialization.
    pub repair_prob: f64,
    /// Probability mutation is applied to a child at all.
    pub mutation_rate: f64,
    /// Relative weights among the three mutation operators.
    pub mutation_weights: MutationWeights,
    /// Expected number of repair-layer bit flips per mutation (may be
    /// fractional; rounded stochastically, §4.6).
    pub repair_flip_rate: f64,
    /// Tournament size for parent selection.
    pub tournament_size: usize,
    /// Fraction of the population kept unchanged as elites each generation.
    pub elitism_rate: f64,
}

/// Single-objective GA search over task routes + repair schedules (§4.6).
#[derive(Debug)]
pub struct GaTaskAllocator {
    params: TaskAllocatorParams,
}

enum MutationKind {
    IntraSwap,
    IntraRemoveInsert,
    InterExchange,
}

impl GaTaskAllocator {
    /// Build an allocator from its tunables.
    pub fn new(params: TaskAllocatorParams) -> Self {
        Self { params }
    }

    fn init_individual(
        &self,
        worker_ids: &[WorkerId],
        non_done: &[TaskId],
        rng: &mut StdRng,
    ) -> TaskPlan {
        let mut shuffled = non_done.to_vec();
        shuffled.shuffle(rng);

        let mut routes: HashMap<WorkerId, Vec<TaskId>> =
            worker_ids.iter().map(|&w| (w, Vec::new())).collect();
        if !worker_ids.is_empty() {
            for (i, tid) in shuffled.into_iter().enumerate() {
                let w = worker_ids[i % worker_ids.len()];
                routes.get_mut(&w).unwrap().push(tid);
            }
        }
        for route in routes.values_mut() {
            route.shuffle(rng);
        }

        let repairs: HashMap<WorkerId, Vec<bool>> = worker_ids
            .iter()
            .map(|&w| {
                let flags = (0..self.params.l_max)
                    .map(|_| rng.gen_bool(self.params.repair_prob))
                    .collect();
                (w, flags)
            })
            .collect();

        TaskPlan { routes, repairs }
    }

    /// Replace a random subset of the child's routes (seeded from `a`) with
    /// the most-similar route from `b`, then repair so the partition
    /// invariant holds (§4.6 "Crossover").
    fn crossover(
        &self,
        a: &TaskPlan,
        b: &TaskPlan,
        worker_ids: &[WorkerId],
        non_done: &[TaskId],
        rng: &mut StdRng,
    ) -> TaskPlan {
        let mut routes = a.routes.clone();

        for &w in worker_ids {
            if !rng.gen_bool(0.5) {
                continue;
            }
            let a_set: HashSet<TaskId> = a.routes.get(&w).cloned().unwrap_or_default().into_iter().collect();

            // Walk `b.routes` in a canonical (WorkerId-sorted) order rather
            // than HashMap iteration order, then break ties with the model
            // RNG (spec's "choose any deterministic rule driven by the model
            // RNG") — both steps are needed, since an RNG draw over a list
            // whose order itself depends on the map's randomized hasher
            // would still make the outcome process-dependent.
            let mut by_worker: Vec<(&WorkerId, &Vec<TaskId>)> = b.routes.iter().collect();
            by_worker.sort_by_key(|(id, _)| **id);

            let mut best_overlap: i64 = -1;
            let mut tied: Vec<&Vec<TaskId>> = Vec::new();
            for (_, route) in by_worker {
                let set: HashSet<TaskId> = route.iter().copied().collect();
                let overlap = a_set.intersection(&set).count() as i64;
                if overlap > best_overlap {
                    best_overlap = overlap;
                    tied.clear();
                    tied.push(route);
                } else if overlap == best_overlap {
                    tied.push(route);
                }
            }
            let best_route = if tied.len() <= 1 {
                tied.first().map(|r| (*r).clone())
            } else {
                let idx = rng.gen_range(0..tied.len());
                Some(tied[idx].clone())
            };
            if let Some(best_route) = best_route {
                routes.insert(w, best_route);
            }
        }

        // Route-repair pass: scan in a fixed (worker_ids, position) order and
        // keep only each task's last occurrence; previous ones are dropped.
        let mut last_pos: HashMap<TaskId, (WorkerId, usize)> = HashMap::new();
        for &w in worker_ids {
            if let Some(route) = routes.get(&w) {
                for (i, &tid) in route.iter().enumerate() {
                    last_pos.insert(tid, (w, i));
                }
            }
        }
        let mut new_routes: HashMap<WorkerId, Vec<TaskId>> =
            worker_ids.iter().map(|&w| (w, Vec::new())).collect();
        for &w in worker_ids {
            if let Some(route) = routes.get(&w) {
                for (i, &tid) in route.iter().enumerate() {
                    if last_pos.get(&tid) == Some(&(w, i)) {
                        new_routes.get_mut(&w).unwrap().push(tid);
                    }
                }
            }
        }

        let assigned: HashSet<TaskId> = new_routes.values().flatten().copied().collect();
        let mut unassigned: Vec<TaskId> =
            non_done.iter().copied().filter(|t| !assigned.contains(t)).collect();
        unassigned.shuffle(rng);
        for tid in unassigned {
            if worker_ids.is_empty() {
                break;
            }
            let target = worker_ids
                .iter()
                .copied()
                .filter(|w| new_routes[w].len() < self.params.l_max)
                .min_by_key(|w| new_routes[w].len())
                .unwrap_or_else(|| worker_ids.iter().copied().min_by_key(|w| new_routes[w].len()).unwrap());
            let route = new_routes.get_mut(&target).unwrap();
            let pos = rng.gen_range(0..=route.len());
            route.insert(pos, tid);
        }

        // Repairs are uniformly crossed gene-wise.
        let mut repairs: HashMap<WorkerId, Vec<bool>> = HashMap::new();
        for &w in worker_ids {
            let ra = a.repairs.get(&w);
            let rb = b.repairs.get(&w);
            let flags = (0..self.params.l_max)
                .map(|i| {
                    let fa = ra.and_then(|v| v.get(i)).copied().unwrap_or(false);
                    let fb = rb.and_then(|v| v.get(i)).copied().unwrap_or(false);
                    if rng.gen_bool(0.5) {
                        fa
                    } else {
                        fb
                    }
                })
                .collect();
            repairs.insert(w, flags);
        }

        TaskPlan {
            routes: new_routes,
            repairs,
        }
    }

    fn pick_mutation_kind(&self, rng: &mut StdRng) -> MutationKind {
        let w = &self.params.mutation_weights;
        let total = (w.intra_swap + w.intra_remove_insert + w.inter_exchange).max(1e-12);
        let roll = rng.gen_range(0.0..total);
        if roll < w.intra_swap {
            MutationKind::IntraSwap
        } else if roll < w.intra_swap + w.intra_remove_insert {
            MutationKind::IntraRemoveInsert
        } else {
            MutationKind::InterExchange
        }
    }

    fn mutate(&self, ind: &mut TaskPlan, worker_ids: &[WorkerId], rng: &mut StdRng) {
        if rng.gen_bool(self.params.mutation_rate) && !worker_ids.is_empty() {
            match self.pick_mutation_kind(rng) {
                MutationKind::IntraSwap => {
                    let candidates: Vec<WorkerId> = worker_ids
                        .iter()
                        .copied()
                        .filter(|w| ind.routes.get(w).map(|r| r.len() >= 2).unwrap_or(false))
                        .collect();
                    if let Some(&w) = candidates.choose(rng) {
                        let route = ind.routes.get_mut(&w).unwrap();
                        let i = rng.gen_range(0..route.len());
                        let j = rng.gen_range(0..route.len());
                        route.swap(i, j);
                    }
                }
                MutationKind::IntraRemoveInsert => {
                    let candidates: Vec<WorkerId> = worker_ids
                        .iter()
                        .copied()
                        .filter(|w| ind.routes.get(w).map(|r| !r.is_empty()).unwrap_or(false))
                        .collect();
                    if let Some(&w) = candidates.choose(rng) {
                        let route = ind.routes.get_mut(&w).unwrap();
                        let i = rng.gen_range(0..route.len());
                        let tid = route.remove(i);
                        let j = rng.gen_range(0..=route.len());
                        route.insert(j, tid);
                    }
                }
                MutationKind::InterExchange => {
                    let candidates: Vec<WorkerId> = worker_ids
                        .iter()
                        .copied()
                        .filter(|w| ind.routes.get(w).map(|r| !r.is_empty()).unwrap_or(false))
                        .collect();
                    if candidates.len() >= 2 {
                        let w1 = candidates[rng.gen_range(0..candidates.len())];
                        let w2 = loop {
                            let candidate = candidates[rng.gen_range(0..candidates.len())];
                            if candidate != w1 {
                                break candidate;
                            }
                        };
                        let i = rng.gen_range(0..ind.routes[&w1].len());
                        let j = rng.gen_range(0..ind.routes[&w2].len());
                        let a = ind.routes.get_mut(&w1).unwrap().remove(i);
                        let b = ind.routes.get_mut(&w2).unwrap().remove(j);
                        ind.routes.get_mut(&w1).unwrap().insert(i.min(ind.routes[&w1].len()), b);
                        ind.routes.get_mut(&w2).unwrap().insert(j.min(ind.routes[&w2].len()), a);
                    }
                }
            }
        }

        if worker_ids.is_empty() {
            return;
        }
        let base = self.params.repair_flip_rate.floor();
        let frac = (self.params.repair_flip_rate - base).clamp(0.0, 1.0);
        let n_flips = base as usize + usize::from(rng.gen_bool(frac));
        for _ in 0..n_flips {
            let w = worker_ids[rng.gen_range(0..worker_ids.len())];
            if let Some(flags) = ind.repairs.get_mut(&w) {
                if !flags.is_empty() {
                    let idx = rng.gen_range(0..flags.len());
                    flags[idx] = !flags[idx];
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_trial(
        &self,
        workers: &[Worker],
        tasks: &[Task],
        robot_types: &[RobotTypeSpec],
        failure_model: &dyn FailureModel,
        reconstruct_duration: f64,
        depot_position: Position,
        mut rng: StdRng,
    ) -> (TaskPlan, f64) {
        let worker_ids: Vec<WorkerId> = workers.iter().map(|w| w.id).collect();
        let non_done: Vec<TaskId> = tasks.iter().filter(|t| !t.is_done()).map(|t| t.id).collect();
        let pop_size = self.params.pop_size.max(1);

        let mut pop: Vec<TaskPlan> = (0..pop_size)
            .map(|_| self.init_individual(&worker_ids, &non_done, &mut rng))
            .collect();
        let mut fitness: Vec<f64> = pop
            .iter()
            .map(|ind| {
                expected_makespan(
                    ind,
                    workers,
                    tasks,
                    robot_types,
                    failure_model,
                    reconstruct_duration,
                    depot_position,
                )
            })
            .collect();

        for _gen in 0..self.params.generations {
            let mut order: Vec<usize> = (0..pop.len()).collect();
            order.sort_by(|&a, &b| fitness[a].partial_cmp(&fitness[b]).unwrap_or(Ordering::Equal));
            let elite_count = ((self.params.elitism_rate * pop.len() as f64).ceil() as usize).min(pop.len());

            let mut next_pop: Vec<TaskPlan> = order.iter().take(elite_count).map(|&i| pop[i].clone()).collect();
            let mut next_fitness: Vec<f64> = order.iter().take(elite_count).map(|&i| fitness[i]).collect();

            let pool: Vec<usize> = (0..pop.len()).collect();
            while next_pop.len() < pop_size {
                let p1 = scalar_tournament(&pool, &fitness, self.params.tournament_size, &mut rng);
                let p2 = scalar_tournament(&pool, &fitness, self.params.tournament_size, &mut rng);
                let mut child = self.crossover(&pop[p1], &pop[p2], &worker_ids, &non_done, &mut rng);
                self.mutate(&mut child, &worker_ids, &mut rng);
                let f = expected_makespan(
                    &child,
                    workers,
                    tasks,
                    robot_types,
                    failure_model,
                    reconstruct_duration,
                    depot_position,
                );
                next_pop.push(child);
                next_fitness.push(f);
            }

            pop = next_pop;
            fitness = next_fitness;
        }

        let best = fitness
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(Ordering::Equal))
            .map(|(i, &f)| (i, f))
            .expect("population is never empty: optimizer precondition");
        (pop[best.0].clone(), best.1)
    }
}

impl TaskAllocator for GaTaskAllocator {
    fn plan(
        &mut self,
        workers: &[Worker],
        tasks: &[Task],
        _depot: &Depot,
        robot_types: &[RobotTypeSpec],
        failure_model: &dyn FailureModel,
        reconstruct_duration: f64,
        depot_position: Position,
        rng: &mut StdRng,
    ) -> TaskPlan {
        let base_seed: u64 = rng.gen();
        let trials: Vec<(TaskPlan, f64)> = (0..self.params.trials.max(1))
            .map(|t| {
                let child_rng = StdRng::seed_from_u64(base_seed.wrapping_add(t as u64));
                self.run_trial(workers, tasks, robot_types, failure_model, reconstruct_duration, depot_position, child_rng)
            })
            .collect();
        let values: Vec<f64> = trials.iter().map(|(_, f)| *f).collect();
        let chosen = median_trial_index(&values);
        let plan = trials[chosen].0.clone();
        tracing::info!(
            expected_makespan = values[chosen],
            routed_workers = plan.routes.len(),
            "task allocator replanned"
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morota_common::{Module, ModuleId, ModuleType, RobotTypeName};
    use morota_sim::{Depot, Worker, WeibullFailureModel};
    use std::collections::HashMap as StdHashMap;

    fn spec() -> RobotTypeSpec {
        RobotTypeSpec {
            name: RobotTypeName::from("Hauler"),
            required_modules: StdHashMap::from([(ModuleType::from("Wheel"), 1)]),
            speed: 1.0,
            throughput: 1.0,
            priority: 0,
        }
    }

    fn params() -> TaskAllocatorParams {
        TaskAllocatorParams {
            pop_size: 8,
            generations: 3,
            trials: 2,
            l_max: 2,
            repair_prob: 0.1,
            mutation_rate: 0.5,
            mutation_weights: MutationWeights {
                intra_swap: 1.0,
                intra_remove_insert: 1.0,
                inter_exchange: 1.0,
            },
            repair_flip_rate: 0.5,
            tournament_size: 2,
            elitism_rate: 0.25,
        }
    }

    fn worker(id: u32, modules: &[&str]) -> Worker {
        let mut w = Worker::new_idle(WorkerId(id), Position::new(0.0, 0.0));
        w.declared_type = Some(RobotTypeName::from("Hauler"));
        for (i, ty) in modules.iter().enumerate() {
            let m = Module::new(ModuleId((id as u64) * 10 + i as u64), ModuleType::from(*ty), Position::new(0.0, 0.0));
            w.modules.insert(m.id, m);
        }
        w
    }

    #[test]
    fn plan_covers_every_non_done_task_exactly_once() {
        let workers = vec![worker(0, &["Wheel"]), worker(1, &["Wheel"])];
        let tasks = vec![
            Task::new(TaskId(0), Position::new(1.0, 0.0), 5.0, 5.0),
            Task::new(TaskId(1), Position::new(2.0, 0.0), 5.0, 5.0),
            Task::new(TaskId(2), Position::new(3.0, 0.0), 5.0, 5.0),
        ];
        let depot = Depot::new([]).unwrap();
        let model = WeibullFailureModel {
            lambda: 1e9,
            k: 1.0,
            fatigue_move: StdHashMap::new(),
            fatigue_work: StdHashMap::new(),
        };
        let mut allocator = GaTaskAllocator::new(params());
        let mut rng = StdRng::seed_from_u64(3);
        let plan = allocator.plan(&workers, &tasks, &depot, &[spec()], &model, 1.0, Position::new(0.0, 0.0), &mut rng);

        let mut seen: Vec<TaskId> = plan.routes.values().flatten().copied().collect();
        seen.sort_by_key(|t| t.0);
        assert_eq!(seen, vec![TaskId(0), TaskId(1), TaskId(2)]);
    }
}
