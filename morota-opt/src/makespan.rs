//! Expected-makespan evaluator (§4.7): the objective the task-allocator GA
//! minimizes. Works entirely on copies of worker module lists — the live
//! simulation state is never mutated here (§9 "non-aliasing copy").

use std::collections::HashMap;

use morota_common::{Module, ModuleId, ModuleType, Position, RobotTypeSpec, Task, resolve_realized_type};
use morota_sim::{Action, FailureModel, TaskPlan, Worker};

/// Standard O(n²) Poisson-binomial DP: given per-trial success
/// probabilities, returns the distribution over the number of successes,
/// a vector of length `probs.len() + 1` summing to 1 (§8 round-trip law).
pub fn poisson_binomial(probs: &[f64]) -> Vec<f64> {
    let mut dist = vec![0.0; probs.len() + 1];
    dist[0] = 1.0;
    for &p in probs {
        for k in (0..dist.len()).rev() {
            let prev = if k > 0 { dist[k - 1] } else { 0.0 };
            dist[k] = dist[k] * (1.0 - p) + prev * p;
        }
    }
    dist
}

fn count_types(modules: &[Module]) -> HashMap<ModuleType, u32> {
    let mut counts = HashMap::new();
    for m in modules {
        *counts.entry(m.module_type.clone()).or_insert(0) += 1;
    }
    counts
}

/// Expected (speed, throughput) for a module list, resolved per §4.7's
/// final paragraph: per-module survival probabilities feed an independent
/// Poisson-binomial DP per type, the joint distribution over per-type
/// surviving counts is the product across types, and each joint outcome
/// resolves to a robot type by `type_priority` order (or an "unresolved"
/// zero-performance bucket); expected performance is the probability-
/// weighted sum over resolved types.
fn expected_nominal(
    modules: &[Module],
    robot_types: &[RobotTypeSpec],
    failure_model: &dyn FailureModel,
) -> (f64, f64) {
    let mut by_type: HashMap<ModuleType, Vec<f64>> = HashMap::new();
    for m in modules {
        let survival = 1.0 - failure_model.failure_prob(m.fatigue);
        by_type.entry(m.module_type.clone()).or_default().push(survival);
    }
    if by_type.is_empty() {
        return (0.0, 0.0);
    }

    let per_type_dist: Vec<(ModuleType, Vec<f64>)> = by_type
        .into_iter()
        .map(|(ty, probs)| (ty, poisson_binomial(&probs)))
        .collect();

    let mut joint: Vec<(HashMap<ModuleType, u32>, f64)> = vec![(HashMap::new(), 1.0)];
    for (ty, dist) in &per_type_dist {
        let mut next = Vec::with_capacity(joint.len() * dist.len());
        for (counts, prob) in &joint {
            for (count, &p) in dist.iter().enumerate() {
                if p <= 0.0 {
                    continue;
                }
                let mut counts = counts.clone();
                counts.insert(ty.clone(), count as u32);
                next.push((counts, prob * p));
            }
        }
        joint = next;
    }

    let mut expected_speed = 0.0;
    let mut expected_throughput = 0.0;
    for (counts, prob) in &joint {
        if let Some(resolved) = resolve_realized_type(robot_types, counts) {
            expected_speed += prob * resolved.speed;
            expected_throughput += prob * resolved.throughput;
        }
        // Outcomes matching no type fall into the unresolved, zero-performance bucket.
    }
    (expected_speed, expected_throughput)
}

fn accrue(modules: &mut [Module], action: Action, dt: f64, failure_model: &dyn FailureModel) {
    if dt <= 0.0 {
        return;
    }
    let rates = failure_model.fatigue(action);
    for m in modules.iter_mut() {
        let rate = rates.get(&m.module_type).copied().unwrap_or(0.0);
        m.accrue_fatigue(rate, dt);
    }
}

/// Expected makespan of `plan` (§4.7): per worker, walk the route on a
/// deep copy of its module list, inserting synthetic reconstruction
/// segments where flagged; the candidate's estimate is the maximum over
/// workers. Returns `+inf` if any worker needs to travel or work with zero
/// expected speed/throughput.
pub fn expected_makespan(
    plan: &TaskPlan,
    workers: &[Worker],
    tasks: &[Task],
    robot_types: &[RobotTypeSpec],
    failure_model: &dyn FailureModel,
    reconstruct_duration: f64,
    depot_position: Position,
) -> f64 {
    let mut worst: f64 = 0.0;

    for worker in workers {
        let route = plan.routes.get(&worker.id).cloned().unwrap_or_default();
        let repairs = plan.repairs.get(&worker.id);
        let declared_spec = worker
            .declared_type
            .as_ref()
            .and_then(|name| robot_types.iter().find(|s| &s.name == name));

        let mut modules: Vec<Module> = worker.modules.values().cloned().collect();
        let mut position = worker.position;
        let mut time = 0.0_f64;

        for (i, task_id) in route.iter().enumerate() {
            let Some(task) = tasks.iter().find(|t| t.id == *task_id) else {
                continue;
            };
            if task.is_done() {
                continue;
            }

            if repairs.and_then(|r| r.get(i)).copied().unwrap_or(false) {
                let (speed, _) = expected_nominal(&modules, robot_types, failure_model);
                let distance = position.distance_to(&depot_position);
                if distance > morota_common::EPS {
                    if speed <= 0.0 {
                        return f64::INFINITY;
                    }
                    let travel = distance / speed;
                    accrue(&mut modules, Action::Move, travel, failure_model);
                    time += travel;
                }
                position = depot_position;
                time += reconstruct_duration;

                for m in modules.iter_mut() {
                    m.reset_fatigue();
                }
                if let Some(spec) = declared_spec {
                    let counts = count_types(&modules);
                    for (ty, n) in spec.deficit(&counts) {
                        for _ in 0..n {
                            modules.push(Module::new(ModuleId(0), ty.clone(), depot_position));
                        }
                    }
                }
            }

            let (speed, throughput) = expected_nominal(&modules, robot_types, failure_model);
            let distance = position.distance_to(&task.position);
            if distance > morota_common::EPS {
                if speed <= 0.0 {
                    return f64::INFINITY;
                }
                let travel = distance / speed;
                accrue(&mut modules, Action::Move, travel, failure_model);
                time += travel;
            }
            position = task.position;

            if task.remaining_work > 0.0 {
                if throughput <= 0.0 {
                    return f64::INFINITY;
                }
                let work_time = task.remaining_work / throughput;
                accrue(&mut modules, Action::Work, work_time, failure_model);
                time += work_time;
            }
        }

        worst = worst.max(time);
    }

    worst
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poisson_binomial_sums_to_one() {
        let dist = poisson_binomial(&[0.3, 0.6, 0.9]);
        assert_eq!(dist.len(), 4);
        let sum: f64 = dist.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(dist.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn poisson_binomial_degenerates_to_bernoulli() {
        let dist = poisson_binomial(&[0.25]);
        assert!((dist[0] - 0.75).abs() < 1e-12);
        assert!((dist[1] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn poisson_binomial_empty_is_certain_zero() {
        let dist = poisson_binomial(&[]);
        assert_eq!(dist, vec![1.0]);
    }
}
