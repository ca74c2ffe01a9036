use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use morota_common::{ModuleType, RobotTypeName, RobotTypeSpec};
use morota_sim::{ConfigPlanner, Depot, Worker};

use crate::ga::{binary_tournament, chebyshev_select, crowding_distance, fast_non_dominated_sort, hypervolume_2d, median_trial_index};

/// How two parent gene vectors recombine (§4.5 "crossover").
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossoverKind {
    /// Swap a single contiguous tail between parents.
    OnePoint,
    /// Swap each gene independently with probability `swap_prob`.
    Uniform {
        /// Per-gene swap probability.
        swap_prob: f64,
    },
}

/// Tunable parameters for [`GaConfigPlanner`], mirroring the `params` bag
/// named by the `configuration_planner` component descriptor in a scenario
/// document (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigPlannerParams {
    /// Population size per generation.
    pub pop_size: usize,
    /// Number of generations per trial.
    pub generations: usize,
    /// Number of independent trials; the median-hypervolume trial wins.
    pub trials: usize,
    /// Probability a slot is populated during random initialization.
    pub p_use_worker: f64,
    /// Crossover operator.
    pub crossover: CrossoverKind,
    /// Per-individual probability that mutation is applied at all.
    pub mutation_rate: f64,
    /// Probability an unused gene activates to a random buildable type.
    pub p_activate_from_none: f64,
    /// Probability a typed gene deactivates to "unused".
    pub p_deactivate_to_none: f64,
    /// Preference weights for the final Chebyshev scalarization.
    pub weights: [f64; 2],
}

#[derive(Debug, Clone)]
struct Individual {
    genes: Vec<Option<RobotTypeName>>,
}

/// NSGA-II search over worker-type vectors (§4.5).
#[derive(Debug)]
pub struct GaConfigPlanner {
    params: ConfigPlannerParams,
}

impl GaConfigPlanner {
    /// Build a planner from its tunables.
    pub fn new(params: ConfigPlannerParams) -> Self {
        Self { params }
    }

    fn random_individual(
        num_workers_max: usize,
        robot_types: &[RobotTypeSpec],
        depot_counts: &HashMap<ModuleType, u32>,
        p_use_worker: f64,
        rng: &mut StdRng,
    ) -> Individual {
        let mut stock = depot_counts.clone();
        let mut genes: Vec<Option<RobotTypeName>> = vec![None; num_workers_max];
        let mut order: Vec<usize> = (0..num_workers_max).collect();
        order.shuffle(rng);
        for slot in order {
            if !rng.gen_bool(p_use_worker) {
                continue;
            }
            let buildable: Vec<&RobotTypeSpec> = robot_types
                .iter()
                .filter(|s| {
                    s.required_modules
                        .iter()
                        .all(|(ty, need)| stock.get(ty).copied().unwrap_or(0) >= *need)
                })
                .collect();
            if let Some(spec) = buildable.choose(rng) {
                genes[slot] = Some(spec.name.clone());
                for (ty, need) in &spec.required_modules {
                    if let Some(have) = stock.get_mut(ty) {
                        *have -= need;
                    }
                }
            }
        }
        Individual { genes }
    }

    fn crossover(&self, a: &Individual, b: &Individual, rng: &mut StdRng) -> (Individual, Individual) {
        let n = a.genes.len();
        let mut c1 = a.genes.clone();
        let mut c2 = b.genes.clone();
        match &self.params.crossover {
            CrossoverKind::OnePoint => {
                let point = rng.gen_range(0..=n);
                for i in point..n {
                    std::mem::swap(&mut c1[i], &mut c2[i]);
                }
            }
            CrossoverKind::Uniform { swap_prob } => {
                for i in 0..n {
                    if rng.gen_bool(*swap_prob) {
                        std::mem::swap(&mut c1[i], &mut c2[i]);
                    }
                }
            }
        }
        (Individual { genes: c1 }, Individual { genes: c2 })
    }

    fn mutate(&self, ind: &mut Individual, all_types: &[RobotTypeName], rng: &mut StdRng) {
        if !rng.gen_bool(self.params.mutation_rate) {
            return;
        }
        for gene in ind.genes.iter_mut() {
            match gene {
                None => {
                    if rng.gen_bool(self.params.p_activate_from_none) {
                        *gene = all_types.choose(rng).cloned();
                    }
                }
                Some(current) => {
                    if rng.gen_bool(self.params.p_deactivate_to_none) {
                        *gene = None;
                    } else {
                        let others: Vec<&RobotTypeName> =
                            all_types.iter().filter(|n| *n != current).collect();
                        if let Some(&picked) = others.choose(rng) {
                            *gene = Some(picked.clone());
                        }
                    }
                }
            }
        }
    }

    fn evaluate(
        ind: &Individual,
        workers: &[Worker],
        depot_counts: &HashMap<ModuleType, u32>,
        robot_types: &[RobotTypeSpec],
    ) -> [f64; 2] {
        const INFEASIBLE: [f64; 2] = [f64::INFINITY, f64::INFINITY];

        if ind.genes.iter().all(|g| g.is_none()) {
            return INFEASIBLE;
        }

        let mut total_required: HashMap<ModuleType, u32> = HashMap::new();
        let mut capability = 0.0;
        for (i, gene) in ind.genes.iter().enumerate() {
            let Some(type_name) = gene else { continue };
            let Some(spec) = robot_types.iter().find(|s| &s.name == type_name) else {
                return INFEASIBLE;
            };
            capability += spec.speed + spec.throughput;

            let alive_with_type = workers
                .get(i)
                .map(|w| w.is_alive() && w.realized_type(robot_types).is_some())
                .unwrap_or(false);
            let required = if alive_with_type {
                spec.deficit(&workers[i].module_type_counts())
            } else {
                spec.required_modules.clone()
            };
            for (ty, n) in required {
                *total_required.entry(ty).or_insert(0) += n;
            }
        }

        let feasible = total_required
            .iter()
            .all(|(ty, need)| depot_counts.get(ty).copied().unwrap_or(0) >= *need);
        if !feasible {
            return INFEASIBLE;
        }

        let mut types: HashSet<&ModuleType> = depot_counts.keys().collect();
        types.extend(total_required.keys());
        let min_reserve = types
            .into_iter()
            .map(|ty| {
                let stock = depot_counts.get(ty).copied().unwrap_or(0) as f64;
                let need = total_required.get(ty).copied().unwrap_or(0) as f64;
                stock - need
            })
            .fold(f64::INFINITY, f64::min);
        let reserve = if min_reserve.is_finite() { min_reserve.max(0.0) } else { 0.0 };

        [-capability, -reserve]
    }

    fn run_trial(
        &self,
        workers: &[Worker],
        depot_counts: &HashMap<ModuleType, u32>,
        robot_types: &[RobotTypeSpec],
        num_workers_max: usize,
        mut rng: StdRng,
    ) -> Vec<(Individual, [f64; 2])> {
        let all_types: Vec<RobotTypeName> = robot_types.iter().map(|s| s.name.clone()).collect();
        let mut pop: Vec<Individual> = (0..self.params.pop_size.max(1))
            .map(|_| {
                Self::random_individual(
                    num_workers_max,
                    robot_types,
                    depot_counts,
                    self.params.p_use_worker,
                    &mut rng,
                )
            })
            .collect();
        let mut objs: Vec<[f64; 2]> = pop
            .iter()
            .map(|ind| Self::evaluate(ind, workers, depot_counts, robot_types))
            .collect();

        for _gen in 0..self.params.generations {
            let rank = fast_non_dominated_sort(&objs);
            let crowding = {
                let mut by_front: HashMap<usize, Vec<usize>> = HashMap::new();
                for (i, &r) in rank.iter().enumerate() {
                    by_front.entry(r).or_default().push(i);
                }
                let mut crowding = vec![0.0; pop.len()];
                for (_r, idxs) in by_front {
                    let cd = crowding_distance(&idxs, &objs);
                    for (k, &i) in idxs.iter().enumerate() {
                        crowding[i] = cd[k];
                    }
                }
                crowding
            };

            let candidates: Vec<usize> = (0..pop.len()).collect();
            let mut offspring = Vec::with_capacity(pop.len());
            while offspring.len() < pop.len() {
                let p1 = binary_tournament(&candidates, &rank, &crowding, &mut rng);
                let p2 = binary_tournament(&candidates, &rank, &crowding, &mut rng);
                let (mut c1, mut c2) = self.crossover(&pop[p1], &pop[p2], &mut rng);
                self.mutate(&mut c1, &all_types, &mut rng);
                self.mutate(&mut c2, &all_types, &mut rng);
                offspring.push(c1);
                if offspring.len() < pop.len() {
                    offspring.push(c2);
                }
            }
            let offspring_objs: Vec<[f64; 2]> = offspring
                .iter()
                .map(|ind| Self::evaluate(ind, workers, depot_counts, robot_types))
                .collect();

            let mut combined = pop;
            combined.extend(offspring);
            let mut combined_objs = objs;
            combined_objs.extend(offspring_objs);

            let combined_rank = fast_non_dominated_sort(&combined_objs);
            let mut by_front: Vec<(usize, Vec<usize>)> = {
                let mut map: HashMap<usize, Vec<usize>> = HashMap::new();
                for (i, &r) in combined_rank.iter().enumerate() {
                    map.entry(r).or_default().push(i);
                }
                let mut v: Vec<(usize, Vec<usize>)> = map.into_iter().collect();
                v.sort_by_key(|(r, _)| *r);
                v
            };

            let mut selected = Vec::with_capacity(self.params.pop_size);
            for (_rank, idxs) in by_front.drain(..) {
                if selected.len() + idxs.len() <= self.params.pop_size {
                    selected.extend(idxs);
                } else {
                    let need = self.params.pop_size - selected.len();
                    let cd = crowding_distance(&idxs, &combined_objs);
                    let mut order: Vec<usize> = (0..idxs.len()).collect();
                    order.sort_by(|&a, &b| cd[b].partial_cmp(&cd[a]).unwrap_or(std::cmp::Ordering::Equal));
                    selected.extend(order.into_iter().take(need).map(|k| idxs[k]));
                    break;
                }
            }

            pop = selected.iter().map(|&i| combined[i].clone()).collect();
            objs = selected.iter().map(|&i| combined_objs[i]).collect();
        }

        let final_rank = fast_non_dominated_sort(&objs);
        pop.into_iter()
            .zip(objs)
            .zip(final_rank)
            .filter(|(_, r)| *r == 0)
            .map(|((ind, obj), _)| (ind, obj))
            .collect()
    }
}

impl ConfigPlanner for GaConfigPlanner {
    fn plan(
        &mut self,
        workers: &[Worker],
        depot: &Depot,
        robot_types: &[RobotTypeSpec],
        num_workers_max: usize,
        rng: &mut StdRng,
    ) -> Vec<Option<RobotTypeName>> {
        let depot_counts = depot.count_by_type();
        let base_seed: u64 = rng.gen();

        let trials: Vec<Vec<(Individual, [f64; 2])>> = (0..self.params.trials.max(1))
            .map(|t| {
                let child_rng = StdRng::seed_from_u64(base_seed.wrapping_add(t as u64));
                self.run_trial(workers, &depot_counts, robot_types, num_workers_max, child_rng)
            })
            .collect();

        let hypervolumes: Vec<f64> = trials
            .iter()
            .map(|front| hypervolume_2d(&front.iter().map(|(_, o)| *o).collect::<Vec<_>>(), [0.0, 0.0]))
            .collect();
        let chosen_trial = median_trial_index(&hypervolumes);
        let front = &trials[chosen_trial];

        if front.is_empty() {
            tracing::warn!("configuration planner produced an empty Pareto front; leaving all slots unused");
            return vec![None; num_workers_max];
        }

        let objs: Vec<[f64; 2]> = front.iter().map(|(_, o)| *o).collect();
        let chosen_idx = chebyshev_select(&objs, self.params.weights);
        let genes = front[chosen_idx].0.genes.clone();
        tracing::info!(
            front_size = front.len(),
            used_slots = genes.iter().filter(|g| g.is_some()).count(),
            "configuration planner replanned"
        );
        genes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morota_common::{Module, ModuleId, Position};

    fn spec(name: &str, reqs: &[(&str, u32)], speed: f64, throughput: f64) -> RobotTypeSpec {
        RobotTypeSpec {
            name: RobotTypeName::from(name),
            required_modules: reqs.iter().map(|(t, c)| (ModuleType::from(*t), *c)).collect(),
            speed,
            throughput,
            priority: 0,
        }
    }

    fn params() -> ConfigPlannerParams {
        ConfigPlannerParams {
            pop_size: 10,
            generations: 3,
            trials: 3,
            p_use_worker: 0.7,
            crossover: CrossoverKind::Uniform { swap_prob: 0.5 },
            mutation_rate: 0.3,
            p_activate_from_none: 0.3,
            p_deactivate_to_none: 0.2,
            weights: [1.0, 1.0],
        }
    }

    #[test]
    fn plan_uses_available_depot_stock() {
        let modules: Vec<Module> = (0..3)
            .map(|i| Module::new(ModuleId(i), ModuleType::from("Wheel"), Position::new(0.0, 0.0)))
            .collect();
        let depot = Depot::new(modules).unwrap();
        let specs = vec![spec("Hauler", &[("Wheel", 1)], 2.0, 2.0)];
        let mut planner = GaConfigPlanner::new(params());
        let mut rng = StdRng::seed_from_u64(7);
        let plan = planner.plan(&[], &depot, &specs, 5, &mut rng);
        let used = plan.iter().filter(|g| g.is_some()).count();
        assert!(used <= 3);
    }

    #[test]
    fn plan_leaves_everything_unused_when_depot_is_empty() {
        let depot = Depot::new([]).unwrap();
        let specs = vec![spec("Hauler", &[("Wheel", 1)], 2.0, 2.0)];
        let mut planner = GaConfigPlanner::new(params());
        let mut rng = StdRng::seed_from_u64(7);
        let plan = planner.plan(&[], &depot, &specs, 3, &mut rng);
        assert!(plan.iter().all(|g| g.is_none()));
    }
}
