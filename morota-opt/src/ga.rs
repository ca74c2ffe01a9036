//! Primitives shared by the configuration NSGA-II (§4.5) and the
//! single-objective task-allocator GA (§4.6): rank/crowding-based selection
//! for the former, plain tournament selection reused by both.

use rand::Rng;

/// Fast-non-dominated-sort over 2-objective vectors (both minimized).
/// Returns the front index (0 = best) for every individual.
pub fn fast_non_dominated_sort(objectives: &[[f64; 2]]) -> Vec<usize> {
    let n = objectives.len();
    let mut dominated_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut domination_count = vec![0usize; n];
    let mut rank = vec![0usize; n];
    let mut fronts: Vec<Vec<usize>> = vec![Vec::new()];

    for p in 0..n {
        for q in 0..n {
            if p == q {
                continue;
            }
            if dominates(objectives[p], objectives[q]) {
                dominated_by[p].push(q);
            } else if dominates(objectives[q], objectives[p]) {
                domination_count[p] += 1;
            }
        }
        if domination_count[p] == 0 {
            rank[p] = 0;
            fronts[0].push(p);
        }
    }

    let mut i = 0;
    while !fronts[i].is_empty() {
        let mut next_front = Vec::new();
        for &p in &fronts[i] {
            for &q in &dominated_by[p] {
                domination_count[q] -= 1;
                if domination_count[q] == 0 {
                    rank[q] = i + 1;
                    next_front.push(q);
                }
            }
        }
        i += 1;
        fronts.push(next_front);
    }
    rank
}

/// `true` iff `a` dominates `b` under minimization: no worse in every
/// objective, and strictly better in at least one.
fn dominates(a: [f64; 2], b: [f64; 2]) -> bool {
    (a[0] <= b[0] && a[1] <= b[1]) && (a[0] < b[0] || a[1] < b[1])
}

/// Crowding distance within a single front, indexed by position in
/// `front` (not the global population index). Boundary individuals get
/// `f64::INFINITY`.
pub fn crowding_distance(front: &[usize], objectives: &[[f64; 2]]) -> Vec<f64> {
    let n = front.len();
    if n == 0 {
        return Vec::new();
    }
    if n <= 2 {
        return vec![f64::INFINITY; n];
    }
    let mut distance = vec![0.0; n];
    for m in 0..2 {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            objectives[front[a]][m]
                .partial_cmp(&objectives[front[b]][m])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        distance[order[0]] = f64::INFINITY;
        distance[order[n - 1]] = f64::INFINITY;
        let range = objectives[front[order[n - 1]]][m] - objectives[front[order[0]]][m];
        if range <= 0.0 {
            continue;
        }
        for k in 1..n - 1 {
            if distance[order[k]].is_infinite() {
                continue;
            }
            let prev = objectives[front[order[k - 1]]][m];
            let next = objectives[front[order[k + 1]]][m];
            distance[order[k]] += (next - prev) / range;
        }
    }
    distance
}

/// Binary tournament on (rank ascending, crowding distance descending).
/// `candidates` is the pool of population indices to draw from.
pub fn binary_tournament(
    candidates: &[usize],
    rank: &[usize],
    crowding: &[f64],
    rng: &mut impl Rng,
) -> usize {
    let a = candidates[rng.gen_range(0..candidates.len())];
    let b = candidates[rng.gen_range(0..candidates.len())];
    if rank[a] != rank[b] {
        if rank[a] < rank[b] {
            a
        } else {
            b
        }
    } else if crowding[a] >= crowding[b] {
        a
    } else {
        b
    }
}

/// Fixed-size tournament selection by a single scalar fitness (lower is
/// better), used by the single-objective task allocator (§4.6).
pub fn scalar_tournament(pool: &[usize], fitness: &[f64], size: usize, rng: &mut impl Rng) -> usize {
    let mut best = pool[rng.gen_range(0..pool.len())];
    for _ in 1..size.max(1) {
        let challenger = pool[rng.gen_range(0..pool.len())];
        if fitness[challenger] < fitness[best] {
            best = challenger;
        }
    }
    best
}

/// 2D hypervolume of a (mutually non-dominated) front against `reference`,
/// for minimized objectives where `reference` is componentwise no better
/// than any front point (§4.5 "2D hypervolume against the reference point
/// `(0, 0)`").
pub fn hypervolume_2d(front: &[[f64; 2]], reference: [f64; 2]) -> f64 {
    if front.is_empty() {
        return 0.0;
    }
    let mut sorted = front.to_vec();
    sorted.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap_or(std::cmp::Ordering::Equal));
    let mut hv = 0.0;
    let mut last_x = reference[0];
    for point in sorted.iter().rev() {
        let width = last_x - point[0];
        let height = reference[1] - point[1];
        if width > 0.0 && height > 0.0 {
            hv += width * height;
        }
        last_x = point[0];
    }
    hv
}

/// Preference-weighted Chebyshev scalarization (§4.5): normalize each
/// objective by the front's own (ideal, nadir) range, multiply by `weights`,
/// minimize the max. Returns the index into `front` of the chosen point.
pub fn chebyshev_select(front: &[[f64; 2]], weights: [f64; 2]) -> usize {
    let ideal = [
        front.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min),
        front.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min),
    ];
    let nadir = [
        front.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max),
        front.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max),
    ];
    let range = [
        (nadir[0] - ideal[0]).max(1e-12),
        (nadir[1] - ideal[1]).max(1e-12),
    ];
    front
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let score = (0..2)
                .map(|k| weights[k] * (p[k] - ideal[k]) / range[k])
                .fold(f64::NEG_INFINITY, f64::max);
            (i, score)
        })
        .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .expect("front must be non-empty")
}

/// Index (into `hypervolumes`) of the trial whose hypervolume is the
/// median; ties broken towards the lower index (§4.5's "Multi-trial").
pub fn median_trial_index(hypervolumes: &[f64]) -> usize {
    let mut order: Vec<usize> = (0..hypervolumes.len()).collect();
    order.sort_by(|&a, &b| {
        hypervolumes[a]
            .partial_cmp(&hypervolumes[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order[(order.len() - 1) / 2]
}
