use std::collections::HashMap;
use std::fmt::Debug;

use serde::Deserialize;

use morota_common::ModuleType;

/// The two actions a module's fatigue rate is keyed on (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Motion towards a target.
    Move,
    /// Working on a task.
    Work,
}

/// Interface a worker's failure rolls are driven through.
///
/// Implementations are resolved by name from the scenario's
/// `failure_model.class` field at load time (a static registry, per §9's
/// "Dynamic dispatch for policies" design note) — see
/// `morota-io::config::build_failure_model`.
pub trait FailureModel: Debug + Send + Sync {
    /// Per-step fatigue rate for each module type under `action`.
    fn fatigue(&self, action: Action) -> &HashMap<ModuleType, f64>;

    /// Cumulative failure probability at fatigue `h`, in `[0, 1]`,
    /// nondecreasing in `h`.
    fn failure_prob(&self, h: f64) -> f64;

    /// Conditional probability of failing *this step* given survival to
    /// `h`, after accruing `delta_h` more fatigue. Must equal
    /// `(F(h+delta_h) - F(h)) / (1 - F(h))` when `F(h) < 1`, and `1`
    /// otherwise; returns `0` when `delta_h <= 0`.
    fn failure_prob_step(&self, h: f64, delta_h: f64) -> f64;
}

/// Weibull failure model: `F(x) = 1 - exp(-(x/lambda)^k)`, the reference
/// implementation named in §4.4.
#[derive(Debug, Clone, Deserialize)]
pub struct WeibullFailureModel {
    /// Scale parameter (`H` units at which ~63% have failed). Must be `> 0`.
    pub lambda: f64,
    /// Shape parameter. Must be `> 0`.
    pub k: f64,
    /// Per-type fatigue rate while moving.
    #[serde(default)]
    pub fatigue_move: HashMap<ModuleType, f64>,
    /// Per-type fatigue rate while working.
    #[serde(default)]
    pub fatigue_work: HashMap<ModuleType, f64>,
}

impl WeibullFailureModel {
    /// `F(x)`, the cumulative Weibull distribution function.
    fn cdf(&self, x: f64) -> f64 {
        if x <= 0.0 || self.lambda <= 0.0 || self.k <= 0.0 {
            return 0.0;
        }
        1.0 - (-(x / self.lambda).powf(self.k)).exp()
    }
}

impl FailureModel for WeibullFailureModel {
    fn fatigue(&self, action: Action) -> &HashMap<ModuleType, f64> {
        match action {
            Action::Move => &self.fatigue_move,
            Action::Work => &self.fatigue_work,
        }
    }

    fn failure_prob(&self, h: f64) -> f64 {
        self.cdf(h)
    }

    fn failure_prob_step(&self, h: f64, delta_h: f64) -> f64 {
        if delta_h <= 0.0 || self.lambda <= 0.0 || self.k <= 0.0 {
            return 0.0;
        }
        let f_old = self.cdf(h);
        let f_new = self.cdf(h + delta_h);
        if f_old >= 1.0 {
            return 1.0;
        }
        (f_new - f_old) / (1.0 - f_old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> WeibullFailureModel {
        WeibullFailureModel {
            lambda: 10.0,
            k: 2.0,
            fatigue_move: HashMap::new(),
            fatigue_work: HashMap::new(),
        }
    }

    #[test]
    fn failure_prob_step_zero_delta_is_zero() {
        let m = model();
        for h in [0.0, 1.0, 100.0] {
            assert_eq!(m.failure_prob_step(h, 0.0), 0.0);
        }
    }

    #[test]
    fn failure_prob_is_nondecreasing_and_bounded() {
        let m = model();
        let mut prev = 0.0;
        for h in [0.0, 1.0, 5.0, 10.0, 50.0, 1000.0] {
            let p = m.failure_prob(h);
            assert!((0.0..=1.0).contains(&p));
            assert!(p >= prev - 1e-12);
            prev = p;
        }
    }

    #[test]
    fn failure_prob_step_monotone_in_delta() {
        let m = model();
        let h = 5.0;
        let mut prev = 0.0;
        for delta in [0.1, 1.0, 5.0, 20.0] {
            let p = m.failure_prob_step(h, delta);
            assert!(p >= prev - 1e-12);
            prev = p;
        }
    }

    #[test]
    fn failure_prob_step_matches_closed_form() {
        let m = model();
        let h = 3.0;
        let delta = 2.0;
        let f_h = m.failure_prob(h);
        let f_hd = m.failure_prob(h + delta);
        let expected = (f_hd - f_h) / (1.0 - f_h);
        assert!((m.failure_prob_step(h, delta) - expected).abs() < 1e-12);
    }

    #[test]
    fn failure_prob_step_saturates_to_one_past_certain_failure() {
        let m = WeibullFailureModel {
            lambda: 1.0,
            k: 1.0,
            fatigue_move: HashMap::new(),
            fatigue_work: HashMap::new(),
        };
        // At very large H, F(H) is numerically 1.0, so the conditional must be 1.
        assert_eq!(m.failure_prob_step(1000.0, 1.0), 1.0);
    }

    #[test]
    fn non_positive_params_yield_zero_probability() {
        let m = WeibullFailureModel {
            lambda: 0.0,
            k: 1.0,
            fatigue_move: HashMap::new(),
            fatigue_work: HashMap::new(),
        };
        assert_eq!(m.failure_prob(10.0), 0.0);
        assert_eq!(m.failure_prob_step(10.0, 1.0), 0.0);
    }
}
