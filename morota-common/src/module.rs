use serde::{Deserialize, Serialize};

use crate::Position;

/// Stable identity of a [`Module`], preserved across transfers between the
/// depot and a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(pub u64);

/// Type label drawn from the small closed set declared by a scenario's
/// `robot_setup.modules` list (e.g. `Body`, `Limb`, `Wheel`). Scenario-defined
/// rather than a fixed Rust enum, since the set of valid types is only known
/// once a `robot_setup` document is loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleType(pub String);

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ModuleType {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ModuleType {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A module's lifecycle state. Once `Failed`, a module is removed from its
/// worker's inventory at the end of the step in which it failed and is
/// never returned to the depot (§3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// The module is functioning and accruing fatigue.
    Healthy,
    /// The module has failed the Bernoulli roll and is being discarded.
    Failed,
}

/// An indivisible physical unit of capability.
///
/// `position` is only meaningful while the module sits in the depot; once a
/// module is attached to a worker its position tracks the worker's and is
/// not stored on the module itself (see `morota-sim::Worker`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Stable identity, preserved across depot/worker transfers.
    pub id: ModuleId,
    /// Type label.
    pub module_type: ModuleType,
    /// Position, meaningful only while the module is in the depot.
    pub position: Position,
    /// Cumulative fatigue. Monotonically nondecreasing while the module exists.
    pub fatigue: f64,
    /// Per-step fatigue delta accrued this step, reset to zero after the
    /// failure roll (§4.2).
    pub fatigue_delta: f64,
    /// Lifecycle state.
    pub state: ModuleState,
}

impl Module {
    /// Construct a fresh, healthy module with zero accrued fatigue.
    pub fn new(id: ModuleId, module_type: ModuleType, position: Position) -> Self {
        Self {
            id,
            module_type,
            position,
            fatigue: 0.0,
            fatigue_delta: 0.0,
            state: ModuleState::Healthy,
        }
    }

    /// Accrue fatigue for this step. `rate` is the per-second fatigue rate
    /// for this module's type under the current action; `dt` is the actual
    /// time spent performing that action this step.
    pub fn accrue_fatigue(&mut self, rate: f64, dt: f64) {
        debug_assert!(dt >= 0.0, "fatigue must accrue over non-negative time");
        let delta = (rate * dt).max(0.0);
        self.fatigue_delta += delta;
        self.fatigue += delta;
    }

    /// Reset the per-step fatigue delta. Called once per step, after the
    /// failure roll, for every module that did not fail.
    pub fn reset_fatigue_delta(&mut self) {
        self.fatigue_delta = 0.0;
    }

    /// Reset cumulative fatigue to zero. Used when a module is returned to
    /// service by a successful reconstruction.
    pub fn reset_fatigue(&mut self) {
        self.fatigue = 0.0;
        self.fatigue_delta = 0.0;
    }

    /// `true` once this module has failed.
    pub fn is_failed(&self) -> bool {
        self.state == ModuleState::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatigue_is_monotone_under_accrual() {
        let mut m = Module::new(ModuleId(0), ModuleType::from("Body"), Position::new(0.0, 0.0));
        m.accrue_fatigue(2.0, 1.0);
        assert_eq!(m.fatigue, 2.0);
        m.accrue_fatigue(2.0, 0.5);
        assert_eq!(m.fatigue, 3.0);
    }

    #[test]
    fn reset_fatigue_delta_preserves_cumulative() {
        let mut m = Module::new(ModuleId(1), ModuleType::from("Limb"), Position::new(0.0, 0.0));
        m.accrue_fatigue(1.0, 1.0);
        m.reset_fatigue_delta();
        assert_eq!(m.fatigue, 1.0);
        assert_eq!(m.fatigue_delta, 0.0);
    }
}
