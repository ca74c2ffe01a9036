use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::ModuleType;

/// Name of a robot type, as declared in `robot_setup.robot_types`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RobotTypeName(pub String);

impl std::fmt::Display for RobotTypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RobotTypeName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Immutable configuration of one robot type: the modules it needs and its
/// nominal performance once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotTypeSpec {
    /// Name of this robot type.
    pub name: RobotTypeName,
    /// Exact module counts required to realize this type.
    pub required_modules: HashMap<ModuleType, u32>,
    /// Nominal speed once built (units/second).
    pub speed: f64,
    /// Nominal throughput once built (work-units/second).
    pub throughput: f64,
    /// `type_priority` value: smaller means higher priority when a module
    /// set satisfies more than one type's requirements.
    pub priority: i64,
}

impl RobotTypeSpec {
    /// `true` if `counts` has at least the required quantity of every module
    /// type this robot needs.
    pub fn is_satisfied_by(&self, counts: &HashMap<ModuleType, u32>) -> bool {
        self.required_modules
            .iter()
            .all(|(ty, need)| counts.get(ty).copied().unwrap_or(0) >= *need)
    }

    /// The deficit of `counts` against this type's requirement: for every
    /// type still short, how many more modules are needed. Types fully
    /// covered are omitted.
    pub fn deficit(&self, counts: &HashMap<ModuleType, u32>) -> HashMap<ModuleType, u32> {
        self.required_modules
            .iter()
            .filter_map(|(ty, need)| {
                let have = counts.get(ty).copied().unwrap_or(0);
                (have < *need).then(|| (ty.clone(), need - have))
            })
            .collect()
    }

    /// Total number of modules this type requires, across all types.
    pub fn total_required(&self) -> u32 {
        self.required_modules.values().sum()
    }
}

/// Resolve the realized robot type from a module-count snapshot: the
/// highest-priority (lowest `priority` value) spec whose requirements are
/// fully met, or `None` if no type matches (§3 "realized type").
///
/// `specs` need not be pre-sorted; this function sorts a local copy of the
/// references by `priority` ascending before searching, per `type_priority`
/// ("smaller = higher priority").
pub fn resolve_realized_type<'a>(
    specs: impl IntoIterator<Item = &'a RobotTypeSpec>,
    counts: &HashMap<ModuleType, u32>,
) -> Option<&'a RobotTypeSpec> {
    let mut ordered: Vec<&RobotTypeSpec> = specs.into_iter().collect();
    ordered.sort_by_key(|s| s.priority);
    ordered.into_iter().find(|s| s.is_satisfied_by(counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, priority: i64, reqs: &[(&str, u32)]) -> RobotTypeSpec {
        RobotTypeSpec {
            name: RobotTypeName::from(name),
            required_modules: reqs
                .iter()
                .map(|(t, c)| (ModuleType::from(*t), *c))
                .collect(),
            speed: 1.0,
            throughput: 1.0,
            priority,
        }
    }

    #[test]
    fn priority_breaks_ties() {
        let a = spec("A", 0, &[("Body", 1)]);
        let b = spec("B", 1, &[("Body", 1)]);
        let counts = HashMap::from([(ModuleType::from("Body"), 1)]);
        let resolved = resolve_realized_type([&b, &a], &counts).unwrap();
        assert_eq!(resolved.name, a.name);
    }

    #[test]
    fn unresolved_when_no_spec_matches() {
        let a = spec("A", 0, &[("Body", 1), ("Wheel", 2)]);
        let counts = HashMap::from([(ModuleType::from("Body"), 1)]);
        assert!(resolve_realized_type([&a], &counts).is_none());
    }

    #[test]
    fn deficit_only_lists_short_types() {
        let a = spec("A", 0, &[("Body", 1), ("Wheel", 2)]);
        let counts = HashMap::from([(ModuleType::from("Body"), 1), (ModuleType::from("Wheel"), 1)]);
        let d = a.deficit(&counts);
        assert_eq!(d.get(&ModuleType::from("Wheel")), Some(&1));
        assert!(!d.contains_key(&ModuleType::from("Body")));
    }
}
