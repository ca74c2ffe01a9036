use std::collections::HashMap;

use morota_common::{Module, ModuleId, ModuleState, ModuleType, MorotaError};

/// The shared module inventory.
///
/// Exposes exactly three operations (§4.3): `count_by_type` (a read-only
/// snapshot), `take` (atomic-or-nothing withdrawal), and `put` (batch
/// return). Mutations only ever happen at the three call sites named in
/// §5: the configuration planner's enaction pass, a worker's reconstruction
/// completion, and worker retirement.
#[derive(Debug, Clone, Default)]
pub struct Depot {
    stock: HashMap<ModuleType, Vec<Module>>,
    ids: std::collections::HashSet<ModuleId>,
}

impl Depot {
    /// Build a depot from an initial inventory. Fails fatally
    /// (`MorotaError::DuplicateModuleId`) if two modules share an id,
    /// matching §4.3's initialization contract.
    pub fn new(modules: impl IntoIterator<Item = Module>) -> Result<Self, MorotaError> {
        let mut depot = Self::default();
        for module in modules {
            if !depot.ids.insert(module.id) {
                return Err(MorotaError::DuplicateModuleId(module.id));
            }
            depot
                .stock
                .entry(module.module_type.clone())
                .or_default()
                .push(module);
        }
        Ok(depot)
    }

    /// Snapshot of the per-type module count, O(types).
    pub fn count_by_type(&self) -> HashMap<ModuleType, u32> {
        self.stock
            .iter()
            .map(|(ty, modules)| (ty.clone(), modules.len() as u32))
            .collect()
    }

    /// Total modules held across all types.
    pub fn total_count(&self) -> u32 {
        self.stock.values().map(|v| v.len() as u32).sum()
    }

    /// Whether a module id currently sits in the depot.
    pub fn contains(&self, id: ModuleId) -> bool {
        self.ids.contains(&id)
    }

    /// Withdraw exactly `request` modules per type, atomically: either every
    /// type's request is satisfied and the modules are removed and
    /// returned, or nothing is mutated and `None` is returned.
    ///
    /// Which specific module is popped per type is unspecified (last-in
    /// first-out here); only type counts are part of the observable
    /// contract (§4.3).
    pub fn take(&mut self, request: &HashMap<ModuleType, u32>) -> Option<Vec<Module>> {
        for (ty, need) in request {
            if self.stock.get(ty).map(|v| v.len() as u32).unwrap_or(0) < *need {
                return None;
            }
        }
        let mut granted = Vec::new();
        for (ty, need) in request {
            let bucket = self.stock.get_mut(ty).expect("checked above");
            for _ in 0..*need {
                let module = bucket.pop().expect("checked above");
                self.ids.remove(&module.id);
                granted.push(module);
            }
        }
        Some(granted)
    }

    /// Return a batch of modules to the depot. Failed modules are silently
    /// dropped. Rejects (fatally) the entire batch if any module's id
    /// already exists in the depot, since that indicates a bookkeeping bug
    /// (§4.3).
    pub fn put(&mut self, modules: impl IntoIterator<Item = Module>) -> Result<(), MorotaError> {
        let incoming: Vec<Module> = modules
            .into_iter()
            .filter(|m| m.state != ModuleState::Failed)
            .collect();
        for m in &incoming {
            if self.ids.contains(&m.id) {
                return Err(MorotaError::DuplicateModuleId(m.id));
            }
        }
        for m in incoming {
            self.ids.insert(m.id);
            self.stock.entry(m.module_type.clone()).or_default().push(m);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use morota_common::Position;

    fn module(id: u64, ty: &str) -> Module {
        Module::new(ModuleId(id), ModuleType::from(ty), Position::new(0.0, 0.0))
    }

    #[test]
    fn duplicate_id_is_fatal_at_init() {
        let result = Depot::new([module(1, "Body"), module(1, "Limb")]);
        assert!(matches!(result, Err(MorotaError::DuplicateModuleId(ModuleId(1)))));
    }

    #[test]
    fn take_put_round_trip_restores_counts() {
        let mut depot = Depot::new([module(1, "Body"), module(2, "Body"), module(3, "Limb")]).unwrap();
        let before = depot.count_by_type();
        let req = HashMap::from([(ModuleType::from("Body"), 2), (ModuleType::from("Limb"), 1)]);
        let taken = depot.take(&req).unwrap();
        assert_eq!(taken.len(), 3);
        assert_eq!(depot.total_count(), 0);
        depot.put(taken).unwrap();
        assert_eq!(depot.count_by_type(), before);
    }

    #[test]
    fn take_infeasible_leaves_counts_unchanged() {
        let mut depot = Depot::new([module(1, "Body")]).unwrap();
        let before = depot.count_by_type();
        let req = HashMap::from([(ModuleType::from("Body"), 5)]);
        assert!(depot.take(&req).is_none());
        assert_eq!(depot.count_by_type(), before);
    }

    #[test]
    fn put_drops_failed_modules_silently() {
        let mut depot = Depot::new([]).unwrap();
        let mut failed = module(9, "Wheel");
        failed.state = ModuleState::Failed;
        depot.put([failed]).unwrap();
        assert_eq!(depot.total_count(), 0);
    }

    #[test]
    fn put_duplicate_id_is_fatal() {
        let mut depot = Depot::new([module(1, "Body")]).unwrap();
        let result = depot.put([module(1, "Limb")]);
        assert!(matches!(result, Err(MorotaError::DuplicateModuleId(ModuleId(1)))));
    }
}
