//! Capability resolution
//!
//! Employees and workstations are each bound to a set of responsibilities
//! (service types with a priority weight). A ticket can only be served where
//! the seated employee *and* the workstation are authorized for its service,
//! so the assignment algorithm works on the intersection of the two sets.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::database::QueueStore;
use crate::error::Result;
use crate::ticket::{EmployeeId, WorkstationId};

/// Entity whose capabilities are being resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Employee(EmployeeId),
    Workstation(WorkstationId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Employee(id) => write!(f, "employee {}", id),
            EntityRef::Workstation(id) => write!(f, "workstation {}", id),
        }
    }
}

/// A service type an entity may handle, with its priority weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub service_type: String,
    /// Higher is served first
    pub priority: i64,
}

impl Capability {
    pub fn new(service_type: impl Into<String>, priority: i64) -> Self {
        Self {
            service_type: service_type.into(),
            priority,
        }
    }
}

/// Set of capabilities keyed by service type name.
///
/// Insertion order is kept; a repeated service name keeps its first weight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    entries: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new(capabilities: impl IntoIterator<Item = Capability>) -> Self {
        let mut set = Self::default();
        for capability in capabilities {
            set.insert(capability);
        }
        set
    }

    /// Insert a capability unless the service is already present.
    pub fn insert(&mut self, capability: Capability) -> bool {
        if self.contains(&capability.service_type) {
            return false;
        }
        self.entries.push(capability);
        true
    }

    pub fn contains(&self, service_type: &str) -> bool {
        self.priority_of(service_type).is_some()
    }

    /// Weight the set assigns to `service_type`
    pub fn priority_of(&self, service_type: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|c| c.service_type == service_type)
            .map(|c| c.priority)
    }

    /// Services present in both sets, weighted as in `self`.
    pub fn intersect(&self, other: &CapabilitySet) -> CapabilitySet {
        CapabilitySet {
            entries: self
                .entries
                .iter()
                .filter(|c| other.contains(&c.service_type))
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<T: IntoIterator<Item = Capability>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Reads capability bindings from the store
#[derive(Clone)]
pub struct CapabilityResolver {
    store: Arc<dyn QueueStore>,
}

impl CapabilityResolver {
    /// Create a new resolver over `store`
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Capabilities bound to `entity`. An entity with no bindings, or one that
    /// does not exist, resolves to an empty set.
    pub async fn capabilities_of(&self, entity: EntityRef) -> Result<CapabilitySet> {
        let set: CapabilitySet = self.store.capabilities_of(entity).await?.into_iter().collect();
        debug!("Resolved {} capabilities for {}", set.len(), entity);
        Ok(set)
    }

    /// Services both the employee and the workstation may handle.
    ///
    /// Either lookup failing aborts before anything is returned.
    pub async fn shared_capabilities(
        &self,
        employee_id: EmployeeId,
        workstation_id: WorkstationId,
    ) -> Result<CapabilitySet> {
        let employee = self.capabilities_of(EntityRef::Employee(employee_id)).await?;
        let workstation = self.capabilities_of(EntityRef::Workstation(workstation_id)).await?;
        Ok(employee.intersect(&workstation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[(&str, i64)]) -> CapabilitySet {
        items.iter().map(|(name, p)| Capability::new(*name, *p)).collect()
    }

    #[test]
    fn test_intersection_by_service_name() {
        let employee = set(&[("Passport", 5), ("Visa", 3), ("Taxes", 1)]);
        let workstation = set(&[("Visa", 3), ("Passport", 5), ("Pensions", 2)]);

        let shared = employee.intersect(&workstation);
        let names: Vec<_> = shared.iter().map(|c| c.service_type.as_str()).collect();
        assert_eq!(names, vec!["Passport", "Visa"]);
        assert!(!shared.contains("Taxes"));
        assert!(!shared.contains("Pensions"));
    }

    #[test]
    fn test_intersection_keeps_own_weight() {
        let employee = set(&[("Passport", 7)]);
        let workstation = set(&[("Passport", 5)]);

        assert_eq!(employee.intersect(&workstation).priority_of("Passport"), Some(7));
    }

    #[test]
    fn test_disjoint_or_empty_sets() {
        let employee = set(&[("Passport", 5)]);
        assert!(employee.intersect(&set(&[("Visa", 3)])).is_empty());
        assert!(employee.intersect(&CapabilitySet::default()).is_empty());
        assert!(CapabilitySet::default().intersect(&employee).is_empty());
    }

    #[test]
    fn test_duplicate_service_keeps_first_weight() {
        let mut caps = set(&[("Passport", 5)]);
        assert!(!caps.insert(Capability::new("Passport", 9)));
        assert_eq!(caps.len(), 1);
        assert_eq!(caps.priority_of("Passport"), Some(5));
    }
}
