//! Property-value resolution table.
//!
//! Runtime get/set on instance properties is keyed by (instance, property
//! ordinal). The table maps each pair to a slot in the owning crew's shared
//! value buffer, so every member of a scaled instance sees the same value.

use std::collections::HashMap;

use heddle_core::Deployment;

/// A resolved property location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySlot {
    /// Index into the plan's crew table.
    pub crew: usize,
    /// Position in the crew's property buffer.
    pub index: usize,
}

/// (instance, property ordinal) → crew buffer slot.
#[derive(Debug, Default)]
pub struct PropertyTable {
    entries: HashMap<(usize, u32), PropertySlot>,
}

impl PropertyTable {
    /// Build the table from the declared properties of each instance's
    /// chosen implementation. Crew indices equal instance indices.
    pub fn build(deployments: &[Deployment]) -> Self {
        let mut entries = HashMap::new();
        for (instance, dep) in deployments.iter().enumerate() {
            for (index, prop) in dep.implementation().properties.iter().enumerate() {
                entries.insert((instance, prop.ordinal), PropertySlot { crew: instance, index });
            }
        }
        Self { entries }
    }

    pub fn resolve(&self, instance: usize, ordinal: u32) -> Option<PropertySlot> {
        self.entries.get(&(instance, ordinal)).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heddle_core::{CMap, Implementation, PropertySpec};
    use std::sync::Arc;

    fn dep_with_properties(ordinals: &[u32]) -> Deployment {
        let imp = Arc::new(Implementation {
            package: "dsp".to_string(),
            name: "w".to_string(),
            artifact: "dsp.art".to_string(),
            slot: 0,
            ports: Vec::new(),
            properties: ordinals
                .iter()
                .map(|&ordinal| PropertySpec { name: format!("p{ordinal}"), ordinal })
                .collect(),
            slaves: Vec::new(),
        });
        Deployment::unscaled(0, imp, CMap::from_ordinals([0]).unwrap(), false, 1)
    }

    #[test]
    fn resolves_declared_ordinals() {
        let table = PropertyTable::build(&[dep_with_properties(&[0, 4]), dep_with_properties(&[1])]);

        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve(0, 4), Some(PropertySlot { crew: 0, index: 1 }));
        assert_eq!(table.resolve(1, 1), Some(PropertySlot { crew: 1, index: 0 }));
    }

    #[test]
    fn unknown_pairs_resolve_to_none() {
        let table = PropertyTable::build(&[dep_with_properties(&[0])]);

        assert_eq!(table.resolve(0, 1), None);
        assert_eq!(table.resolve(1, 0), None);
    }
}
