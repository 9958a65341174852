//! Routing resolver: which records go to which endpoints.
//!
//! Routing is recomputed from scratch every run. Global endpoints apply to
//! every record; conditional endpoints apply to records carrying a group
//! tag the configuration maps to them. A record whose resolved endpoint set
//! is empty is excluded from the map entirely and stays untouched in the
//! spool.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use urd_core::{EndpointUrl, Record, RecordId, RoutingMap};

/// Static routing configuration for a run.
#[derive(Debug, Clone, Default)]
pub struct RoutingConfig {
    /// Endpoints every record is delivered to.
    pub global: Vec<EndpointUrl>,
    /// Group tag → endpoint for conditional routing.
    pub group_map: HashMap<String, EndpointUrl>,
}

impl RoutingConfig {
    /// Computes the routing map for the given records.
    pub fn resolve(&self, records: &[Record]) -> RoutingMap {
        let mut map = RoutingMap::new();

        for record in records {
            let mut endpoints: BTreeSet<EndpointUrl> = self.global.iter().cloned().collect();

            for group in &record.groups {
                if let Some(endpoint) = self.group_map.get(group) {
                    endpoints.insert(endpoint.clone());
                }
            }

            if !endpoints.is_empty() {
                map.insert(record.id.clone(), endpoints);
            }
        }

        map
    }
}

/// Inverts a routing map into endpoint → records needing delivery there.
///
/// Record lists are sorted so batch composition is deterministic across
/// runs with the same inputs.
pub fn invert(map: &RoutingMap) -> BTreeMap<EndpointUrl, Vec<RecordId>> {
    let mut inverted: BTreeMap<EndpointUrl, Vec<RecordId>> = BTreeMap::new();

    for (record, endpoints) in map {
        for endpoint in endpoints {
            inverted.entry(endpoint.clone()).or_default().push(record.clone());
        }
    }

    for records in inverted.values_mut() {
        records.sort();
    }

    inverted
}
