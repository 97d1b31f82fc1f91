use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::HashSet;
use tracing::debug;

/// Completion side table of a single flow, keyed by unit id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionRecord {
    pub completed: BTreeMap<String, bool>,
}

impl ExecutionRecord {
    /// Unknown ids read as not completed.
    pub fn is_completed(&self, unit_id: &str) -> bool {
        self.completed.get(unit_id).copied().unwrap_or(false)
    }

    pub fn set_completed(&mut self, unit_id: &str, completed: bool) {
        self.completed.insert(unit_id.to_string(), completed);
    }

    /// Drops every entry whose id is not in `live_ids`. Returns how many
    /// entries were removed.
    pub fn reconcile(&mut self, live_ids: &HashSet<String>) -> usize {
        let before = self.completed.len();
        self.completed.retain(|id, _| live_ids.contains(id));
        before - self.completed.len()
    }
}

/// The persisted `{flows: {flowId: {completed: {...}}}}` document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionStore {
    pub flows: BTreeMap<String, ExecutionRecord>,
}

impl ExecutionStore {
    /// Record for `flow_id`, created empty on first access.
    pub fn ensure(&mut self, flow_id: &str) -> &mut ExecutionRecord {
        self.flows.entry(flow_id.to_string()).or_default()
    }

    pub fn record(&self, flow_id: &str) -> Option<&ExecutionRecord> {
        self.flows.get(flow_id)
    }

    pub fn is_completed(&self, flow_id: &str, unit_id: &str) -> bool {
        self.record(flow_id)
            .is_some_and(|record| record.is_completed(unit_id))
    }

    pub fn set_completed(&mut self, flow_id: &str, unit_id: &str, completed: bool) {
        self.ensure(flow_id).set_completed(unit_id, completed);
    }

    pub fn reconcile(&mut self, flow_id: &str, live_ids: &HashSet<String>) {
        let Some(record) = self.flows.get_mut(flow_id) else {
            return;
        };
        let removed = record.reconcile(live_ids);
        if removed > 0 {
            debug!(flow_id, removed, "purged completion entries for deleted units");
        }
    }

    pub fn remove_flow(&mut self, flow_id: &str) -> Option<ExecutionRecord> {
        self.flows.remove(flow_id)
    }
}
