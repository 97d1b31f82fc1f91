use crate::error::Result;
use crate::error::WorkflowError;
use crate::sync::LinkMatch;
use crate::template::Template;
use crate::template::UnitConfig;
use crate::unit;
use crate::unit::Unit;
use crate::unit::UnitEdit;
use crate::unit::UnitPath;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

/// An instantiated workflow tree. The template is snapshotted at creation so
/// later template edits never reshape existing flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flow {
    pub id: String,
    pub name: String,
    pub template_id: String,
    pub template_snapshot: Template,
    pub data: Vec<Unit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Flow {
    pub fn instantiate(template: &Template, name: impl Into<String>) -> Self {
        Self {
            id: crate::new_id(),
            name: name.into(),
            template_id: template.id.clone(),
            template_snapshot: template.clone(),
            data: Vec::new(),
            created_at: Some(Utc::now()),
        }
    }

    /// New flow whose tree is a fresh-id copy of `source`, outside any share
    /// group. The returned table maps every source unit id to its copy.
    pub fn copy_of(source: &Flow, name: impl Into<String>) -> (Self, HashMap<String, String>) {
        let mut flow = Self::instantiate(&source.template_snapshot, name);
        flow.template_id = source.template_id.clone();
        let mut mapping = HashMap::new();
        for root in &source.data {
            let (mut copy, ids) = root.clone_with_fresh_ids();
            copy.clear_share_keys();
            mapping.extend(ids);
            flow.data.push(copy);
        }
        (flow, mapping)
    }

    pub fn levels(&self) -> usize {
        self.template_snapshot.levels.len()
    }

    pub fn unit_config(&self, depth: usize) -> Result<&UnitConfig> {
        self.template_snapshot
            .unit_config(depth)
            .ok_or_else(|| WorkflowError::DepthExceeded {
                template: self.template_snapshot.name.clone(),
                depth,
                levels: self.levels(),
            })
    }

    pub fn resolve(&self, path: &UnitPath) -> Option<&Unit> {
        unit::resolve(&self.data, path)
    }

    pub fn resolve_mut(&mut self, path: &UnitPath) -> Option<&mut Unit> {
        unit::resolve_mut(&mut self.data, path)
    }

    fn stale(&self, path: &UnitPath) -> WorkflowError {
        WorkflowError::StalePath {
            flow_id: self.id.clone(),
            path: path.clone(),
        }
    }

    /// Adds a new unit under `parent` (the root path adds a depth-0 unit).
    pub fn add_unit(&mut self, parent: &UnitPath, name: &str) -> Result<UnitPath> {
        let depth = parent.indices().len();
        let config = self.unit_config(depth)?.clone();
        if !parent.is_root() && self.resolve(parent).is_none() {
            return Err(self.stale(parent));
        }
        let levels = self.levels();
        unit::insert_child(&mut self.data, parent, Unit::new(name, &config), levels)
            .ok_or_else(|| self.stale(parent))
    }

    /// Attaches an existing subtree under `parent`, provided it fits within
    /// the remaining levels. Optional fields are conformed to the levels the
    /// subtree lands on.
    pub fn attach(&mut self, parent: &UnitPath, mut subtree: Unit) -> Result<UnitPath> {
        let depth = parent.indices().len();
        let height = subtree_height(&subtree);
        if depth + height > self.levels() {
            return Err(WorkflowError::DepthExceeded {
                template: self.template_snapshot.name.clone(),
                depth: depth + height - 1,
                levels: self.levels(),
            });
        }
        unit::conform(&mut subtree, &self.template_snapshot, depth);
        let levels = self.levels();
        unit::insert_child(&mut self.data, parent, subtree, levels).ok_or_else(|| self.stale(parent))
    }

    /// Removes a unit together with its subtree.
    pub fn delete_unit(&mut self, path: &UnitPath) -> Result<Unit> {
        unit::remove(&mut self.data, path).ok_or_else(|| self.stale(path))
    }

    pub fn edit_unit(&mut self, path: &UnitPath, edit: &UnitEdit) -> Result<()> {
        let config = self.unit_config(path.depth())?.clone();
        edit.check(&config, path.depth())?;
        let stale = self.stale(path);
        let target = self.resolve_mut(path).ok_or(stale)?;
        edit.apply(target);
        Ok(())
    }

    pub fn move_unit(&mut self, path: &UnitPath, offset: isize) -> Result<UnitPath> {
        unit::move_within_siblings(&mut self.data, path, offset).ok_or_else(|| self.stale(path))
    }

    pub fn live_ids(&self) -> HashSet<String> {
        unit::collect_ids(&self.data)
    }

    pub fn tags(&self) -> BTreeSet<String> {
        unit::collect_tags(&self.data)
    }
}

fn subtree_height(unit: &Unit) -> usize {
    1 + unit
        .subcategories
        .iter()
        .map(subtree_height)
        .max()
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowSettings {
    pub enforce_sequence: bool,
    pub link_match: LinkMatch,
}

/// The persisted `{settings, flows}` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowDocument {
    pub settings: WorkflowSettings,
    pub flows: Vec<Flow>,
}

impl WorkflowDocument {
    pub fn flow(&self, flow_id: &str) -> Result<&Flow> {
        self.flows
            .iter()
            .find(|f| f.id == flow_id)
            .ok_or_else(|| WorkflowError::UnknownFlow(flow_id.to_string()))
    }

    pub fn flow_mut(&mut self, flow_id: &str) -> Result<&mut Flow> {
        self.flows
            .iter_mut()
            .find(|f| f.id == flow_id)
            .ok_or_else(|| WorkflowError::UnknownFlow(flow_id.to_string()))
    }

    pub fn remove_flow(&mut self, flow_id: &str) -> Result<Flow> {
        let index = self
            .flows
            .iter()
            .position(|f| f.id == flow_id)
            .ok_or_else(|| WorkflowError::UnknownFlow(flow_id.to_string()))?;
        Ok(self.flows.remove(index))
    }
}
