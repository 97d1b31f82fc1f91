//! Copying subtrees inside one workflow document.
//!
//! A cloned subtree is an independent copy. A shared subtree tags every
//! original node and its copy with the same share key; content edits to any
//! member of a key then fan out to all members, and deleting a member deletes
//! all of them. Completion of the origin is copied once when the share is
//! created and is not kept in sync afterwards.

use crate::error::Result;
use crate::error::WorkflowError;
use crate::execution::ExecutionStore;
use crate::flow::WorkflowDocument;
use crate::unit;
use crate::unit::Unit;
use crate::unit::UnitEdit;
use crate::unit::UnitPath;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    Clone,
    Share,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitRef {
    pub flow_id: String,
    pub path: UnitPath,
}

/// `share key -> members` over a whole document. Paths go stale on the next
/// structural edit, so the index is rebuilt for every operation that needs it.
#[derive(Debug, Default)]
pub struct ShareIndex {
    groups: HashMap<String, Vec<UnitRef>>,
}

impl ShareIndex {
    pub fn build(workflows: &WorkflowDocument) -> Self {
        let mut groups: HashMap<String, Vec<UnitRef>> = HashMap::new();
        for flow in &workflows.flows {
            unit::walk(&flow.data, &mut |unit, _, path| {
                if let Some(key) = &unit.share_key {
                    groups.entry(key.clone()).or_default().push(UnitRef {
                        flow_id: flow.id.clone(),
                        path: path.clone(),
                    });
                }
            });
        }
        Self { groups }
    }

    pub fn members(&self, share_key: &str) -> &[UnitRef] {
        self.groups.get(share_key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Two distinct flows among `flow_ids` that hold members of the same
    /// share group, if any.
    pub fn shared_between(&self, flow_ids: &[String]) -> Option<(String, String)> {
        self.groups.values().find_map(|members| {
            let mut flows = members
                .iter()
                .map(|member| &member.flow_id)
                .filter(|flow_id| flow_ids.contains(*flow_id));
            let first = flows.next()?;
            flows
                .find(|flow_id| *flow_id != first)
                .map(|second| (first.clone(), second.clone()))
        })
    }
}

fn stale(flow_id: &str, path: &UnitPath) -> WorkflowError {
    WorkflowError::StalePath {
        flow_id: flow_id.to_string(),
        path: path.clone(),
    }
}

/// Copies the subtree at `from` under `to_parent` in `to_flow`. Returns the
/// path of the new copy.
pub fn import_unit(
    workflows: &mut WorkflowDocument,
    executions: &mut ExecutionStore,
    from: &UnitRef,
    to_flow: &str,
    to_parent: &UnitPath,
    mode: ImportMode,
) -> Result<UnitPath> {
    let source_flow = workflows.flow_mut(&from.flow_id)?;
    let origin = source_flow
        .resolve_mut(&from.path)
        .ok_or_else(|| stale(&from.flow_id, &from.path))?;

    let copy = match mode {
        ImportMode::Clone => {
            let (mut copy, _) = origin.clone_with_fresh_ids();
            copy.clear_share_keys();
            copy
        }
        ImportMode::Share => {
            assign_share_keys(origin);
            let (copy, mapping) = origin.clone_with_fresh_ids();
            for (origin_id, copy_id) in &mapping {
                if executions.is_completed(&from.flow_id, origin_id) {
                    executions.set_completed(to_flow, copy_id, true);
                }
            }
            copy
        }
    };

    let share_key = copy.share_key.clone();
    let path = workflows.flow_mut(to_flow)?.attach(to_parent, copy)?;
    info!(
        from_flow = %from.flow_id,
        to_flow,
        path = %path,
        shared = share_key.is_some(),
        "imported unit"
    );
    Ok(path)
}

fn assign_share_keys(unit: &mut Unit) {
    if unit.share_key.is_none() {
        unit.share_key = Some(unit.id.clone());
    }
    for child in &mut unit.subcategories {
        assign_share_keys(child);
    }
}

/// Applies `edit` to the unit at `target` and fans the shareable part of it
/// (name, description, tags, grade) out to every member of its share group.
/// Members on levels without a given capability skip that field. Returns the
/// other members that were updated.
pub fn apply_shared_edit(
    workflows: &mut WorkflowDocument,
    target: &UnitRef,
    edit: &UnitEdit,
) -> Result<Vec<UnitRef>> {
    let flow = workflows.flow_mut(&target.flow_id)?;
    flow.edit_unit(&target.path, edit)?;
    let share_key = flow
        .resolve(&target.path)
        .and_then(|unit| unit.share_key.clone());
    let Some(share_key) = share_key else {
        return Ok(Vec::new());
    };

    let fan_out = UnitEdit {
        name: edit.name.clone(),
        description: edit.description.clone(),
        tags: edit.tags.clone(),
        grade: edit.grade,
        ..Default::default()
    };
    if fan_out.is_empty() {
        return Ok(Vec::new());
    }

    let index = ShareIndex::build(workflows);
    let mut updated = Vec::new();
    for member in index.members(&share_key) {
        if member == target {
            continue;
        }
        let flow = workflows.flow_mut(&member.flow_id)?;
        let config = flow.unit_config(member.path.depth())?;
        let allowed = fan_out.restricted_to(config);
        if let Some(unit) = flow.resolve_mut(&member.path) {
            allowed.apply(unit);
            updated.push(member.clone());
        }
    }
    Ok(updated)
}

/// Deletes the unit at `target`; when it is shared, every member of its
/// share group goes with it. Completion records of all touched flows are
/// reconciled. Returns the removed locations.
pub fn delete_shared(
    workflows: &mut WorkflowDocument,
    executions: &mut ExecutionStore,
    target: &UnitRef,
) -> Result<Vec<UnitRef>> {
    let share_key = workflows
        .flow(&target.flow_id)?
        .resolve(&target.path)
        .ok_or_else(|| stale(&target.flow_id, &target.path))?
        .share_key
        .clone();

    let mut members = match &share_key {
        Some(key) => ShareIndex::build(workflows).members(key).to_vec(),
        None => vec![target.clone()],
    };
    // Deepest and right-most first so earlier paths stay valid.
    members.sort_unstable_by(|a, b| b.cmp(a));

    let mut removed = Vec::new();
    for member in members {
        let flow = workflows.flow_mut(&member.flow_id)?;
        if flow.delete_unit(&member.path).is_ok() {
            removed.push(member);
        }
    }

    let mut touched: Vec<&str> = removed.iter().map(|m| m.flow_id.as_str()).collect();
    touched.sort_unstable();
    touched.dedup();
    for flow_id in touched {
        let live_ids = workflows.flow(flow_id)?.live_ids();
        executions.reconcile(flow_id, &live_ids);
    }
    if let Some(key) = share_key {
        info!(share_key = %key, removed = removed.len(), "deleted share group");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Flow;
    use crate::template::tests::audit_template;
    use pretty_assertions::assert_eq;

    fn document() -> WorkflowDocument {
        let template = audit_template();
        let mut a = Flow::instantiate(&template, "A");
        a.id = "a".into();
        let area = a.add_unit(&UnitPath::root(), "Access").expect("area");
        let control = a.add_unit(&area, "Badges").expect("control");
        a.add_unit(&control, "Badge log").expect("check");
        a.add_unit(&control, "Visitor log").expect("check");
        let mut b = Flow::instantiate(&template, "B");
        b.id = "b".into();
        b.add_unit(&UnitPath::root(), "Physical").expect("area");
        WorkflowDocument {
            flows: vec![a, b],
            ..Default::default()
        }
    }

    fn at(flow_id: &str, path: &[usize]) -> UnitRef {
        UnitRef {
            flow_id: flow_id.to_string(),
            path: UnitPath::from(path.to_vec()),
        }
    }

    #[test]
    fn clone_is_independent() {
        let mut doc = document();
        let mut exec = ExecutionStore::default();
        let path = import_unit(
            &mut doc,
            &mut exec,
            &at("a", &[0, 0]),
            "b",
            &UnitPath::from(vec![0]),
            ImportMode::Clone,
        )
        .expect("import");
        assert_eq!(path, UnitPath::from(vec![0, 0]));
        let copy = doc.flow("b").expect("b").resolve(&path).expect("copy").clone();
        assert_eq!(copy.share_key, None);
        assert_eq!(copy.subcategories.len(), 2);

        let edit = UnitEdit {
            name: Some("Renamed".into()),
            ..Default::default()
        };
        let updated = apply_shared_edit(&mut doc, &at("b", &[0, 0]), &edit).expect("edit");
        assert!(updated.is_empty());
        assert_eq!(doc.flow("a").expect("a").data[0].subcategories[0].name, "Badges");
    }

    #[test]
    fn shared_edits_fan_out() {
        let mut doc = document();
        let mut exec = ExecutionStore::default();
        import_unit(
            &mut doc,
            &mut exec,
            &at("a", &[0, 0]),
            "b",
            &UnitPath::from(vec![0]),
            ImportMode::Share,
        )
        .expect("import");

        let edit = UnitEdit {
            name: Some("Badge audit".into()),
            tags: Some(vec!["iso".into()]),
            ..Default::default()
        };
        let updated = apply_shared_edit(&mut doc, &at("b", &[0, 0]), &edit).expect("edit");
        assert_eq!(updated, vec![at("a", &[0, 0])]);
        let origin = &doc.flow("a").expect("a").data[0].subcategories[0];
        assert_eq!(origin.name, "Badge audit");
        assert_eq!(origin.tags, vec!["iso"]);

        // Nested members form their own groups.
        let edit = UnitEdit {
            grade: Some(4.0),
            ..Default::default()
        };
        apply_shared_edit(&mut doc, &at("a", &[0, 0, 1]), &edit).expect("edit");
        let copy = &doc.flow("b").expect("b").data[0].subcategories[0].subcategories[1];
        assert_eq!(copy.grade, Some(4.0));
    }

    #[test]
    fn completion_is_mirrored_once() {
        let mut doc = document();
        let mut exec = ExecutionStore::default();
        let check_id = doc.flow("a").expect("a").data[0].subcategories[0].subcategories[0]
            .id
            .clone();
        exec.set_completed("a", &check_id, true);
        let path = import_unit(
            &mut doc,
            &mut exec,
            &at("a", &[0, 0]),
            "b",
            &UnitPath::from(vec![0]),
            ImportMode::Share,
        )
        .expect("import");
        let copy_check = doc.flow("b").expect("b").resolve(&path.child(0)).expect("copy").id.clone();
        assert!(exec.is_completed("b", &copy_check));

        exec.set_completed("a", &check_id, false);
        assert!(exec.is_completed("b", &copy_check));
    }

    #[test]
    fn deleting_a_member_deletes_the_group() {
        let mut doc = document();
        let mut exec = ExecutionStore::default();
        let path = import_unit(
            &mut doc,
            &mut exec,
            &at("a", &[0, 0]),
            "b",
            &UnitPath::from(vec![0]),
            ImportMode::Share,
        )
        .expect("import");
        let copy_check = doc.flow("b").expect("b").resolve(&path.child(1)).expect("copy").id.clone();
        exec.set_completed("b", &copy_check, true);

        let removed = delete_shared(&mut doc, &mut exec, &at("a", &[0, 0])).expect("delete");
        assert_eq!(removed, vec![at("b", &[0, 0]), at("a", &[0, 0])]);
        assert!(doc.flow("a").expect("a").data[0].subcategories.is_empty());
        assert!(doc.flow("b").expect("b").data[0].subcategories.is_empty());
        assert!(!exec.is_completed("b", &copy_check));
        assert!(exec.record("b").expect("record").completed.is_empty());
    }

    #[test]
    fn shared_between_reports_flows_holding_one_group() {
        let mut doc = document();
        let mut exec = ExecutionStore::default();
        let flows = vec!["a".to_string(), "b".to_string()];
        assert_eq!(ShareIndex::build(&doc).shared_between(&flows), None);

        import_unit(
            &mut doc,
            &mut exec,
            &at("a", &[0, 0]),
            "b",
            &UnitPath::from(vec![0]),
            ImportMode::Share,
        )
        .expect("import");
        let index = ShareIndex::build(&doc);
        let (first, second) = index.shared_between(&flows).expect("spans both");
        assert_ne!(first, second);
        assert_eq!(index.shared_between(&["a".to_string()]), None);
    }

    #[test]
    fn deleting_unshared_unit_touches_only_it() {
        let mut doc = document();
        let mut exec = ExecutionStore::default();
        let removed = delete_shared(&mut doc, &mut exec, &at("a", &[0, 0, 1])).expect("delete");
        assert_eq!(removed, vec![at("a", &[0, 0, 1])]);
        assert_eq!(doc.flow("a").expect("a").data[0].subcategories[0].subcategories.len(), 1);
        assert!(delete_shared(&mut doc, &mut exec, &at("a", &[0, 0, 1])).is_err());
    }
}
