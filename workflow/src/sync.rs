//! Structural propagation between linked flows.
//!
//! Propagation copies the source flow's tree onto every other member of its
//! link group. Target units that correspond to a source unit keep their own
//! id, so the target's completion record stays attached to them; units the
//! source added get fresh ids, and completion entries for units the source
//! removed are reconciled away.
//!
//! Correspondence is decided per sibling group by [`LinkMatch`]. With
//! `Position`, the unit at index `i` in the target corresponds to index `i`
//! in the source, so reordering source siblings moves completion state along
//! with the position rather than with the logical item. `Name` pairs
//! siblings that share a name first and only falls back to position for the
//! rest. Both strategies are deterministic: propagating an unchanged source
//! twice leaves the target untouched the second time.

use crate::error::Result;
use crate::error::WorkflowError;
use crate::execution::ExecutionStore;
use crate::flow::WorkflowDocument;
use crate::link::LinkRegistry;
use crate::unit::Unit;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;
use tracing::info;
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMatch {
    #[default]
    Position,
    Name,
}

/// `source id -> target id` for every copied unit. Matched units map to the
/// target's existing id, which may equal the source id.
pub type IdRemap = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct RemappedTree {
    pub data: Vec<Unit>,
    pub remap: IdRemap,
    /// Ids minted for source units that had no counterpart in the target.
    pub fresh: Vec<String>,
}

/// Copies `source` onto the shape of `target`, reusing target ids wherever a
/// counterpart exists.
pub fn remap_tree(source: &[Unit], target: &[Unit], strategy: LinkMatch) -> RemappedTree {
    let mut remap = IdRemap::new();
    let mut fresh = Vec::new();
    let data = rebuild(source, target, strategy, &mut remap, &mut fresh);
    RemappedTree { data, remap, fresh }
}

fn rebuild(
    source: &[Unit],
    target: &[Unit],
    strategy: LinkMatch,
    remap: &mut IdRemap,
    fresh: &mut Vec<String>,
) -> Vec<Unit> {
    let matches = match_siblings(source, target, strategy);
    source
        .iter()
        .zip(matches)
        .map(|(src, matched)| {
            let counterpart = matched.map(|index| &target[index]);
            let id = match counterpart {
                Some(existing) => existing.id.clone(),
                None => {
                    let id = crate::new_id();
                    fresh.push(id.clone());
                    id
                }
            };
            remap.insert(src.id.clone(), id.clone());
            let mut unit = Unit {
                id,
                share_key: counterpart.and_then(|existing| existing.share_key.clone()),
                ..Unit::default()
            };
            unit.copy_content_from(src);
            let target_children = counterpart
                .map(|existing| existing.subcategories.as_slice())
                .unwrap_or_default();
            unit.subcategories =
                rebuild(&src.subcategories, target_children, strategy, remap, fresh);
            unit
        })
        .collect()
}

/// For each source sibling, the index of its target counterpart.
fn match_siblings(source: &[Unit], target: &[Unit], strategy: LinkMatch) -> Vec<Option<usize>> {
    let mut matches: Vec<Option<usize>> = vec![None; source.len()];
    let mut claimed = vec![false; target.len()];

    if strategy == LinkMatch::Name {
        for (slot, src) in matches.iter_mut().zip(source) {
            let found = target
                .iter()
                .enumerate()
                .find(|(index, t)| !claimed[*index] && t.name == src.name)
                .map(|(index, _)| index);
            if let Some(index) = found {
                claimed[index] = true;
                *slot = Some(index);
            }
        }
    }

    for (index, slot) in matches.iter_mut().enumerate() {
        if slot.is_none() && index < target.len() && !claimed[index] {
            claimed[index] = true;
            *slot = Some(index);
        }
    }
    matches
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTarget {
    pub flow_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
    pub source_flow: String,
    pub updated: Vec<String>,
    pub skipped: Vec<SkippedTarget>,
    pub remaps: BTreeMap<String, IdRemap>,
}

/// Copies the structure of `source_flow_id` onto every other flow in its link
/// group. Targets built from a different template, or missing from the
/// document, are skipped and reported; the remaining targets are still
/// updated.
pub fn propagate(
    workflows: &mut WorkflowDocument,
    executions: &mut ExecutionStore,
    links: &LinkRegistry,
    source_flow_id: &str,
) -> Result<PropagationReport> {
    let source = workflows.flow(source_flow_id)?;
    let source_template = source.template_id.clone();
    let source_data = source.data.clone();
    let strategy = workflows.settings.link_match;

    let mut report = PropagationReport {
        source_flow: source_flow_id.to_string(),
        ..Default::default()
    };
    for peer in links.peers(source_flow_id) {
        let target = match workflows.flow_mut(&peer) {
            Ok(target) => target,
            Err(WorkflowError::UnknownFlow(_)) => {
                warn!(source = source_flow_id, peer = %peer, "linked flow is missing; skipping");
                report.skipped.push(SkippedTarget {
                    flow_id: peer,
                    reason: "flow not found".to_string(),
                });
                continue;
            }
            Err(err) => return Err(err),
        };
        if target.template_id != source_template {
            warn!(
                source = source_flow_id,
                peer = %peer,
                "linked flow uses a different template; skipping"
            );
            report.skipped.push(SkippedTarget {
                flow_id: peer,
                reason: format!(
                    "template {} differs from {source_template}",
                    target.template_id
                ),
            });
            continue;
        }

        let remapped = remap_tree(&source_data, &target.data, strategy);
        debug!(
            peer = %peer,
            remapped = remapped.remap.len(),
            fresh = remapped.fresh.len(),
            "rebuilt linked flow"
        );
        target.data = remapped.data;
        // Matched units kept their target ids, so the record is already keyed
        // correctly; only entries of dropped units go.
        let live_ids = target.live_ids();
        executions.reconcile(&peer, &live_ids);
        report.remaps.insert(peer.clone(), remapped.remap);
        report.updated.push(peer);
    }
    info!(
        source = source_flow_id,
        updated = report.updated.len(),
        skipped = report.skipped.len(),
        "propagated flow structure"
    );
    Ok(report)
}
