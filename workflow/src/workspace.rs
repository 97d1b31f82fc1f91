use crate::aggregate;
use crate::config::WorkspaceConfig;
use crate::error::Result;
use crate::error::WorkflowError;
use crate::filter;
use crate::filter::FilteredUnit;
use crate::flow::Flow;
use crate::report::FlowReport;
use crate::sequence;
use crate::sequence::LockState;
use crate::share;
use crate::share::ImportMode;
use crate::share::ShareIndex;
use crate::share::UnitRef;
use crate::store::Documents;
use crate::sync;
use crate::sync::PropagationReport;
use crate::template::Template;
use crate::unit::UnitEdit;
use crate::unit::UnitPath;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::info;

/// How a new flow's tree is seeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowSeed {
    Empty,
    /// Fresh-id copy of an existing flow; completion is not copied.
    CopyOf(String),
    /// Copy of an existing flow that is then linked to it.
    LinkedTo(String),
}

/// Owns the loaded documents and runs every user-level operation. Structural
/// and content edits are followed by a commit pass: cumulative grades are
/// recomputed, completion entries are reconciled, and the flow's structure is
/// propagated to its link group.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    documents: Documents,
}

impl Workspace {
    /// Wraps freshly loaded documents, applying config overrides and
    /// repairing anything the load-time invariants require.
    pub fn new(mut documents: Documents, config: &WorkspaceConfig) -> Self {
        if let Some(link_match) = config.link_match {
            documents.workflows.settings.link_match = link_match;
        }
        documents.links.prune();
        for flow in &documents.workflows.flows {
            documents.executions.reconcile(&flow.id, &flow.live_ids());
        }
        Self { documents }
    }

    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    pub fn into_documents(self) -> Documents {
        self.documents
    }

    pub fn flow(&self, flow_id: &str) -> Result<&Flow> {
        self.documents.workflows.flow(flow_id)
    }

    pub fn flows(&self) -> &[Flow] {
        &self.documents.workflows.flows
    }

    pub fn templates(&self) -> &[Template] {
        &self.documents.templates.templates
    }

    pub fn set_enforce_sequence(&mut self, enforce: bool) {
        self.documents.workflows.settings.enforce_sequence = enforce;
    }

    /// Validates and stores each template; the first invalid one aborts the
    /// import before anything is stored.
    pub fn import_templates(&mut self, templates: Vec<Template>) -> Result<usize> {
        if let Some((template, errors)) = templates
            .iter()
            .map(|t| (t, t.validate()))
            .find(|(_, errors)| !errors.is_empty())
        {
            return Err(WorkflowError::InvalidTemplate {
                name: template.name.clone(),
                errors,
            });
        }
        let count = templates.len();
        for template in templates {
            self.documents.templates.upsert(template)?;
        }
        Ok(count)
    }

    pub fn create_flow(&mut self, template_id: &str, name: &str, seed: FlowSeed) -> Result<String> {
        let template = self
            .documents
            .templates
            .get(template_id)
            .ok_or_else(|| WorkflowError::UnknownTemplate(template_id.to_string()))?;
        let flow = match &seed {
            FlowSeed::Empty => Flow::instantiate(template, name),
            FlowSeed::CopyOf(source_id) | FlowSeed::LinkedTo(source_id) => {
                let source = self.documents.workflows.flow(source_id)?;
                if source.template_id != template_id {
                    return Err(WorkflowError::TemplateMismatch {
                        source_flow: source_id.clone(),
                        target_flow: name.to_string(),
                    });
                }
                Flow::copy_of(source, name).0
            }
        };
        let flow_id = flow.id.clone();
        self.documents.workflows.flows.push(flow);
        if let FlowSeed::LinkedTo(source_id) = &seed {
            self.documents.links.link(source_id, &flow_id);
        }
        info!(flow_id = %flow_id, template_id, seed = ?seed, "created flow");
        Ok(flow_id)
    }

    pub fn rename_flow(&mut self, flow_id: &str, name: &str) -> Result<()> {
        self.documents.workflows.flow_mut(flow_id)?.name = name.to_string();
        Ok(())
    }

    /// Removes a flow together with its completion record and link
    /// membership.
    pub fn delete_flow(&mut self, flow_id: &str) -> Result<Flow> {
        let flow = self.documents.workflows.remove_flow(flow_id)?;
        self.documents.executions.remove_flow(flow_id);
        self.documents.links.unlink(flow_id);
        info!(flow_id, "deleted flow");
        Ok(flow)
    }

    pub fn add_unit(&mut self, flow_id: &str, parent: &UnitPath, name: &str) -> Result<UnitPath> {
        let path = self.documents.workflows.flow_mut(flow_id)?.add_unit(parent, name)?;
        self.commit(flow_id)?;
        Ok(path)
    }

    /// Deletes a unit and its subtree; shared units take their whole share
    /// group with them.
    pub fn delete_unit(&mut self, flow_id: &str, path: &UnitPath) -> Result<Vec<UnitRef>> {
        let target = UnitRef {
            flow_id: flow_id.to_string(),
            path: path.clone(),
        };
        let removed = share::delete_shared(
            &mut self.documents.workflows,
            &mut self.documents.executions,
            &target,
        )?;
        self.commit_all(
            std::iter::once(flow_id).chain(removed.iter().map(|r| r.flow_id.as_str())),
        )?;
        Ok(removed)
    }

    pub fn edit_unit(&mut self, flow_id: &str, path: &UnitPath, edit: &UnitEdit) -> Result<()> {
        let target = UnitRef {
            flow_id: flow_id.to_string(),
            path: path.clone(),
        };
        let members = share::apply_shared_edit(&mut self.documents.workflows, &target, edit)?;
        self.commit_all(
            std::iter::once(flow_id).chain(members.iter().map(|m| m.flow_id.as_str())),
        )
    }

    /// Edits the live unit behind a node of a filtered view.
    pub fn edit_filtered(&mut self, flow_id: &str, node: &FilteredUnit, edit: &UnitEdit) -> Result<()> {
        self.edit_unit(flow_id, &node.original_path, edit)
    }

    pub fn move_unit(&mut self, flow_id: &str, path: &UnitPath, offset: isize) -> Result<UnitPath> {
        let moved = self.documents.workflows.flow_mut(flow_id)?.move_unit(path, offset)?;
        self.commit(flow_id)?;
        Ok(moved)
    }

    /// Copies the subtree at `from` under `to_parent` in `to_flow`.
    pub fn import_unit(
        &mut self,
        from: &UnitRef,
        to_flow: &str,
        to_parent: &UnitPath,
        mode: ImportMode,
    ) -> Result<UnitPath> {
        let linked = self
            .documents
            .links
            .group_of(&from.flow_id)
            .is_some_and(|group| group.contains(to_flow));
        if mode == ImportMode::Share && from.flow_id != to_flow && linked {
            // Propagation would overwrite the member with the unshared
            // unit at the same position and undo later fan-out edits.
            return Err(WorkflowError::ShareAcrossLink {
                first_flow: from.flow_id.clone(),
                second_flow: to_flow.to_string(),
            });
        }
        let path = share::import_unit(
            &mut self.documents.workflows,
            &mut self.documents.executions,
            from,
            to_flow,
            to_parent,
            mode,
        )?;
        self.commit(to_flow)?;
        Ok(path)
    }

    /// Marks a unit done or not done. With sequencing enforced, locked units
    /// cannot be toggled.
    pub fn set_completed(&mut self, flow_id: &str, path: &UnitPath, completed: bool) -> Result<()> {
        let enforce = self.documents.workflows.settings.enforce_sequence;
        let flow = self.documents.workflows.flow(flow_id)?;
        let config = flow.unit_config(path.depth())?;
        if !config.enable_done {
            return Err(WorkflowError::CapabilityDisabled {
                field: "done",
                depth: path.depth(),
            });
        }
        let unit = flow.resolve(path).ok_or_else(|| WorkflowError::StalePath {
            flow_id: flow_id.to_string(),
            path: path.clone(),
        })?;
        let record = self.documents.executions.record(flow_id);
        let lock = sequence::lock_state_at(flow, path, record, enforce);
        if lock == Some(LockState::Locked) {
            return Err(WorkflowError::Locked {
                unit_id: unit.id.clone(),
            });
        }
        let unit_id = unit.id.clone();
        self.documents
            .executions
            .set_completed(flow_id, &unit_id, completed);
        Ok(())
    }

    pub fn link(&mut self, a: &str, b: &str) -> Result<PropagationReport> {
        let source = self.documents.workflows.flow(a)?;
        let target = self.documents.workflows.flow(b)?;
        if source.template_id != target.template_id {
            return Err(WorkflowError::TemplateMismatch {
                source_flow: a.to_string(),
                target_flow: b.to_string(),
            });
        }
        let mut group = self.documents.links.peers(a);
        group.extend(self.documents.links.peers(b));
        group.extend([a.to_string(), b.to_string()]);
        if let Some((first_flow, second_flow)) =
            ShareIndex::build(&self.documents.workflows).shared_between(&group)
        {
            return Err(WorkflowError::ShareAcrossLink {
                first_flow,
                second_flow,
            });
        }
        self.documents.links.link(a, b);
        self.sync(a)
    }

    pub fn unlink(&mut self, flow_id: &str) -> Result<bool> {
        self.documents.workflows.flow(flow_id)?;
        Ok(self.documents.links.unlink(flow_id))
    }

    /// Propagates `flow_id`'s structure to the rest of its link group.
    pub fn sync(&mut self, flow_id: &str) -> Result<PropagationReport> {
        sync::propagate(
            &mut self.documents.workflows,
            &mut self.documents.executions,
            &self.documents.links,
            flow_id,
        )
    }

    pub fn filter(&self, flow_id: &str, tag: &str) -> Result<Vec<FilteredUnit>> {
        Ok(filter::filter_by_tag(&self.flow(flow_id)?.data, tag))
    }

    pub fn lock_states(&self, flow_id: &str) -> Result<HashMap<String, LockState>> {
        Ok(sequence::flow_locks(
            self.flow(flow_id)?,
            self.documents.executions.record(flow_id),
            self.documents.workflows.settings.enforce_sequence,
        ))
    }

    pub fn report(&self, flow_id: &str) -> Result<FlowReport> {
        Ok(FlowReport::build(
            self.flow(flow_id)?,
            self.documents.executions.record(flow_id),
            self.documents.workflows.settings.enforce_sequence,
            self.documents.links.peers(flow_id),
        ))
    }

    fn commit(&mut self, flow_id: &str) -> Result<()> {
        let flow = self.documents.workflows.flow_mut(flow_id)?;
        aggregate::update_all(flow);
        let live_ids = flow.live_ids();
        self.documents.executions.reconcile(flow_id, &live_ids);
        if self.documents.links.group_of(flow_id).is_some() {
            self.sync(flow_id)?;
        }
        Ok(())
    }

    /// Commits each flow once, in first-seen order. The edited flow must come
    /// first so its linked peers are overwritten with the edit, not the
    /// other way round.
    fn commit_all<'a>(&mut self, flow_ids: impl IntoIterator<Item = &'a str>) -> Result<()> {
        let mut seen = HashSet::new();
        let ordered: Vec<String> = flow_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect();
        for flow_id in &ordered {
            self.commit(flow_id)?;
        }
        Ok(())
    }
}
