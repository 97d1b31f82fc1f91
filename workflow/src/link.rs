use serde::Deserialize;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkGroup {
    pub group_id: String,
    pub workflows: Vec<String>,
}

impl LinkGroup {
    pub fn contains(&self, flow_id: &str) -> bool {
        self.workflows.iter().any(|id| id == flow_id)
    }
}

/// The persisted `{links: [...]}` document. A flow belongs to at most one
/// group and groups with fewer than two members do not survive any
/// operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkRegistry {
    pub links: Vec<LinkGroup>,
}

impl LinkRegistry {
    pub fn group_of(&self, flow_id: &str) -> Option<&LinkGroup> {
        self.links.iter().find(|group| group.contains(flow_id))
    }

    fn group_index(&self, flow_id: &str) -> Option<usize> {
        self.links.iter().position(|group| group.contains(flow_id))
    }

    /// Other members of `flow_id`'s group, in group order.
    pub fn peers(&self, flow_id: &str) -> Vec<String> {
        self.group_of(flow_id)
            .map(|group| {
                group
                    .workflows
                    .iter()
                    .filter(|id| id.as_str() != flow_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Puts `a` and `b` in the same group. When both already belong to
    /// different groups, `b`'s group is folded into `a`'s. Returns the group
    /// id, or `None` when `a == b`.
    pub fn link(&mut self, a: &str, b: &str) -> Option<String> {
        if a == b {
            return None;
        }
        let group_id = match (self.group_index(a), self.group_index(b)) {
            (Some(ia), Some(ib)) if ia == ib => self.links[ia].group_id.clone(),
            (Some(ia), Some(ib)) => {
                let absorbed = self.links.remove(ib);
                let ia = if ib < ia { ia - 1 } else { ia };
                let target = &mut self.links[ia];
                info!(
                    into = %target.group_id,
                    from = %absorbed.group_id,
                    "merging link groups"
                );
                for id in absorbed.workflows {
                    if !target.contains(&id) {
                        target.workflows.push(id);
                    }
                }
                target.group_id.clone()
            }
            (Some(index), None) => {
                self.links[index].workflows.push(b.to_string());
                self.links[index].group_id.clone()
            }
            (None, Some(index)) => {
                self.links[index].workflows.push(a.to_string());
                self.links[index].group_id.clone()
            }
            (None, None) => {
                let group = LinkGroup {
                    group_id: crate::new_id(),
                    workflows: vec![a.to_string(), b.to_string()],
                };
                let group_id = group.group_id.clone();
                info!(group_id = %group_id, a, b, "created link group");
                self.links.push(group);
                group_id
            }
        };
        Some(group_id)
    }

    /// Removes `flow_id` from its group, dissolving the group once it has a
    /// single member left. Returns whether the flow was linked.
    pub fn unlink(&mut self, flow_id: &str) -> bool {
        let Some(index) = self.group_index(flow_id) else {
            return false;
        };
        self.links[index].workflows.retain(|id| id != flow_id);
        self.prune();
        true
    }

    /// Drops degenerate groups and repeated members.
    pub fn prune(&mut self) {
        for group in &mut self.links {
            let mut seen = std::collections::HashSet::new();
            group.workflows.retain(|id| seen.insert(id.clone()));
        }
        self.links.retain(|group| {
            let keep = group.workflows.len() > 1;
            if !keep {
                info!(group_id = %group.group_id, "dissolved link group");
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn link_creates_then_grows_a_group() {
        let mut registry = LinkRegistry::default();
        let first = registry.link("a", "b").expect("linked");
        let second = registry.link("c", "b").expect("linked");
        assert_eq!(first, second);
        assert_eq!(registry.links.len(), 1);
        assert_eq!(registry.links[0].workflows, vec!["a", "b", "c"]);
        assert_eq!(registry.peers("b"), vec!["a", "c"]);
        assert_eq!(registry.link("a", "a"), None);
    }

    #[test]
    fn linking_members_of_two_groups_merges_them() {
        let mut registry = LinkRegistry::default();
        registry.link("a", "b");
        registry.link("c", "d");
        registry.link("d", "a");
        assert_eq!(registry.links.len(), 1);
        assert_eq!(registry.links[0].workflows, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn unlinking_from_pair_dissolves_group() {
        let mut registry = LinkRegistry::default();
        registry.link("a", "b");
        assert!(registry.unlink("a"));
        assert!(registry.links.is_empty());
        assert!(registry.group_of("b").is_none());
        assert!(!registry.unlink("a"));
    }

    #[test]
    fn unlinking_from_larger_group_keeps_the_rest() {
        let mut registry = LinkRegistry::default();
        registry.link("a", "b");
        registry.link("a", "c");
        registry.unlink("b");
        assert_eq!(registry.peers("a"), vec!["c"]);
    }

    #[test]
    fn prune_removes_degenerate_groups_from_loaded_documents() {
        let mut registry: LinkRegistry = serde_json::from_str(
            r#"{"links":[{"groupId":"g1","workflows":["a"]},{"groupId":"g2","workflows":["b","b","c"]}]}"#,
        )
        .expect("parse");
        registry.prune();
        assert_eq!(registry.links.len(), 1);
        assert_eq!(registry.links[0].workflows, vec!["b", "c"]);
    }
}
