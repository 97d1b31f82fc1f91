use crate::execution::ExecutionRecord;
use crate::flow::Flow;
use crate::unit::Unit;
use crate::unit::UnitPath;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    /// Editable; either already done or sequencing is off.
    Unlocked,
    /// The first sibling that is not completed yet.
    UnlockedActive,
    /// Waiting for an earlier sibling.
    Locked,
}

/// Lock states for one ordered sibling group. A pure function of the
/// completion flags; nothing is carried over between calls.
pub fn lock_states(completed: &[bool], enforce_sequence: bool) -> Vec<LockState> {
    if !enforce_sequence {
        return vec![LockState::Unlocked; completed.len()];
    }
    let active = completed.iter().position(|done| !done);
    (0..completed.len())
        .map(|index| match active {
            Some(active) if index == active => LockState::UnlockedActive,
            Some(active) if index > active => LockState::Locked,
            _ => LockState::Unlocked,
        })
        .collect()
}

fn group_states(
    siblings: &[Unit],
    record: Option<&ExecutionRecord>,
    enforce_sequence: bool,
) -> Vec<LockState> {
    let completed: Vec<bool> = siblings
        .iter()
        .map(|unit| record.is_some_and(|r| r.is_completed(&unit.id)))
        .collect();
    lock_states(&completed, enforce_sequence)
}

/// Lock state of every unit living on a level with a done checkbox. Units on
/// other levels are absent from the map.
pub fn flow_locks(
    flow: &Flow,
    record: Option<&ExecutionRecord>,
    enforce_sequence: bool,
) -> HashMap<String, LockState> {
    let mut locks = HashMap::new();
    collect_group(flow, &flow.data, 0, record, enforce_sequence, &mut locks);
    locks
}

fn collect_group(
    flow: &Flow,
    siblings: &[Unit],
    depth: usize,
    record: Option<&ExecutionRecord>,
    enforce_sequence: bool,
    locks: &mut HashMap<String, LockState>,
) {
    let has_done = flow
        .template_snapshot
        .unit_config(depth)
        .is_some_and(|config| config.enable_done);
    if has_done {
        let states = group_states(siblings, record, enforce_sequence);
        locks.extend(siblings.iter().map(|u| u.id.clone()).zip(states));
    }
    for unit in siblings {
        collect_group(flow, &unit.subcategories, depth + 1, record, enforce_sequence, locks);
    }
}

/// Lock state of the unit at `path`, or `None` when the path is stale.
pub fn lock_state_at(
    flow: &Flow,
    path: &UnitPath,
    record: Option<&ExecutionRecord>,
    enforce_sequence: bool,
) -> Option<LockState> {
    let index = path.last()?;
    let parent = path.parent()?;
    let siblings = if parent.is_root() {
        &flow.data
    } else {
        &flow.resolve(&parent)?.subcategories
    };
    siblings.get(index)?;
    let has_done = flow
        .template_snapshot
        .unit_config(path.depth())
        .is_some_and(|config| config.enable_done);
    if !has_done {
        return Some(LockState::Unlocked);
    }
    group_states(siblings, record, enforce_sequence)
        .get(index)
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::tests::audit_template;
    use crate::unit::tests::named;
    use pretty_assertions::assert_eq;
    use super::LockState::*;

    #[test]
    fn first_incomplete_sibling_is_active() {
        assert_eq!(
            lock_states(&[true, false, false], true),
            vec![Unlocked, UnlockedActive, Locked]
        );
        assert_eq!(
            lock_states(&[false, true, false], true),
            vec![UnlockedActive, Locked, Locked]
        );
    }

    #[test]
    fn all_completed_group_is_unlocked() {
        assert_eq!(lock_states(&[true, true], true), vec![Unlocked, Unlocked]);
        assert_eq!(lock_states(&[], true), Vec::<LockState>::new());
    }

    #[test]
    fn sequencing_off_unlocks_everything() {
        assert_eq!(
            lock_states(&[false, false, true], false),
            vec![Unlocked, Unlocked, Unlocked]
        );
    }

    fn flow() -> Flow {
        let mut flow = Flow::instantiate(&audit_template(), "Q1");
        flow.data = vec![named(
            "area",
            vec![named(
                "ctl",
                vec![named("k1", vec![]), named("k2", vec![]), named("k3", vec![])],
            )],
        )];
        flow
    }

    #[test]
    fn flow_locks_cover_done_levels() {
        let mut flow = flow();
        flow.template_snapshot.levels[1].unit_config.enable_done = false;
        let mut record = ExecutionRecord::default();
        record.set_completed("k1", true);

        let locks = flow_locks(&flow, Some(&record), true);
        assert_eq!(locks.get("area"), Some(&UnlockedActive));
        assert_eq!(locks.get("ctl"), None);
        assert_eq!(locks.get("k1"), Some(&Unlocked));
        assert_eq!(locks.get("k2"), Some(&UnlockedActive));
        assert_eq!(locks.get("k3"), Some(&Locked));
    }

    #[test]
    fn lock_state_at_resolves_sibling_group() {
        let flow = flow();
        let record = ExecutionRecord::default();
        let k3 = UnitPath::from(vec![0, 0, 2]);
        assert_eq!(lock_state_at(&flow, &k3, Some(&record), true), Some(Locked));
        assert_eq!(lock_state_at(&flow, &k3, None, false), Some(Unlocked));
        assert_eq!(
            lock_state_at(&flow, &UnitPath::from(vec![0, 0, 9]), None, true),
            None
        );
    }
}
