//! Derived values computed bottom-up over a flow tree.
//!
//! Both functions walk the whole subtree on every call. Trees are bounded by
//! the ten-level template limit and human-authored breadth, so nothing is
//! cached or maintained incrementally.

use crate::execution::ExecutionRecord;
use crate::flow::Flow;
use crate::template::Template;
use crate::unit::Unit;

fn sums_children(template: &Template, depth: usize) -> bool {
    template
        .unit_config(depth)
        .is_some_and(|config| config.grade_cumulative)
        && !template.is_last_level(depth)
}

/// Grade of `unit` at `depth`. Non-cumulative levels and the last level
/// report the stored grade as is; cumulative levels report the sum of their
/// children's cumulative grades and ignore their own stored value.
pub fn cumulative_grade(unit: &Unit, template: &Template, depth: usize) -> Option<f64> {
    if !sums_children(template, depth) {
        return unit.grade;
    }
    Some(
        unit.subcategories
            .iter()
            .filter_map(|child| cumulative_grade(child, template, depth + 1))
            .sum(),
    )
}

/// Percentage of direct children marked completed in `record`, rounded to
/// the nearest integer. Zero when there are no children or the child level
/// has no done checkbox.
pub fn progress(
    unit: &Unit,
    template: &Template,
    depth: usize,
    record: Option<&ExecutionRecord>,
) -> u8 {
    let total = unit.subcategories.len();
    let child_has_done = template
        .unit_config(depth + 1)
        .is_some_and(|config| config.enable_done);
    if total == 0 || !child_has_done {
        return 0;
    }
    let completed = unit
        .subcategories
        .iter()
        .filter(|child| record.is_some_and(|r| r.is_completed(&child.id)))
        .count();
    (100.0 * completed as f64 / total as f64).round() as u8
}

/// Overwrites the stored grade of every cumulative unit in `flow` with its
/// computed cumulative grade.
pub fn update_all(flow: &mut Flow) {
    let template = &flow.template_snapshot;
    for root in &mut flow.data {
        update_unit(root, template, 0);
    }
}

fn update_unit(unit: &mut Unit, template: &Template, depth: usize) {
    for child in &mut unit.subcategories {
        update_unit(child, template, depth + 1);
    }
    if sums_children(template, depth) {
        // Children are already updated, so their stored grades are final.
        unit.grade = Some(unit.subcategories.iter().filter_map(|c| c.grade).sum());
    }
}
