use crate::unit::Unit;
use crate::unit::UnitPath;
use serde::Serialize;

/// A node of a filtered view. The unit is a content snapshot without its
/// children; `original_path` is where edits must be written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilteredUnit {
    pub original_path: UnitPath,
    pub unit: Unit,
    /// True when the unit itself carries the tag.
    pub matched: bool,
    pub children: Vec<FilteredUnit>,
}

/// Builds a view of `forest` holding every unit tagged `tag` with its whole
/// subtree, plus the ancestors leading to it. Untagged ancestors keep only
/// the branches that lead to a tagged unit.
pub fn filter_by_tag(forest: &[Unit], tag: &str) -> Vec<FilteredUnit> {
    filter_siblings(forest, &UnitPath::root(), tag)
}

fn filter_siblings(units: &[Unit], parent: &UnitPath, tag: &str) -> Vec<FilteredUnit> {
    units
        .iter()
        .enumerate()
        .filter_map(|(index, unit)| filter_unit(unit, parent.child(index), tag))
        .collect()
}

fn filter_unit(unit: &Unit, path: UnitPath, tag: &str) -> Option<FilteredUnit> {
    if unit.has_tag(tag) {
        return Some(whole_subtree(unit, path, tag));
    }
    let children = filter_siblings(&unit.subcategories, &path, tag);
    if children.is_empty() {
        return None;
    }
    Some(FilteredUnit {
        original_path: path,
        unit: shallow(unit),
        matched: false,
        children,
    })
}

fn whole_subtree(unit: &Unit, path: UnitPath, tag: &str) -> FilteredUnit {
    let children = unit
        .subcategories
        .iter()
        .enumerate()
        .map(|(index, child)| whole_subtree(child, path.child(index), tag))
        .collect();
    FilteredUnit {
        original_path: path,
        unit: shallow(unit),
        matched: unit.has_tag(tag),
        children,
    }
}

fn shallow(unit: &Unit) -> Unit {
    Unit {
        subcategories: Vec::new(),
        ..unit.clone()
    }
}
