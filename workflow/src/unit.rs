use crate::error::Result;
use crate::error::WorkflowError;
use crate::template::UnitConfig;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// One node of a flow tree. Optional fields are present exactly when the
/// level the unit lives on enables the matching capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Unit {
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// User-facing identifier, enabled by `enableId`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_key: Option<String>,
    pub subcategories: Vec<Unit>,
}

impl Unit {
    /// Creates a unit carrying only the fields `config` enables.
    pub fn new(name: impl Into<String>, config: &UnitConfig) -> Self {
        Self {
            id: crate::new_id(),
            name: name.into(),
            tags: Vec::new(),
            icon: config.enable_icon.then(String::new),
            code: config.enable_id.then(String::new),
            description: config.enable_description.then(String::new),
            grade: config.enable_grade.then_some(0.0),
            links: config.enable_links.then(Vec::new),
            images: config.enable_images.then(Vec::new),
            notes: config.enable_notes.then(String::new),
            comments: config.enable_comments.then(Vec::new),
            share_key: None,
            subcategories: Vec::new(),
        }
    }

    /// Copies content fields from `other`, leaving id, share key and
    /// children untouched.
    pub fn copy_content_from(&mut self, other: &Unit) {
        self.name = other.name.clone();
        self.tags = other.tags.clone();
        self.icon = other.icon.clone();
        self.code = other.code.clone();
        self.description = other.description.clone();
        self.grade = other.grade;
        self.links = other.links.clone();
        self.images = other.images.clone();
        self.notes = other.notes.clone();
        self.comments = other.comments.clone();
    }

    /// Deep copy with fresh ids at every node. Returns the copy and the
    /// `original id -> copy id` table.
    pub fn clone_with_fresh_ids(&self) -> (Unit, HashMap<String, String>) {
        let mut copy = self.clone();
        let mut mapping = HashMap::new();
        refresh_ids(&mut copy, &mut mapping);
        (copy, mapping)
    }

    /// Drops the share key of this unit and its whole subtree.
    pub fn clear_share_keys(&mut self) {
        self.share_key = None;
        for child in &mut self.subcategories {
            child.clear_share_keys();
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

fn refresh_ids(unit: &mut Unit, mapping: &mut HashMap<String, String>) {
    let fresh = crate::new_id();
    mapping.insert(std::mem::replace(&mut unit.id, fresh.clone()), fresh);
    for child in &mut unit.subcategories {
        refresh_ids(child, mapping);
    }
}

/// Adds or drops optional fields so `unit` and its subtree match the
/// capabilities of the levels they now live on. Existing values of fields
/// that stay enabled are kept.
pub fn conform(unit: &mut Unit, template: &crate::template::Template, depth: usize) {
    if let Some(config) = template.unit_config(depth) {
        fn keep<T>(field: &mut Option<T>, enabled: bool, empty: impl FnOnce() -> T) {
            match (field.is_some(), enabled) {
                (true, false) => *field = None,
                (false, true) => *field = Some(empty()),
                _ => {}
            }
        }
        keep(&mut unit.icon, config.enable_icon, String::new);
        keep(&mut unit.code, config.enable_id, String::new);
        keep(&mut unit.description, config.enable_description, String::new);
        keep(&mut unit.grade, config.enable_grade, || 0.0);
        keep(&mut unit.links, config.enable_links, Vec::new);
        keep(&mut unit.images, config.enable_images, Vec::new);
        keep(&mut unit.notes, config.enable_notes, String::new);
        keep(&mut unit.comments, config.enable_comments, Vec::new);
        if !config.enable_tags {
            unit.tags.clear();
        }
    }
    for child in &mut unit.subcategories {
        conform(child, template, depth + 1);
    }
}

/// Index path from a flow's root forest down to a unit. The empty path
/// addresses the forest itself and never resolves to a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitPath(Vec<usize>);

impl UnitPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    /// Depth of the addressed unit (0 for a root unit).
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }
}

impl From<Vec<usize>> for UnitPath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for UnitPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

impl FromStr for UnitPath {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "<root>" {
            return Ok(Self::root());
        }
        s.split('.')
            .map(str::parse)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Self)
    }
}

pub fn resolve<'a>(forest: &'a [Unit], path: &UnitPath) -> Option<&'a Unit> {
    let (first, rest) = path.indices().split_first()?;
    let mut unit = forest.get(*first)?;
    for index in rest {
        unit = unit.subcategories.get(*index)?;
    }
    Some(unit)
}

pub fn resolve_mut<'a>(forest: &'a mut [Unit], path: &UnitPath) -> Option<&'a mut Unit> {
    let (first, rest) = path.indices().split_first()?;
    let mut unit = forest.get_mut(*first)?;
    for index in rest {
        unit = unit.subcategories.get_mut(*index)?;
    }
    Some(unit)
}

/// Children list addressed by `parent`; the root path yields the forest.
pub fn children_mut<'a>(forest: &'a mut Vec<Unit>, parent: &UnitPath) -> Option<&'a mut Vec<Unit>> {
    if parent.is_root() {
        return Some(forest);
    }
    resolve_mut(forest, parent).map(|unit| &mut unit.subcategories)
}

/// Sibling list holding the unit at `path` together with its index in it.
pub fn parent_and_index<'a>(
    forest: &'a mut Vec<Unit>,
    path: &UnitPath,
) -> Option<(&'a mut Vec<Unit>, usize)> {
    let index = path.last()?;
    let siblings = children_mut(forest, &path.parent()?)?;
    (index < siblings.len()).then_some((siblings, index))
}

/// Appends `unit` under `parent` after checking the depth against the number
/// of levels. Returns the path of the inserted unit.
pub fn insert_child(
    forest: &mut Vec<Unit>,
    parent: &UnitPath,
    unit: Unit,
    levels: usize,
) -> Option<UnitPath> {
    let depth = parent.indices().len();
    if depth >= levels {
        return None;
    }
    let siblings = children_mut(forest, parent)?;
    siblings.push(unit);
    Some(parent.child(siblings.len() - 1))
}

/// Removes the unit at `path` and its whole subtree.
pub fn remove(forest: &mut Vec<Unit>, path: &UnitPath) -> Option<Unit> {
    let (siblings, index) = parent_and_index(forest, path)?;
    Some(siblings.remove(index))
}

/// Moves a unit `offset` positions among its siblings, clamped to the ends.
/// Returns the unit's new path.
pub fn move_within_siblings(
    forest: &mut Vec<Unit>,
    path: &UnitPath,
    offset: isize,
) -> Option<UnitPath> {
    let parent = path.parent()?;
    let (siblings, index) = parent_and_index(forest, path)?;
    let target = index
        .saturating_add_signed(offset)
        .min(siblings.len() - 1);
    let unit = siblings.remove(index);
    siblings.insert(target, unit);
    Some(parent.child(target))
}

/// Visits every unit depth-first, pre-order, with its depth and path.
pub fn walk<'a>(forest: &'a [Unit], visit: &mut impl FnMut(&'a Unit, usize, &UnitPath)) {
    fn go<'a>(
        units: &'a [Unit],
        parent: &UnitPath,
        depth: usize,
        visit: &mut impl FnMut(&'a Unit, usize, &UnitPath),
    ) {
        for (index, unit) in units.iter().enumerate() {
            let path = parent.child(index);
            visit(unit, depth, &path);
            go(&unit.subcategories, &path, depth + 1, visit);
        }
    }
    go(forest, &UnitPath::root(), 0, visit);
}

pub fn collect_ids(forest: &[Unit]) -> HashSet<String> {
    let mut ids = HashSet::new();
    walk(forest, &mut |unit, _, _| {
        ids.insert(unit.id.clone());
    });
    ids
}

pub fn collect_tags(forest: &[Unit]) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    walk(forest, &mut |unit, _, _| {
        tags.extend(unit.tags.iter().cloned());
    });
    tags
}

/// A partial update of a unit's content. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnitEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub grade: Option<f64>,
    pub notes: Option<String>,
    pub icon: Option<String>,
    pub code: Option<String>,
}

impl UnitEdit {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Rejects edits touching fields the level does not enable.
    pub fn check(&self, config: &UnitConfig, depth: usize) -> Result<()> {
        let gated = [
            ("description", self.description.is_some(), config.enable_description),
            ("tags", self.tags.is_some(), config.enable_tags),
            ("grade", self.grade.is_some(), config.enable_grade),
            ("notes", self.notes.is_some(), config.enable_notes),
            ("icon", self.icon.is_some(), config.enable_icon),
            ("code", self.code.is_some(), config.enable_id),
        ];
        match gated.iter().find(|(_, touched, enabled)| *touched && !*enabled) {
            Some((field, _, _)) => Err(WorkflowError::CapabilityDisabled {
                field: *field,
                depth,
            }),
            None => Ok(()),
        }
    }

    /// The subset of this edit that `config` allows.
    pub fn restricted_to(&self, config: &UnitConfig) -> UnitEdit {
        UnitEdit {
            name: self.name.clone(),
            description: self.description.clone().filter(|_| config.enable_description),
            tags: self.tags.clone().filter(|_| config.enable_tags),
            grade: self.grade.filter(|_| config.enable_grade),
            notes: self.notes.clone().filter(|_| config.enable_notes),
            icon: self.icon.clone().filter(|_| config.enable_icon),
            code: self.code.clone().filter(|_| config.enable_id),
        }
    }

    pub fn apply(&self, unit: &mut Unit) {
        if let Some(name) = &self.name {
            unit.name = name.clone();
        }
        if let Some(description) = &self.description {
            unit.description = Some(description.clone());
        }
        if let Some(tags) = &self.tags {
            unit.tags = tags.clone();
        }
        if let Some(grade) = self.grade {
            unit.grade = Some(grade);
        }
        if let Some(notes) = &self.notes {
            unit.notes = Some(notes.clone());
        }
        if let Some(icon) = &self.icon {
            unit.icon = Some(icon.clone());
        }
        if let Some(code) = &self.code {
            unit.code = Some(code.clone());
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn named(id: &str, children: Vec<Unit>) -> Unit {
        Unit {
            id: id.to_string(),
            name: id.to_uppercase(),
            subcategories: children,
            ..Default::default()
        }
    }

    fn forest() -> Vec<Unit> {
        vec![
            named("a", vec![named("a0", vec![]), named("a1", vec![named("a10", vec![])])]),
            named("b", vec![]),
        ]
    }

    #[test]
    fn new_unit_carries_enabled_fields_only() {
        let config = UnitConfig {
            enable_grade: true,
            enable_notes: true,
            ..Default::default()
        };
        let unit = Unit::new("Check", &config);
        assert_eq!(unit.grade, Some(0.0));
        assert_eq!(unit.notes, Some(String::new()));
        assert_eq!(unit.description, None);
        assert_eq!(unit.links, None);
    }

    #[test]
    fn paths_parse_and_print() {
        let path: UnitPath = "2.0.1".parse().expect("parse");
        assert_eq!(path.indices(), &[2, 0, 1]);
        assert_eq!(path.to_string(), "2.0.1");
        assert_eq!(path.depth(), 2);
        assert_eq!(path.parent(), Some(UnitPath::from(vec![2, 0])));
        assert!("".parse::<UnitPath>().expect("root").is_root());
        assert!("1.x".parse::<UnitPath>().is_err());
    }

    #[test]
    fn resolve_follows_indices_and_tolerates_stale_paths() {
        let forest = forest();
        let path = UnitPath::from(vec![0, 1, 0]);
        assert_eq!(resolve(&forest, &path).map(|u| u.id.as_str()), Some("a10"));
        assert!(resolve(&forest, &UnitPath::from(vec![0, 5])).is_none());
        assert!(resolve(&forest, &UnitPath::root()).is_none());
    }

    #[test]
    fn parent_and_index_rejects_out_of_range() {
        let mut forest = forest();
        let (siblings, index) =
            parent_and_index(&mut forest, &UnitPath::from(vec![0, 1])).expect("resolves");
        assert_eq!((siblings.len(), index), (2, 1));
        assert!(parent_and_index(&mut forest, &UnitPath::from(vec![0, 2])).is_none());
    }

    #[test]
    fn insert_respects_level_count() {
        let mut forest = forest();
        let path = insert_child(&mut forest, &UnitPath::from(vec![1]), named("b0", vec![]), 2);
        assert_eq!(path, Some(UnitPath::from(vec![1, 0])));
        let too_deep = insert_child(&mut forest, &UnitPath::from(vec![1, 0]), named("x", vec![]), 2);
        assert_eq!(too_deep, None);
    }

    #[test]
    fn remove_takes_the_subtree() {
        let mut forest = forest();
        let removed = remove(&mut forest, &UnitPath::from(vec![0])).expect("removed");
        assert_eq!(removed.subcategories.len(), 2);
        assert_eq!(collect_ids(&forest), HashSet::from(["b".to_string()]));
    }

    #[test]
    fn move_clamps_to_sibling_bounds() {
        let mut forest = forest();
        let moved = move_within_siblings(&mut forest, &UnitPath::from(vec![0, 0]), 5);
        assert_eq!(moved, Some(UnitPath::from(vec![0, 1])));
        assert_eq!(forest[0].subcategories[1].id, "a0");
        let moved = move_within_siblings(&mut forest, &UnitPath::from(vec![1]), -3);
        assert_eq!(moved, Some(UnitPath::from(vec![0])));
        assert_eq!(forest[0].id, "b");
    }

    #[test]
    fn fresh_id_clone_maps_every_node() {
        let forest = forest();
        let (copy, mapping) = forest[0].clone_with_fresh_ids();
        assert_eq!(mapping.len(), 4);
        assert_eq!(mapping.get("a10"), Some(&copy.subcategories[1].subcategories[0].id));
        assert!(collect_ids(std::slice::from_ref(&copy)).is_disjoint(&collect_ids(&forest)));
    }

    #[test]
    fn conform_matches_level_capabilities() {
        let template = crate::template::tests::audit_template();
        let mut unit = Unit {
            description: Some("kept only where enabled".into()),
            grade: Some(2.0),
            ..named("c", vec![named("k", vec![])])
        };
        conform(&mut unit, &template, 1);
        assert_eq!(unit.description.as_deref(), Some("kept only where enabled"));
        assert_eq!(unit.grade, Some(2.0));
        assert_eq!(unit.notes, None);
        assert_eq!(unit.subcategories[0].notes, Some(String::new()));

        conform(&mut unit, &template, 0);
        assert_eq!(unit.description, None);
    }

    #[test]
    fn edit_check_rejects_disabled_fields() {
        let config = UnitConfig {
            enable_tags: true,
            ..Default::default()
        };
        let edit = UnitEdit {
            grade: Some(3.0),
            ..Default::default()
        };
        let err = edit.check(&config, 1).expect_err("grade is disabled");
        assert_eq!(err.to_string(), "field `grade` is not enabled at depth 1");
        let edit = UnitEdit {
            tags: Some(vec!["x".into()]),
            name: Some("renamed".into()),
            ..Default::default()
        };
        assert!(edit.check(&config, 1).is_ok());
    }
}
