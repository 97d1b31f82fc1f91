use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Upper bound on the number of levels a template may define.
pub const MAX_LEVELS: usize = 10;

/// Capability flags that decide which optional fields a unit carries at a
/// given level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UnitConfig {
    pub enable_icon: bool,
    pub enable_id: bool,
    pub enable_name: bool,
    pub enable_description: bool,
    pub enable_tags: bool,
    pub enable_done: bool,
    pub enable_grade: bool,
    pub grade_cumulative: bool,
    pub progress_bar: bool,
    pub enable_links: bool,
    pub enable_images: bool,
    pub enable_notes: bool,
    pub enable_comments: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Level {
    pub id: String,
    pub order: u32,
    pub name: String,
    pub singular_name: String,
    pub plural_name: String,
    pub unit_config: UnitConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("template name is required")]
    MissingName,
    #[error("a template needs between 1 and {MAX_LEVELS} levels, found {count}")]
    LevelCount { count: usize },
    #[error("level {index} has no name")]
    MissingLevelName { index: usize },
    #[error("level name `{name}` is used more than once")]
    DuplicateLevelName { name: String },
    #[error("level {index} has no singular name")]
    MissingSingularName { index: usize },
    #[error("level {index} has no plural name")]
    MissingPluralName { index: usize },
    #[error("level {index} sums grades but level {} has grades disabled", .index + 1)]
    CumulativeGradeWithoutGrade { index: usize },
    #[error("level {index} shows progress but level {} has done disabled", .index + 1)]
    ProgressWithoutDone { index: usize },
}

impl Template {
    pub fn level(&self, depth: usize) -> Option<&Level> {
        self.levels.get(depth)
    }

    pub fn unit_config(&self, depth: usize) -> Option<&UnitConfig> {
        self.level(depth).map(|level| &level.unit_config)
    }

    pub fn is_last_level(&self, depth: usize) -> bool {
        depth + 1 >= self.levels.len()
    }

    /// Collects every schema problem. An empty list means the template may be
    /// persisted and instantiated.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push(ValidationError::MissingName);
        }
        let count = self.levels.len();
        if !(1..=MAX_LEVELS).contains(&count) {
            errors.push(ValidationError::LevelCount { count });
        }

        let mut seen: HashSet<String> = HashSet::new();
        for (index, level) in self.levels.iter().enumerate() {
            let name = level.name.trim();
            if name.is_empty() {
                errors.push(ValidationError::MissingLevelName { index });
            } else if !seen.insert(name.to_lowercase()) {
                errors.push(ValidationError::DuplicateLevelName {
                    name: name.to_string(),
                });
            }
            if level.singular_name.trim().is_empty() {
                errors.push(ValidationError::MissingSingularName { index });
            }
            if level.plural_name.trim().is_empty() {
                errors.push(ValidationError::MissingPluralName { index });
            }

            // Only the directly following level is consulted.
            let Some(next) = self.levels.get(index + 1) else {
                continue;
            };
            if level.unit_config.grade_cumulative && !next.unit_config.enable_grade {
                errors.push(ValidationError::CumulativeGradeWithoutGrade { index });
            }
            if level.unit_config.progress_bar && !next.unit_config.enable_done {
                errors.push(ValidationError::ProgressWithoutDone { index });
            }
        }
        errors
    }

    /// Fills in ids and ordering that hand-written definitions tend to omit.
    fn normalize(&mut self) {
        if self.id.trim().is_empty() {
            self.id = crate::new_id();
        }
        for (index, level) in self.levels.iter_mut().enumerate() {
            if level.id.trim().is_empty() {
                level.id = crate::new_id();
            }
            level.order = index as u32;
        }
    }
}

/// The persisted `{templates: [...]}` document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateDocument {
    pub templates: Vec<Template>,
}

impl TemplateDocument {
    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    /// Inserts or replaces a template. Templates with validation errors are
    /// rejected as a whole.
    pub fn upsert(&mut self, template: Template) -> crate::Result<()> {
        let errors = template.validate();
        if !errors.is_empty() {
            return Err(crate::WorkflowError::InvalidTemplate {
                name: template.name,
                errors,
            });
        }
        match self.templates.iter_mut().find(|t| t.id == template.id) {
            Some(existing) => *existing = template,
            None => self.templates.push(template),
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TemplateFile {
    Many { templates: Vec<Template> },
    One(Template),
}

/// Reads hand-authored template definitions from a YAML or TOML file. The
/// file holds either a single template or a `templates` list.
pub fn load_template_file(path: &Path) -> anyhow::Result<Vec<Template>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read template file {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let parsed: TemplateFile = match ext.as_str() {
        "yml" | "yaml" => serde_yaml::from_str(&contents).context("parse template file")?,
        "toml" | "tml" => toml::from_str(&contents).context("parse template file")?,
        _ => serde_yaml::from_str(&contents)
            .or_else(|_| toml::from_str(&contents))
            .context("parse template file (yaml or toml)")?,
    };
    let mut templates = match parsed {
        TemplateFile::Many { templates } => templates,
        TemplateFile::One(template) => vec![template],
    };
    if templates.is_empty() {
        anyhow::bail!("template file {} defines no templates", path.display());
    }
    for template in &mut templates {
        template.normalize();
    }
    Ok(templates)
}
