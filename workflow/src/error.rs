use crate::template::ValidationError;
use crate::unit::UnitPath;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("unknown flow {0}")]
    UnknownFlow(String),

    #[error("unknown template {0}")]
    UnknownTemplate(String),

    #[error("no unit at path {path} in flow {flow_id}")]
    StalePath { flow_id: String, path: UnitPath },

    #[error("template {template} has {levels} level(s); depth {depth} is out of range")]
    DepthExceeded {
        template: String,
        depth: usize,
        levels: usize,
    },

    #[error("field `{field}` is not enabled at depth {depth}")]
    CapabilityDisabled { field: &'static str, depth: usize },

    #[error("unit {unit_id} is locked until earlier siblings are completed")]
    Locked { unit_id: String },

    #[error("template {name} failed validation: {}", join_errors(.errors))]
    InvalidTemplate {
        name: String,
        errors: Vec<ValidationError>,
    },

    #[error("flows {source_flow} and {target_flow} use different templates")]
    TemplateMismatch {
        source_flow: String,
        target_flow: String,
    },

    #[error("flows {first_flow} and {second_flow} are linked; a share group cannot span them")]
    ShareAcrossLink {
        first_flow: String,
        second_flow: String,
    },

    #[error("malformed document {document}: {reason}")]
    MalformedDocument { document: String, reason: String },
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_template_lists_every_error() {
        let err = WorkflowError::InvalidTemplate {
            name: "audit".into(),
            errors: vec![
                ValidationError::MissingName,
                ValidationError::LevelCount { count: 0 },
            ],
        };
        let message = err.to_string();
        assert!(message.starts_with("template audit failed validation: "));
        assert!(message.contains("; "));
    }
}
