//! Hierarchical checklist workflows: templates define the levels, flows hold
//! the unit trees, and completion is tracked per flow by unit id.

mod aggregate;
mod config;
mod error;
mod execution;
mod filter;
mod flow;
mod layout;
mod link;
mod report;
mod sequence;
mod share;
mod store;
mod sync;
mod template;
mod unit;
mod workspace;

pub use aggregate::cumulative_grade;
pub use aggregate::progress;
pub use aggregate::update_all;
pub use config::WorkspaceConfig;
pub use error::Result;
pub use error::WorkflowError;
pub use execution::ExecutionRecord;
pub use execution::ExecutionStore;
pub use filter::FilteredUnit;
pub use filter::filter_by_tag;
pub use flow::Flow;
pub use flow::WorkflowDocument;
pub use flow::WorkflowSettings;
pub use layout::WorkspaceLayout;
pub use link::LinkGroup;
pub use link::LinkRegistry;
pub use report::FlowReport;
pub use report::ReportLine;
pub use sequence::LockState;
pub use sequence::lock_states;
pub use share::ImportMode;
pub use share::UnitRef;
pub use store::DocumentStore;
pub use store::Documents;
pub use store::LoadPolicy;
pub use store::save_document;
pub use sync::LinkMatch;
pub use sync::PropagationReport;
pub use sync::SkippedTarget;
pub use template::Level;
pub use template::MAX_LEVELS;
pub use template::Template;
pub use template::TemplateDocument;
pub use template::UnitConfig;
pub use template::ValidationError;
pub use template::load_template_file;
pub use unit::Unit;
pub use unit::UnitEdit;
pub use unit::UnitPath;
pub use workspace::FlowSeed;
pub use workspace::Workspace;

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
