use anyhow::Context;
use anyhow::Result;
use clap::Args;
use clap::Subcommand;
use std::path::Path;
use std::path::PathBuf;
use stratum_workflow::FilteredUnit;
use stratum_workflow::FlowSeed;
use stratum_workflow::ImportMode;
use stratum_workflow::PropagationReport;
use stratum_workflow::UnitEdit;
use stratum_workflow::UnitPath;
use stratum_workflow::UnitRef;
use stratum_workflow::Workspace;
use stratum_workflow::WorkspaceLayout;
use stratum_workflow::load_template_file;
use stratum_workflow::save_document;

const DEFAULT_WIDTH: usize = 100;

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage level templates.
    Template(TemplateCli),
    /// Create, inspect and remove flows.
    Flow(FlowCli),
    /// Edit the unit tree of a flow.
    Unit(UnitCli),
    /// Mark a unit done, or not done with `--undo`.
    Done {
        flow: String,
        path: UnitPath,
        #[arg(long)]
        undo: bool,
    },
    /// Link two flows built from the same template; `b` takes `a`'s structure.
    Link { a: String, b: String },
    /// Remove a flow from its link group.
    Unlink { flow: String },
    /// Push a flow's structure to the rest of its link group.
    Sync { flow: String },
    /// Show the units carrying a tag, with their ancestors.
    Filter { flow: String, tag: String },
    /// Copy a unit subtree into another flow, shared unless `--clone`.
    Share {
        from_flow: String,
        path: UnitPath,
        to_flow: String,
        /// Dotted path of the new parent; omit to attach at the top level.
        parent: Option<UnitPath>,
        #[arg(long)]
        clone: bool,
    },
    /// Change workflow-wide settings.
    Settings {
        #[arg(long = "enforce-sequence", value_name = "BOOL")]
        enforce_sequence: Option<bool>,
    },
}

#[derive(Debug, Args)]
pub struct TemplateCli {
    #[command(subcommand)]
    pub action: TemplateSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum TemplateSubcommand {
    /// Import templates from a YAML or TOML file.
    Import {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    List,
    /// Check a template file without storing anything.
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct FlowCli {
    #[command(subcommand)]
    pub action: FlowSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum FlowSubcommand {
    Create {
        template: String,
        name: String,
        /// Seed the tree with a fresh-id copy of another flow.
        #[arg(long = "copy-of", value_name = "FLOW", conflicts_with = "linked_to")]
        copy_of: Option<String>,
        /// Seed the tree from another flow and link the two.
        #[arg(long = "linked-to", value_name = "FLOW")]
        linked_to: Option<String>,
    },
    List,
    Show {
        flow: String,
        #[arg(long, default_value_t = DEFAULT_WIDTH)]
        width: usize,
    },
    Rename {
        flow: String,
        name: String,
    },
    Delete {
        flow: String,
    },
    /// Write the flow as JSON under the exports directory.
    Export {
        flow: String,
    },
    /// List every tag used in the flow.
    Tags {
        flow: String,
    },
}

#[derive(Debug, Args)]
pub struct UnitCli {
    #[command(subcommand)]
    pub action: UnitSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum UnitSubcommand {
    Add {
        flow: String,
        name: String,
        /// Dotted path of the parent; omit to add a top-level unit.
        #[arg(long)]
        parent: Option<UnitPath>,
    },
    Delete {
        flow: String,
        path: UnitPath,
    },
    Rename {
        flow: String,
        path: UnitPath,
        name: String,
    },
    /// Change content fields the unit's level enables.
    Edit {
        flow: String,
        path: UnitPath,
        #[arg(long)]
        description: Option<String>,
        /// Comma-separated; replaces the unit's tags.
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long)]
        grade: Option<f64>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Move a unit among its siblings by a signed offset.
    Move {
        flow: String,
        path: UnitPath,
        #[arg(allow_hyphen_values = true)]
        offset: isize,
    },
}

pub async fn execute(command: Command, workspace: &mut Workspace, layout: &WorkspaceLayout) -> Result<()> {
    match command {
        Command::Template(cli) => template(cli.action, workspace),
        Command::Flow(cli) => flow(cli.action, workspace, layout).await,
        Command::Unit(cli) => unit(cli.action, workspace),
        Command::Done { flow, path, undo } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            workspace.set_completed(&flow_id, &path, !undo)?;
            print_flow(workspace, &flow_id, DEFAULT_WIDTH)
        }
        Command::Link { a, b } => {
            let a = resolve_flow(workspace, &a)?;
            let b = resolve_flow(workspace, &b)?;
            let report = workspace.link(&a, &b)?;
            print_propagation(&report);
            Ok(())
        }
        Command::Unlink { flow } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            if workspace.unlink(&flow_id)? {
                println!("Unlinked {flow_id}");
            } else {
                println!("{flow_id} is not linked");
            }
            Ok(())
        }
        Command::Sync { flow } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let report = workspace.sync(&flow_id)?;
            print_propagation(&report);
            Ok(())
        }
        Command::Filter { flow, tag } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let view = workspace.filter(&flow_id, &tag)?;
            if view.is_empty() {
                println!("No units tagged #{tag}");
            }
            for node in &view {
                print_filtered(node, 0);
            }
            Ok(())
        }
        Command::Share {
            from_flow,
            path,
            to_flow,
            parent,
            clone,
        } => {
            let from = UnitRef {
                flow_id: resolve_flow(workspace, &from_flow)?,
                path,
            };
            let to_flow = resolve_flow(workspace, &to_flow)?;
            let mode = if clone { ImportMode::Clone } else { ImportMode::Share };
            let parent = parent.unwrap_or_default();
            let at = workspace.import_unit(&from, &to_flow, &parent, mode)?;
            println!("Copied {} into {to_flow} at {at}", from.path);
            Ok(())
        }
        Command::Settings { enforce_sequence } => {
            if let Some(enforce) = enforce_sequence {
                workspace.set_enforce_sequence(enforce);
            }
            println!(
                "enforce-sequence = {}",
                workspace.documents().workflows.settings.enforce_sequence
            );
            Ok(())
        }
    }
}

fn template(action: TemplateSubcommand, workspace: &mut Workspace) -> Result<()> {
    match action {
        TemplateSubcommand::Import { file } => {
            let templates = load_template_file(&file)?;
            let names: Vec<String> = templates.iter().map(|t| format!("{} ({})", t.name, t.id)).collect();
            workspace.import_templates(templates)?;
            for name in names {
                println!("Imported template {name}");
            }
            Ok(())
        }
        TemplateSubcommand::List => {
            for template in workspace.templates() {
                let levels: Vec<&str> = template.levels.iter().map(|l| l.name.as_str()).collect();
                println!("{:<38} {:<24} {}", template.id, template.name, levels.join(" > "));
            }
            Ok(())
        }
        TemplateSubcommand::Validate { file } => validate_template_file(&file),
    }
}

/// Validates every template in `file` and fails if any is invalid.
pub fn validate_template_file(file: &Path) -> Result<()> {
    let mut invalid = 0;
    for template in load_template_file(file)? {
        let errors = template.validate();
        if errors.is_empty() {
            println!("{}: ok", template.name);
        } else {
            invalid += 1;
            println!("{}:", template.name);
            for error in errors {
                println!("  - {error}");
            }
        }
    }
    if invalid > 0 {
        anyhow::bail!("{invalid} invalid template(s) in {}", file.display());
    }
    Ok(())
}

async fn flow(action: FlowSubcommand, workspace: &mut Workspace, layout: &WorkspaceLayout) -> Result<()> {
    match action {
        FlowSubcommand::Create {
            template,
            name,
            copy_of,
            linked_to,
        } => {
            let seed = match (copy_of, linked_to) {
                (Some(source), _) => FlowSeed::CopyOf(resolve_flow(workspace, &source)?),
                (None, Some(source)) => FlowSeed::LinkedTo(resolve_flow(workspace, &source)?),
                (None, None) => FlowSeed::Empty,
            };
            let template_id = resolve_template(workspace, &template)?;
            let flow_id = workspace.create_flow(&template_id, &name, seed)?;
            println!("Created flow {name} ({flow_id})");
            Ok(())
        }
        FlowSubcommand::List => {
            for flow in workspace.flows() {
                let peers = workspace.documents().links.peers(&flow.id);
                let linked = if peers.is_empty() {
                    String::new()
                } else {
                    format!(" linked: {}", peers.join(", "))
                };
                println!("{:<38} {:<24} {}{linked}", flow.id, flow.name, flow.template_snapshot.name);
            }
            Ok(())
        }
        FlowSubcommand::Show { flow, width } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            print_flow(workspace, &flow_id, width)
        }
        FlowSubcommand::Rename { flow, name } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            workspace.rename_flow(&flow_id, &name)?;
            Ok(())
        }
        FlowSubcommand::Delete { flow } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let removed = workspace.delete_flow(&flow_id)?;
            println!("Deleted flow {} ({flow_id})", removed.name);
            Ok(())
        }
        FlowSubcommand::Tags { flow } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            for tag in workspace.flow(&flow_id)?.tags() {
                println!("#{tag}");
            }
            Ok(())
        }
        FlowSubcommand::Export { flow } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let flow = workspace.flow(&flow_id)?;
            let path = layout.export_path(&flow.name);
            save_document(&path, flow)
                .await
                .with_context(|| format!("failed to export flow {flow_id}"))?;
            println!("Exported {} to {}", flow.name, path.display());
            Ok(())
        }
    }
}

fn unit(action: UnitSubcommand, workspace: &mut Workspace) -> Result<()> {
    match action {
        UnitSubcommand::Add { flow, name, parent } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let path = workspace.add_unit(&flow_id, &parent.unwrap_or_default(), &name)?;
            println!("Added {name} at {path}");
        }
        UnitSubcommand::Delete { flow, path } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let removed = workspace.delete_unit(&flow_id, &path)?;
            for unit in removed {
                println!("Removed {} from {}", unit.path, unit.flow_id);
            }
        }
        UnitSubcommand::Rename { flow, path, name } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let edit = UnitEdit {
                name: Some(name),
                ..Default::default()
            };
            workspace.edit_unit(&flow_id, &path, &edit)?;
        }
        UnitSubcommand::Edit {
            flow,
            path,
            description,
            tags,
            grade,
            notes,
        } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let edit = UnitEdit {
                description,
                tags,
                grade,
                notes,
                ..Default::default()
            };
            if edit.is_empty() {
                anyhow::bail!("nothing to edit");
            }
            workspace.edit_unit(&flow_id, &path, &edit)?;
        }
        UnitSubcommand::Move { flow, path, offset } => {
            let flow_id = resolve_flow(workspace, &flow)?;
            let moved = workspace.move_unit(&flow_id, &path, offset)?;
            println!("Moved {path} to {moved}");
        }
    }
    Ok(())
}

/// Accepts a flow id or an unambiguous flow name.
fn resolve_flow(workspace: &Workspace, key: &str) -> Result<String> {
    if workspace.flow(key).is_ok() {
        return Ok(key.to_string());
    }
    let matches: Vec<&str> = workspace
        .flows()
        .iter()
        .filter(|f| f.name == key)
        .map(|f| f.id.as_str())
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => anyhow::bail!("no flow with id or name {key}"),
        _ => anyhow::bail!("flow name {key} is ambiguous; use the flow id"),
    }
}

fn resolve_template(workspace: &Workspace, key: &str) -> Result<String> {
    let matches: Vec<&str> = workspace
        .templates()
        .iter()
        .filter(|t| t.id == key || t.name == key)
        .map(|t| t.id.as_str())
        .collect();
    match matches.as_slice() {
        [id] => Ok((*id).to_string()),
        [] => anyhow::bail!("no template with id or name {key}"),
        _ => anyhow::bail!("template name {key} is ambiguous; use the template id"),
    }
}

fn print_flow(workspace: &Workspace, flow_id: &str, width: usize) -> Result<()> {
    print!("{}", workspace.report(flow_id)?.render(width));
    Ok(())
}

fn print_propagation(report: &PropagationReport) {
    for peer in &report.updated {
        println!("Synced {} -> {peer}", report.source_flow);
    }
    for skipped in &report.skipped {
        println!("Skipped {}: {}", skipped.flow_id, skipped.reason);
    }
}

fn print_filtered(node: &FilteredUnit, depth: usize) {
    let marker = if node.matched { "*" } else { " " };
    println!(
        "{}{marker} {} {}",
        "  ".repeat(depth),
        node.original_path,
        node.unit.name
    );
    for child in &node.children {
        print_filtered(child, depth + 1);
    }
}
