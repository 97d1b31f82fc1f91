use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use stratum_workflow::DocumentStore;
use stratum_workflow::Workspace;
use stratum_workflow::WorkspaceConfig;
use stratum_workflow::WorkspaceLayout;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod workflow_cmd;

use workflow_cmd::Command;

/// Hierarchical checklist workflows from the command line.
#[derive(Debug, Parser)]
#[command(name = "stratum", version)]
struct Cli {
    /// Directory holding the workflow documents and `stratum.toml`.
    #[arg(long = "data-dir", env = "STRATUM_DATA_DIR", default_value = ".stratum")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let layout = WorkspaceLayout::new(cli.data_dir);
    let config = WorkspaceConfig::load(&layout.config_file()).await?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Command::Template(workflow_cmd::TemplateCli {
        action: workflow_cmd::TemplateSubcommand::Validate { file },
    }) = &cli.command
    {
        return workflow_cmd::validate_template_file(file);
    }

    let fresh = !tokio::fs::try_exists(layout.workflows_file()).await?;
    let store = DocumentStore::new(layout, config.load_policy);
    let documents = store.load_all().await?;
    let mut workspace = Workspace::new(documents, &config);
    if fresh && config.enforce_sequence {
        workspace.set_enforce_sequence(true);
    }

    workflow_cmd::execute(cli.command, &mut workspace, store.layout()).await?;
    store.save_all(workspace.documents()).await
}
