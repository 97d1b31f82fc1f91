use anyhow::Context;
use std::path::PathBuf;

/// File locations inside a data directory.
#[derive(Debug, Clone)]
pub struct WorkspaceLayout {
    root: PathBuf,
}

impl WorkspaceLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create {}", self.root.display()))
    }

    pub fn templates_file(&self) -> PathBuf {
        self.root.join("templates.json")
    }

    pub fn workflows_file(&self) -> PathBuf {
        self.root.join("workflows.json")
    }

    pub fn executions_file(&self) -> PathBuf {
        self.root.join("executions.json")
    }

    pub fn links_file(&self) -> PathBuf {
        self.root.join("links.json")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("stratum.toml")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    pub fn export_path(&self, flow_name: &str) -> PathBuf {
        self.exports_dir()
            .join(format!("flow-{}.json", sanitize(flow_name)))
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_paths_are_sanitized() {
        let layout = WorkspaceLayout::new(PathBuf::from("/tmp/stratum"));
        assert!(layout.export_path("Q1/2025 audit").ends_with("flow-Q1_2025_audit.json"));
        assert_eq!(
            layout.workflows_file(),
            PathBuf::from("/tmp/stratum/workflows.json")
        );
    }
}
