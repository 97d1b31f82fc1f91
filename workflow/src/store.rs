use crate::error::WorkflowError;
use crate::execution::ExecutionStore;
use crate::flow::WorkflowDocument;
use crate::layout::WorkspaceLayout;
use crate::link::LinkRegistry;
use crate::template::TemplateDocument;
use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use tracing::info;
use tracing::warn;

/// What to do with a document file that exists but cannot be read or parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Surface the problem to the caller.
    #[default]
    Strict,
    /// Log it and continue with an empty document.
    Fallback,
}

/// All four documents, always loaded and saved whole.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Documents {
    pub templates: TemplateDocument,
    pub workflows: WorkflowDocument,
    pub executions: ExecutionStore,
    pub links: LinkRegistry,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    layout: WorkspaceLayout,
    policy: LoadPolicy,
}

impl DocumentStore {
    pub fn new(layout: WorkspaceLayout, policy: LoadPolicy) -> Self {
        Self { layout, policy }
    }

    pub fn layout(&self) -> &WorkspaceLayout {
        &self.layout
    }

    pub async fn load_all(&self) -> anyhow::Result<Documents> {
        Ok(Documents {
            templates: load_document(&self.layout.templates_file(), self.policy).await?,
            workflows: load_document(&self.layout.workflows_file(), self.policy).await?,
            executions: load_document(&self.layout.executions_file(), self.policy).await?,
            links: load_document(&self.layout.links_file(), self.policy).await?,
        })
    }

    pub async fn save_all(&self, documents: &Documents) -> anyhow::Result<()> {
        self.layout.ensure_root().await?;
        save_document(&self.layout.templates_file(), &documents.templates).await?;
        save_document(&self.layout.workflows_file(), &documents.workflows).await?;
        save_document(&self.layout.executions_file(), &documents.executions).await?;
        save_document(&self.layout.links_file(), &documents.links).await?;
        Ok(())
    }
}

/// Loads a whole document. A missing file yields the default document; an
/// unreadable or malformed one is handled according to `policy`.
pub async fn load_document<T>(path: &Path, policy: LoadPolicy) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "document not found; starting empty");
            return Ok(T::default());
        }
        Err(err) => {
            return fallback(policy, path, anyhow::Error::new(err)).with_context(|| {
                format!("failed to read document {}", path.display())
            });
        }
    };
    match serde_json::from_str(&data) {
        Ok(document) => Ok(document),
        Err(err) => {
            let malformed = WorkflowError::MalformedDocument {
                document: path.display().to_string(),
                reason: err.to_string(),
            };
            fallback(policy, path, malformed.into())
        }
    }
}

fn fallback<T: Default>(policy: LoadPolicy, path: &Path, err: anyhow::Error) -> anyhow::Result<T> {
    match policy {
        LoadPolicy::Strict => Err(err),
        LoadPolicy::Fallback => {
            warn!(path = %path.display(), error = %err, "discarding unreadable document");
            Ok(T::default())
        }
    }
}

/// Writes a whole document through a temporary file so readers never see a
/// partial write.
pub async fn save_document<T: Serialize>(path: &Path, document: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp_path = tmp_path(path);
    let data = serde_json::to_vec_pretty(document)?;
    tokio::fs::write(&tmp_path, data)
        .await
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let mut file_name = path
        .file_name()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    file_name.push(".tmp");
    tmp.set_file_name(file_name);
    tmp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::tests::audit_template;
    use pretty_assertions::assert_eq;

    fn store(dir: &Path, policy: LoadPolicy) -> DocumentStore {
        DocumentStore::new(WorkspaceLayout::new(dir.to_path_buf()), policy)
    }

    #[tokio::test]
    async fn missing_files_load_as_empty_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let documents = store(dir.path(), LoadPolicy::Strict)
            .load_all()
            .await
            .expect("load");
        assert_eq!(documents, Documents::default());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(&dir.path().join("data"), LoadPolicy::Strict);
        let mut documents = Documents::default();
        documents.templates.upsert(audit_template()).expect("valid");
        documents.executions.set_completed("f1", "u1", true);
        documents.links.link("f1", "f2");
        documents.workflows.settings.enforce_sequence = true;

        store.save_all(&documents).await.expect("save");
        assert!(!tmp_path(&store.layout().links_file()).exists());
        let loaded = store.load_all().await.expect("load");
        assert_eq!(loaded, documents);
    }

    #[tokio::test]
    async fn malformed_document_respects_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("links.json");
        tokio::fs::write(&path, "{not json").await.expect("write");

        let err = load_document::<LinkRegistry>(&path, LoadPolicy::Strict)
            .await
            .expect_err("strict");
        assert!(matches!(
            err.downcast_ref::<WorkflowError>(),
            Some(WorkflowError::MalformedDocument { .. })
        ));

        let links: LinkRegistry = load_document(&path, LoadPolicy::Fallback)
            .await
            .expect("fallback");
        assert_eq!(links, LinkRegistry::default());
    }

    #[tokio::test]
    async fn partial_documents_coerce_into_default_shape() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("workflows.json");
        tokio::fs::write(&path, r#"{"flows":[{"id":"f1","name":"Q1"}]}"#)
            .await
            .expect("write");
        let doc: WorkflowDocument = load_document(&path, LoadPolicy::Strict)
            .await
            .expect("load");
        assert!(!doc.settings.enforce_sequence);
        assert_eq!(doc.flows[0].data, Vec::new());
        assert_eq!(doc.flows[0].template_snapshot.levels.len(), 0);
    }
}
