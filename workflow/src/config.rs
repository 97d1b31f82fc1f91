use crate::store::LoadPolicy;
use crate::sync::LinkMatch;
use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Settings read from `stratum.toml` in the data directory. Every key is
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// `enforceSequence` for a workflow document created from scratch.
    pub enforce_sequence: bool,
    /// Overrides the document's link matching strategy when set.
    pub link_match: Option<LinkMatch>,
    pub load_policy: LoadPolicy,
    pub log_filter: Option<String>,
}

impl WorkspaceConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config {}", path.display()));
            }
        };
        toml::from_str(&contents).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
