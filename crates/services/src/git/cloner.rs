use std::path::{Path, PathBuf};

use kodit_db::TrackingConfig;
use tracing::{info, warn};

use super::adapter::{Adapter, GitOrchestratorError, Result};

/// Clones and updates a repository's working copy (spec §4.4 "Cloner").
pub struct Cloner<'a> {
    adapter: &'a dyn Adapter,
    workspace_root: PathBuf,
}

impl<'a> Cloner<'a> {
    pub fn new(adapter: &'a dyn Adapter, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            adapter,
            workspace_root: workspace_root.into(),
        }
    }

    pub fn local_path(&self, sanitized_remote_uri: &str) -> PathBuf {
        self.workspace_root.join(sanitized_remote_uri)
    }

    /// Clone `remote_uri` into the workspace. On failure the directory is
    /// removed by the adapter to keep the filesystem clean.
    pub fn clone(&self, remote_uri: &str, sanitized_remote_uri: &str) -> Result<PathBuf> {
        let dest = self.local_path(sanitized_remote_uri);
        info!(remote_uri, path = %dest.display(), "cloning repository");
        self.adapter.clone_repository(remote_uri, &dest)?;
        Ok(dest)
    }

    /// Missing local directory triggers re-clone; otherwise dispatch on
    /// tracking config (spec §4.4 "Update").
    pub fn update(&self, remote_uri: &str, sanitized_remote_uri: &str, tracking: &TrackingConfig) -> Result<PathBuf> {
        let dest = self.local_path(sanitized_remote_uri);
        if !dest.exists() {
            return self.clone(remote_uri, sanitized_remote_uri);
        }

        match tracking {
            TrackingConfig::Branch(branch) => {
                self.adapter.fetch_repository(&dest)?;
                if self.adapter.checkout_branch(&dest, branch).is_err() {
                    let default = self.adapter.default_branch(&dest)?;
                    warn!(branch, default, "checkout failed, falling back to default branch");
                    self.adapter.checkout_branch(&dest, &default)?;
                }
                if let Err(e) = self.adapter.pull_repository(&dest) {
                    warn!(error = %e, "pull failed (likely detached HEAD), continuing");
                }
            }
            TrackingConfig::Tag(_) => {
                // Known simplification (spec §9): the adapter's tag list
                // order, not date/semver, decides "latest".
                let tags = self.adapter.all_tags(&dest)?;
                let latest = tags
                    .last()
                    .ok_or_else(|| GitOrchestratorError::InvalidRepository("no tags found".into()))?;
                self.adapter.fetch_repository(&dest)?;
                self.adapter.checkout_commit(&dest, &latest.target_commit_sha)?;
            }
            TrackingConfig::Commit(sha) => {
                self.adapter.fetch_repository(&dest)?;
                self.adapter.checkout_commit(&dest, sha)?;
            }
            TrackingConfig::None => {
                self.adapter.fetch_repository(&dest)?;
            }
        }
        Ok(dest)
    }

    pub fn ensure(&self, remote_uri: &str, sanitized_remote_uri: &str) -> Result<PathBuf> {
        let dest = self.local_path(sanitized_remote_uri);
        self.adapter.ensure_repository(remote_uri, &dest)?;
        Ok(dest)
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.adapter.repository_exists(path)
    }
}
