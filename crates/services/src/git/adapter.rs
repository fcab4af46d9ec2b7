use std::path::Path;

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitOrchestratorError {
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error("invalid repository state: {0}")]
    InvalidRepository(String),
    #[error("branch not found: {0}")]
    BranchNotFound(String),
    #[error("commit not found: {0}")]
    CommitNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<GitOrchestratorError> for kodit_utils::KoditError {
    fn from(err: GitOrchestratorError) -> Self {
        kodit_utils::KoditError::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GitOrchestratorError>;

#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub sha: String,
    pub parent_sha: Option<String>,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub authored_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub name: String,
    pub head_sha: String,
    pub is_default: bool,
}

#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: String,
    pub blob_sha: String,
    pub mime_type: String,
    pub extension: String,
    pub language: String,
    pub size: i64,
}

#[derive(Debug, Clone)]
pub struct TagInfo {
    pub name: String,
    pub target_commit_sha: String,
    pub annotation_message: Option<String>,
    pub annotation_tagger: Option<String>,
    pub annotation_tagged_at: Option<DateTime<Utc>>,
}

/// Unified diff text per file plus insertion/deletion counts (SPEC_FULL §2
/// supplement — consumed by `CREATE_COMMIT_DESCRIPTION_FOR_COMMIT`).
#[derive(Debug, Clone)]
pub struct CommitDiff {
    pub files: Vec<FileDiff>,
    pub total_insertions: usize,
    pub total_deletions: usize,
}

#[derive(Debug, Clone)]
pub struct FileDiff {
    pub path: String,
    pub unified_diff: String,
    pub insertions: usize,
    pub deletions: usize,
}

/// Capability set a concrete Git driver must implement (spec §6.3). The
/// scanner and cloner are built entirely in terms of this trait so a
/// non-`git2` driver (or a test fake) can stand in for it.
pub trait Adapter: Send + Sync {
    fn clone_repository(&self, remote_uri: &str, dest: &Path) -> Result<()>;
    fn repository_exists(&self, path: &Path) -> bool;
    fn ensure_repository(&self, remote_uri: &str, dest: &Path) -> Result<()> {
        if self.repository_exists(dest) {
            self.fetch_repository(dest)
        } else {
            self.clone_repository(remote_uri, dest)
        }
    }
    fn fetch_repository(&self, path: &Path) -> Result<()>;
    fn pull_repository(&self, path: &Path) -> Result<()>;
    fn checkout_commit(&self, path: &Path, sha: &str) -> Result<()>;
    fn checkout_branch(&self, path: &Path, branch: &str) -> Result<()>;

    fn default_branch(&self, path: &Path) -> Result<String>;
    fn all_branches(&self, path: &Path) -> Result<Vec<BranchInfo>>;
    fn all_branch_head_shas(&self, path: &Path) -> Result<Vec<(String, String)>>;
    fn branch_commit_shas(&self, path: &Path, branch: &str) -> Result<Vec<String>>;
    fn branch_commits(&self, path: &Path, branch: &str) -> Result<Vec<CommitInfo>>;
    fn all_commits_bulk(&self, path: &Path, since: Option<&str>) -> Result<Vec<CommitInfo>>;
    fn latest_commit_sha(&self, path: &Path, branch: &str) -> Result<String>;
    fn commit_details(&self, path: &Path, sha: &str) -> Result<CommitInfo>;
    fn commit_files(&self, path: &Path, sha: &str) -> Result<Vec<FileInfo>>;
    fn commit_diff(&self, path: &Path, sha: &str) -> Result<CommitDiff>;
    fn all_tags(&self, path: &Path) -> Result<Vec<TagInfo>>;
    fn file_content(&self, path: &Path, sha: &str, file_path: &str) -> Result<Vec<u8>>;
}
