use std::path::Path;

use kodit_db::{Branch, Commit, File as DbFile, Signature, Tag};

use super::adapter::{Adapter, Result};

/// Read-only extraction from a cloned tree into domain entities (spec §4.4
/// "Scanner").
pub struct Scanner<'a> {
    adapter: &'a dyn Adapter,
}

impl<'a> Scanner<'a> {
    pub fn new(adapter: &'a dyn Adapter) -> Self {
        Self { adapter }
    }

    pub fn scan_commit(&self, path: &Path, sha: &str, repo_id: i64) -> Result<(Commit, Vec<DbFile>)> {
        let info = self.adapter.commit_details(path, sha)?;
        let commit = Commit {
            sha: info.sha.clone(),
            repo_id,
            parent_sha: info.parent_sha,
            author: Signature {
                name: info.author_name,
                email: info.author_email,
            },
            committer: Signature {
                name: info.committer_name,
                email: info.committer_email,
            },
            authored_at: info.authored_at,
            committed_at: info.committed_at,
            message: info.message,
            created_at: chrono::Utc::now(),
        };
        let files = self
            .adapter
            .commit_files(path, sha)?
            .into_iter()
            .map(|f| DbFile {
                commit_sha: sha.to_string(),
                path: f.path,
                blob_sha: f.blob_sha,
                mime_type: f.mime_type,
                extension: f.extension,
                language: f.language,
                size: f.size,
            })
            .collect();
        Ok((commit, files))
    }

    pub fn scan_branch(&self, path: &Path, branch: &str, repo_id: i64) -> Result<Vec<Commit>> {
        Ok(self
            .adapter
            .branch_commits(path, branch)?
            .into_iter()
            .map(|info| Commit {
                sha: info.sha,
                repo_id,
                parent_sha: info.parent_sha,
                author: Signature {
                    name: info.author_name,
                    email: info.author_email,
                },
                committer: Signature {
                    name: info.committer_name,
                    email: info.committer_email,
                },
                authored_at: info.authored_at,
                committed_at: info.committed_at,
                message: info.message,
                created_at: chrono::Utc::now(),
            })
            .collect())
    }

    pub fn scan_all_branches(&self, path: &Path, repo_id: i64) -> Result<Vec<Branch>> {
        Ok(self
            .adapter
            .all_branches(path)?
            .into_iter()
            .map(|b| Branch {
                repo_id,
                name: b.name,
                head_commit_sha: b.head_sha,
                is_default: b.is_default,
            })
            .collect())
    }

    pub fn scan_all_tags(&self, path: &Path, repo_id: i64) -> Result<Vec<Tag>> {
        Ok(self
            .adapter
            .all_tags(path)?
            .into_iter()
            .map(|t| Tag {
                repo_id,
                name: t.name,
                target_commit_sha: t.target_commit_sha,
                annotation: match (t.annotation_message, t.annotation_tagger, t.annotation_tagged_at) {
                    (Some(message), Some(tagger), Some(tagged_at)) => {
                        Some(kodit_db::Annotation { message, tagger, tagged_at })
                    }
                    _ => None,
                },
            })
            .collect())
    }

    /// One adapter call per SHA, memory shared across calls (spec §4.4
    /// "FilesForCommitsBatch").
    pub fn files_for_commits_batch(&self, path: &Path, shas: &[String]) -> Result<Vec<DbFile>> {
        let mut out = Vec::new();
        for sha in shas {
            out.extend(self.adapter.commit_files(path, sha)?.into_iter().map(|f| DbFile {
                commit_sha: sha.clone(),
                path: f.path,
                blob_sha: f.blob_sha,
                mime_type: f.mime_type,
                extension: f.extension,
                language: f.language,
                size: f.size,
            }));
        }
        Ok(out)
    }
}
