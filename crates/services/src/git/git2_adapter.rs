use std::path::Path;

use chrono::{TimeZone, Utc};
use git2::{BranchType, DiffOptions, FetchOptions, Repository};
use kodit_utils::language::{detect_language, extension_of};

use super::adapter::{Adapter, BranchInfo, CommitDiff, CommitInfo, FileDiff, FileInfo, GitOrchestratorError, Result, TagInfo};

/// Concrete `Adapter` built on `git2`, mirroring the teacher's
/// `GitService`/`GitRemoteService` thin-wrapper style: plain methods
/// returning plain data, no internal caching.
#[derive(Default)]
pub struct Git2Adapter;

impl Git2Adapter {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, path: &Path) -> Result<Repository> {
        Repository::open(path).map_err(GitOrchestratorError::Git)
    }

    fn commit_info(commit: &git2::Commit<'_>) -> CommitInfo {
        let author = commit.author();
        let committer = commit.committer();
        let authored_at = Utc
            .timestamp_opt(author.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        let committed_at = Utc
            .timestamp_opt(committer.when().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);
        CommitInfo {
            sha: commit.id().to_string(),
            parent_sha: commit.parent_id(0).ok().map(|oid| oid.to_string()),
            author_name: author.name().unwrap_or_default().to_string(),
            author_email: author.email().unwrap_or_default().to_string(),
            committer_name: committer.name().unwrap_or_default().to_string(),
            committer_email: committer.email().unwrap_or_default().to_string(),
            authored_at,
            committed_at,
            message: commit.message().unwrap_or_default().to_string(),
        }
    }
}

impl Adapter for Git2Adapter {
    fn clone_repository(&self, remote_uri: &str, dest: &Path) -> Result<()> {
        match Repository::clone(remote_uri, dest) {
            Ok(_) => Ok(()),
            Err(e) => {
                // Keep the filesystem clean on a failed clone (spec §4.4).
                let _ = std::fs::remove_dir_all(dest);
                Err(GitOrchestratorError::Git(e))
            }
        }
    }

    fn repository_exists(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    fn fetch_repository(&self, path: &Path) -> Result<()> {
        let repo = self.open(path)?;
        let mut remote = repo.find_remote("origin")?;
        let mut opts = FetchOptions::new();
        remote.fetch(&[] as &[&str], Some(&mut opts), None)?;
        Ok(())
    }

    fn pull_repository(&self, path: &Path) -> Result<()> {
        self.fetch_repository(path)?;
        let repo = self.open(path)?;
        let head = repo.head()?;
        let branch_name = head
            .shorthand()
            .ok_or_else(|| GitOrchestratorError::InvalidRepository("detached HEAD".into()))?
            .to_string();
        let upstream_ref = format!("refs/remotes/origin/{branch_name}");
        let oid = repo.refname_to_id(&upstream_ref)?;
        let object = repo.find_object(oid, None)?;
        repo.reset(&object, git2::ResetType::Hard, None)?;
        Ok(())
    }

    fn checkout_commit(&self, path: &Path, sha: &str) -> Result<()> {
        let repo = self.open(path)?;
        let oid = git2::Oid::from_str(sha)?;
        let object = repo.find_object(oid, None)?;
        repo.checkout_tree(&object, None)?;
        repo.set_head_detached(oid)?;
        Ok(())
    }

    fn checkout_branch(&self, path: &Path, branch: &str) -> Result<()> {
        let repo = self.open(path)?;
        let refname = format!("refs/remotes/origin/{branch}");
        let oid = repo
            .refname_to_id(&refname)
            .or_else(|_| repo.refname_to_id(&format!("refs/heads/{branch}")))
            .map_err(|_| GitOrchestratorError::BranchNotFound(branch.to_string()))?;
        let object = repo.find_object(oid, None)?;
        repo.checkout_tree(&object, None)?;
        repo.set_head(&format!("refs/heads/{branch}")).or_else(|_| repo.set_head_detached(oid))?;
        Ok(())
    }

    fn default_branch(&self, path: &Path) -> Result<String> {
        let repo = self.open(path)?;
        let head = repo.head()?;
        Ok(head.shorthand().unwrap_or("main").to_string())
    }

    fn all_branches(&self, path: &Path) -> Result<Vec<BranchInfo>> {
        let repo = self.open(path)?;
        let default = self.default_branch(path)?;
        let mut out = Vec::new();
        for branch in repo.branches(Some(BranchType::Local))? {
            let (branch, _) = branch?;
            let name = branch.name()?.unwrap_or_default().to_string();
            let head_sha = branch
                .get()
                .target()
                .ok_or_else(|| GitOrchestratorError::InvalidRepository(format!("{name} has no target")))?
                .to_string();
            let is_default = name == default;
            out.push(BranchInfo { name, head_sha, is_default });
        }
        Ok(out)
    }

    fn all_branch_head_shas(&self, path: &Path) -> Result<Vec<(String, String)>> {
        Ok(self
            .all_branches(path)?
            .into_iter()
            .map(|b| (b.name, b.head_sha))
            .collect())
    }

    fn branch_commit_shas(&self, path: &Path, branch: &str) -> Result<Vec<String>> {
        Ok(self.branch_commits(path, branch)?.into_iter().map(|c| c.sha).collect())
    }

    fn branch_commits(&self, path: &Path, branch: &str) -> Result<Vec<CommitInfo>> {
        let repo = self.open(path)?;
        let head_sha = self
            .all_branches(path)?
            .into_iter()
            .find(|b| b.name == branch)
            .map(|b| b.head_sha)
            .ok_or_else(|| GitOrchestratorError::BranchNotFound(branch.to_string()))?;

        let mut revwalk = repo.revwalk()?;
        revwalk.push(git2::Oid::from_str(&head_sha)?)?;
        let mut out = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = repo.find_commit(oid)?;
            out.push(Self::commit_info(&commit));
        }
        Ok(out)
    }

    fn all_commits_bulk(&self, path: &Path, since: Option<&str>) -> Result<Vec<CommitInfo>> {
        let repo = self.open(path)?;
        let mut revwalk = repo.revwalk()?;
        revwalk.push_glob("refs/heads/*")?;
        let boundary = since.map(git2::Oid::from_str).transpose()?;
        let mut out = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            if Some(oid) == boundary {
                break;
            }
            let commit = repo.find_commit(oid)?;
            out.push(Self::commit_info(&commit));
        }
        Ok(out)
    }

    fn latest_commit_sha(&self, path: &Path, branch: &str) -> Result<String> {
        self.all_branches(path)?
            .into_iter()
            .find(|b| b.name == branch)
            .map(|b| b.head_sha)
            .ok_or_else(|| GitOrchestratorError::BranchNotFound(branch.to_string()))
    }

    fn commit_details(&self, path: &Path, sha: &str) -> Result<CommitInfo> {
        let repo = self.open(path)?;
        let oid = git2::Oid::from_str(sha)?;
        let commit = repo
            .find_commit(oid)
            .map_err(|_| GitOrchestratorError::CommitNotFound(sha.to_string()))?;
        Ok(Self::commit_info(&commit))
    }

    fn commit_files(&self, path: &Path, sha: &str) -> Result<Vec<FileInfo>> {
        let repo = self.open(path)?;
        let oid = git2::Oid::from_str(sha)?;
        let commit = repo
            .find_commit(oid)
            .map_err(|_| GitOrchestratorError::CommitNotFound(sha.to_string()))?;
        let tree = commit.tree()?;

        let mut out = Vec::new();
        tree.walk(git2::TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() != Some(git2::ObjectType::Blob) {
                return git2::TreeWalkResult::Ok;
            }
            let name = entry.name().unwrap_or_default();
            let path_str = format!("{dir}{name}");
            let extension = extension_of(&path_str);
            let info = detect_language(&extension);
            let size = entry
                .to_object(&repo)
                .ok()
                .and_then(|obj| obj.as_blob().map(|b| b.size() as i64))
                .unwrap_or(0);
            out.push(FileInfo {
                path: path_str,
                blob_sha: entry.id().to_string(),
                mime_type: info.mime_type,
                extension,
                language: info.language,
                size,
            });
            git2::TreeWalkResult::Ok
        })?;
        Ok(out)
    }

    fn commit_diff(&self, path: &Path, sha: &str) -> Result<CommitDiff> {
        let repo = self.open(path)?;
        let oid = git2::Oid::from_str(sha)?;
        let commit = repo
            .find_commit(oid)
            .map_err(|_| GitOrchestratorError::CommitNotFound(sha.to_string()))?;
        let tree = commit.tree()?;
        let parent_tree = commit.parent(0).ok().and_then(|p| p.tree().ok());

        let mut opts = DiffOptions::new();
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))?;

        let mut files: Vec<FileDiff> = Vec::new();
        let mut total_insertions = 0usize;
        let mut total_deletions = 0usize;

        diff.foreach(
            &mut |delta, _| {
                let path = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                files.push(FileDiff {
                    path,
                    unified_diff: String::new(),
                    insertions: 0,
                    deletions: 0,
                });
                true
            },
            None,
            None,
            Some(&mut |delta, _hunk, line| {
                let path = delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                if let Some(entry) = files.iter_mut().find(|f| f.path == path) {
                    let prefix = match line.origin() {
                        '+' => {
                            entry.insertions += 1;
                            total_insertions += 1;
                            "+"
                        }
                        '-' => {
                            entry.deletions += 1;
                            total_deletions += 1;
                            "-"
                        }
                        _ => " ",
                    };
                    entry.unified_diff.push_str(prefix);
                    entry.unified_diff.push_str(&String::from_utf8_lossy(line.content()));
                }
                true
            }),
        )?;

        Ok(CommitDiff {
            files,
            total_insertions,
            total_deletions,
        })
    }

    fn all_tags(&self, path: &Path) -> Result<Vec<TagInfo>> {
        let repo = self.open(path)?;
        let mut out = Vec::new();
        repo.tag_foreach(|oid, name_bytes| {
            let name = String::from_utf8_lossy(name_bytes)
                .trim_start_matches("refs/tags/")
                .to_string();
            let info = match repo.find_tag(oid) {
                Ok(tag) => {
                    let target_sha = tag.target_id().to_string();
                    let tagger = tag.tagger();
                    TagInfo {
                        name,
                        target_commit_sha: target_sha,
                        annotation_message: tag.message().map(str::to_string),
                        annotation_tagger: tagger.as_ref().and_then(|s| s.name()).map(str::to_string),
                        annotation_tagged_at: tagger.and_then(|s| {
                            Utc.timestamp_opt(s.when().seconds(), 0).single()
                        }),
                    }
                }
                Err(_) => TagInfo {
                    name,
                    target_commit_sha: oid.to_string(),
                    annotation_message: None,
                    annotation_tagger: None,
                    annotation_tagged_at: None,
                },
            };
            out.push(info);
            true
        })?;
        Ok(out)
    }

    fn file_content(&self, path: &Path, sha: &str, file_path: &str) -> Result<Vec<u8>> {
        let repo = self.open(path)?;
        let oid = git2::Oid::from_str(sha)?;
        let commit = repo
            .find_commit(oid)
            .map_err(|_| GitOrchestratorError::CommitNotFound(sha.to_string()))?;
        let tree = commit.tree()?;
        let entry = tree
            .get_path(Path::new(file_path))
            .map_err(|_| GitOrchestratorError::InvalidRepository(format!("{file_path} not found in {sha}")))?;
        let object = entry.to_object(&repo)?;
        let blob = object
            .as_blob()
            .ok_or_else(|| GitOrchestratorError::InvalidRepository(format!("{file_path} is not a blob")))?;
        Ok(blob.content().to_vec())
    }
}

