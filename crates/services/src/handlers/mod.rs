use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kodit_db::{
    Branch, CommitIndexStore, CommitStore, EnrichmentStore, EnrichmentSubtype, EnrichmentType, FileStore, NewTask,
    Operation, RepositoryStatus, RepositoryStore, SnippetStore, Tag, TaskStore, TrackableEntity,
};
use kodit_executors::{ExecutionContext, Handler};
use kodit_utils::{KoditError, PriorityBand, Result};
use serde_json::{Value, json};
use sqlx::SqlitePool;

use crate::enrichment::{EnrichmentEngine, EnrichmentInputs};
use crate::git::{Adapter, Cloner, Scanner};
use crate::index::{CodeIndex, EmbeddingProvider, SqliteVectorStore, TextIndex};
use crate::snippets::SnippetExtractor;

fn repository_id(payload: &Value) -> Result<i64> {
    payload
        .get("repository_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| KoditError::invalid_argument("payload missing repository_id"))
}

fn commit_sha(payload: &Value) -> Result<String> {
    payload
        .get("commit_sha")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| KoditError::invalid_argument("payload missing commit_sha"))
}

/// Checked between iterations of any handler that loops over several items
/// (files, snippets, enrichment calls) so a worker shutdown is observed at
/// the next suspension point rather than after the whole loop drains.
fn check_cancelled(ctx: &ExecutionContext<'_>) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(KoditError::Cancelled);
    }
    Ok(())
}

async fn cloned_path(pool: &SqlitePool, repository_id: i64) -> Result<PathBuf> {
    let repo = RepositoryStore::new(pool)
        .get(repository_id)
        .await?
        .ok_or_else(|| KoditError::not_found(format!("repository {repository_id}")))?;
    let path = repo.cloned_path.ok_or(KoditError::RepoNotCloned)?;
    Ok(PathBuf::from(path))
}

/// `INDEX_COMMIT`/`RESCAN_COMMIT` both expand into this sequence (spec
/// §4.9): extract, embed code, summarize, embed summaries, describe
/// architecture.
async fn enqueue_rescan_bundle(pool: &SqlitePool, repository_id: i64, commit_sha: &str, base_priority: i64) -> Result<()> {
    TaskStore::new(pool)
        .enqueue_operations(
            &[
                Operation::ExtractSnippetsForCommit,
                Operation::CreateCodeEmbeddingsForCommit,
                Operation::CreateSummaryEnrichmentForCommit,
                Operation::CreateSummaryEmbeddingsForCommit,
                Operation::CreateArchitectureEnrichmentForCommit,
            ],
            base_priority,
            json!({ "repository_id": repository_id, "commit_sha": commit_sha }),
        )
        .await?;
    Ok(())
}

/// Shared collaborators every handler needs: the Git adapter, the snippet
/// extractor, the enrichment engine, and the embedding provider. Bundled so
/// `LocalDeployment` constructs them once and hands each handler a clone of
/// the `Arc`s (spec §2 component list: Git Orchestrator / Snippet Extractor
/// / Enrichment Engine / Index Builders).
#[derive(Clone)]
pub struct HandlerDeps {
    pub adapter: Arc<dyn Adapter>,
    pub extractor: Arc<dyn SnippetExtractor>,
    pub engine: Arc<dyn EnrichmentEngine>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub workspace_root: PathBuf,
}

impl HandlerDeps {
    fn cloner(&self) -> Cloner<'_> {
        Cloner::new(self.adapter.as_ref(), self.workspace_root.clone())
    }

    fn scanner(&self) -> Scanner<'_> {
        Scanner::new(self.adapter.as_ref())
    }

    fn code_index<'a>(&self, pool: &'a SqlitePool) -> CodeIndex<'a> {
        CodeIndex::new(Arc::new(SqliteVectorStore::new(pool)), self.embeddings.clone())
    }

    fn text_index<'a>(&self, pool: &'a SqlitePool) -> TextIndex<'a> {
        TextIndex::new(Arc::new(SqliteVectorStore::new(pool)), self.embeddings.clone())
    }
}

pub struct CloneRepositoryHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CloneRepositoryHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let repos = RepositoryStore::new(ctx.pool);
        let repo = repos
            .get(repo_id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {repo_id}")))?;

        match self.deps.cloner().clone(&repo.remote_uri, &repo.sanitized_remote_uri) {
            Ok(path) => {
                repos.set_cloned_path(repo_id, &path.display().to_string()).await?;
                repos.set_status(repo_id, RepositoryStatus::Cloned).await?;
                Ok(())
            }
            Err(e) => {
                repos.set_status(repo_id, RepositoryStatus::Failed).await?;
                Err(KoditError::from(e))
            }
        }
    }
}

pub struct FetchRepositoryHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for FetchRepositoryHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let repos = RepositoryStore::new(ctx.pool);
        let repo = repos
            .get(repo_id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {repo_id}")))?;

        match self
            .deps
            .cloner()
            .update(&repo.remote_uri, &repo.sanitized_remote_uri, &repo.tracking_config)
        {
            Ok(_) => {
                repos.set_status(repo_id, RepositoryStatus::Cloned).await?;
                Ok(())
            }
            Err(e) => {
                repos.set_status(repo_id, RepositoryStatus::Failed).await?;
                Err(KoditError::from(e))
            }
        }
    }
}

pub struct ScanBranchesTagsCommitsHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for ScanBranchesTagsCommitsHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let path = cloned_path(ctx.pool, repo_id).await?;
        let scanner = self.deps.scanner();

        let branches: Vec<Branch> = scanner.scan_all_branches(&path, repo_id)?;
        let branch_store = kodit_db::BranchStore::new(ctx.pool);
        for branch in &branches {
            branch_store.upsert(branch).await?;
        }

        let tags: Vec<Tag> = scanner.scan_all_tags(&path, repo_id)?;
        let tag_store = kodit_db::TagStore::new(ctx.pool);
        for tag in &tags {
            tag_store.upsert(tag).await?;
        }

        let commit_infos = self.deps.adapter.all_commits_bulk(&path, None)?;
        let commit_store = CommitStore::new(ctx.pool);
        let file_store = FileStore::new(ctx.pool);
        let commit_index_store = CommitIndexStore::new(ctx.pool);
        let tasks = TaskStore::new(ctx.pool);

        for info in &commit_infos {
            check_cancelled(ctx)?;
            let (commit, files) = scanner.scan_commit(&path, &info.sha, repo_id)?;
            commit_store.save(&commit).await?;
            file_store.replace_for_commit(&commit.sha, &files).await?;

            if commit_index_store.get(&commit.sha).await?.is_none() {
                commit_index_store.mark_pending(&commit.sha).await?;
                tasks
                    .enqueue(NewTask::new(
                        Operation::IndexCommit,
                        ctx.task.priority,
                        json!({ "repository_id": repo_id, "commit_sha": commit.sha }),
                    ))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Composite task: expands into the five-stage rescan sequence for the
/// commit it names (spec §4.9 "The INDEX_COMMIT composite expands into the
/// above rescan sequence").
pub struct IndexCommitHandler;

#[async_trait]
impl Handler for IndexCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let sha = commit_sha(&payload)?;
        enqueue_rescan_bundle(ctx.pool, repo_id, &sha, ctx.task.priority).await
    }
}

/// Directly-invokable equivalent of `INDEX_COMMIT`'s expansion, for callers
/// that want to trigger a rescan without going through discovery (spec
/// §4.9 "RescanCommit" bundle).
pub struct RescanCommitHandler;

#[async_trait]
impl Handler for RescanCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let sha = commit_sha(&payload)?;
        enqueue_rescan_bundle(ctx.pool, repo_id, &sha, PriorityBand::UserInitiated.value()).await
    }
}

pub struct ExtractSnippetsForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for ExtractSnippetsForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let sha = commit_sha(&payload)?;
        let commit_index = CommitIndexStore::new(ctx.pool);

        let result = self.extract(ctx, repo_id, &sha).await;
        if let Err(e) = &result {
            commit_index.mark_failed(&sha, &e.to_string()).await?;
        }
        result
    }
}

impl ExtractSnippetsForCommitHandler {
    async fn extract(&self, ctx: &ExecutionContext<'_>, repo_id: i64, sha: &str) -> Result<()> {
        let pool = ctx.pool;
        let path = cloned_path(pool, repo_id).await?;
        CommitIndexStore::new(pool).mark_processing(sha).await?;

        let files = FileStore::new(pool).list_for_commit(sha).await?;
        let snippets = SnippetStore::new(pool);
        snippets.clear_commit_associations(sha).await?;

        for file in files {
            check_cancelled(ctx)?;
            let content_bytes = self.deps.adapter.file_content(&path, sha, &file.path)?;
            let content = String::from_utf8_lossy(&content_bytes).into_owned();
            for extracted in self.deps.extractor.extract(&file.path, &content, &file.language) {
                let snippet = snippets.upsert(&extracted.content, &file.extension, &file.language).await?;
                snippets.associate_with_commit(&snippet.sha, sha).await?;
                snippets.record_derivation(&snippet.sha, sha, &file.path).await?;
            }
        }
        Ok(())
    }
}

pub struct CreateCodeEmbeddingsForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateCodeEmbeddingsForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let snippets = SnippetStore::new(ctx.pool).list_for_commit(&sha).await?;
        let code_index = self.deps.code_index(ctx.pool);
        for snippet in &snippets {
            check_cancelled(ctx)?;
            code_index.index_snippet(&snippet.sha, &snippet.content).await?;
        }
        Ok(())
    }
}

pub struct CreateSummaryEnrichmentForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateSummaryEnrichmentForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let commit = CommitStore::new(ctx.pool)
            .get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("commit {sha}")))?;
        let snippets = SnippetStore::new(ctx.pool).list_for_commit(&sha).await?;
        let enrichments = EnrichmentStore::new(ctx.pool);

        for snippet in &snippets {
            check_cancelled(ctx)?;
            let inputs = EnrichmentInputs {
                commit_sha: sha.clone(),
                commit_message: commit.message.clone(),
                snippet_contents: vec![snippet.content.clone()],
                file_paths: Vec::new(),
                diff: None,
            };
            let content = self.deps.engine.enrich(EnrichmentSubtype::SnippetSummary, &inputs)?;
            enrichments
                .create_with_association(
                    EnrichmentType::Development,
                    EnrichmentSubtype::SnippetSummary,
                    &content,
                    TrackableEntity::Snippets,
                    &snippet.sha,
                )
                .await?;
        }
        Ok(())
    }
}

pub struct CreateSummaryEmbeddingsForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateSummaryEmbeddingsForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let snippets = SnippetStore::new(ctx.pool).list_for_commit(&sha).await?;
        let enrichments = EnrichmentStore::new(ctx.pool);
        let text_index = self.deps.text_index(ctx.pool);

        for snippet in &snippets {
            check_cancelled(ctx)?;
            let summary = enrichments
                .find_for_entity(TrackableEntity::Snippets, &snippet.sha)
                .await?
                .into_iter()
                .find(|e| e.subtype == EnrichmentSubtype::SnippetSummary);
            if let Some(summary) = summary {
                text_index.index_summary(&snippet.sha, &summary.content).await?;
            }
        }
        Ok(())
    }
}

/// Last stage of the rescan sequence: produces the architecture enrichment
/// and marks the commit's index completed (spec §4.7 "Index Builders" /
/// §4.9).
pub struct CreateArchitectureEnrichmentForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateArchitectureEnrichmentForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let started = Instant::now();
        let commit = CommitStore::new(ctx.pool)
            .get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("commit {sha}")))?;
        let files = FileStore::new(ctx.pool).list_for_commit(&sha).await?;

        let inputs = EnrichmentInputs {
            commit_sha: sha.clone(),
            commit_message: commit.message.clone(),
            snippet_contents: Vec::new(),
            file_paths: files.iter().map(|f| f.path.clone()).collect(),
            diff: None,
        };
        let content = self.deps.engine.enrich(EnrichmentSubtype::Physical, &inputs)?;
        EnrichmentStore::new(ctx.pool)
            .create_with_association(
                EnrichmentType::Architecture,
                EnrichmentSubtype::Physical,
                &content,
                TrackableEntity::GitCommit,
                &sha,
            )
            .await?;

        CommitIndexStore::new(ctx.pool)
            .mark_completed(&sha, files.len() as i64, started.elapsed().as_secs_f64())
            .await?;
        Ok(())
    }
}

pub struct CreateCommitDescriptionForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateCommitDescriptionForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let sha = commit_sha(&payload)?;
        let path = cloned_path(ctx.pool, repo_id).await?;
        let commit = CommitStore::new(ctx.pool)
            .get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("commit {sha}")))?;
        let diff = self.deps.adapter.commit_diff(&path, &sha)?;

        let inputs = EnrichmentInputs {
            commit_sha: sha.clone(),
            commit_message: commit.message.clone(),
            snippet_contents: Vec::new(),
            file_paths: Vec::new(),
            diff: Some(diff),
        };
        let content = self.deps.engine.enrich(EnrichmentSubtype::CommitDescription, &inputs)?;
        EnrichmentStore::new(ctx.pool)
            .create_with_association(
                EnrichmentType::History,
                EnrichmentSubtype::CommitDescription,
                &content,
                TrackableEntity::GitCommit,
                &sha,
            )
            .await?;
        Ok(())
    }
}

pub struct CreateDatabaseSchemaForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateDatabaseSchemaForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let commit = CommitStore::new(ctx.pool)
            .get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("commit {sha}")))?;
        let files = FileStore::new(ctx.pool).list_for_commit(&sha).await?;

        let inputs = EnrichmentInputs {
            commit_sha: sha.clone(),
            commit_message: commit.message.clone(),
            snippet_contents: Vec::new(),
            file_paths: files.iter().map(|f| f.path.clone()).collect(),
            diff: None,
        };
        let content = self.deps.engine.enrich(EnrichmentSubtype::DatabaseSchema, &inputs)?;
        EnrichmentStore::new(ctx.pool)
            .create_with_association(
                EnrichmentType::Architecture,
                EnrichmentSubtype::DatabaseSchema,
                &content,
                TrackableEntity::GitCommit,
                &sha,
            )
            .await?;
        Ok(())
    }
}

pub struct CreateCookbookForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateCookbookForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let commit = CommitStore::new(ctx.pool)
            .get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("commit {sha}")))?;
        let snippets = SnippetStore::new(ctx.pool).list_for_commit(&sha).await?;

        let inputs = EnrichmentInputs {
            commit_sha: sha.clone(),
            commit_message: commit.message.clone(),
            snippet_contents: snippets.iter().map(|s| s.content.clone()).collect(),
            file_paths: Vec::new(),
            diff: None,
        };
        let content = self.deps.engine.enrich(EnrichmentSubtype::Cookbook, &inputs)?;
        EnrichmentStore::new(ctx.pool)
            .create_with_association(
                EnrichmentType::Usage,
                EnrichmentSubtype::Cookbook,
                &content,
                TrackableEntity::GitCommit,
                &sha,
            )
            .await?;
        Ok(())
    }
}

pub struct CreateApiDocsForCommitHandler {
    pub deps: HandlerDeps,
}

#[async_trait]
impl Handler for CreateApiDocsForCommitHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let sha = commit_sha(&payload)?;
        let commit = CommitStore::new(ctx.pool)
            .get(&sha)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("commit {sha}")))?;
        let snippets = SnippetStore::new(ctx.pool).list_for_commit(&sha).await?;

        let inputs = EnrichmentInputs {
            commit_sha: sha.clone(),
            commit_message: commit.message.clone(),
            snippet_contents: snippets.iter().map(|s| s.content.clone()).collect(),
            file_paths: Vec::new(),
            diff: None,
        };
        let content = self.deps.engine.enrich(EnrichmentSubtype::ApiDocs, &inputs)?;
        EnrichmentStore::new(ctx.pool)
            .create_with_association(
                EnrichmentType::Development,
                EnrichmentSubtype::ApiDocs,
                &content,
                TrackableEntity::GitCommit,
                &sha,
            )
            .await?;
        Ok(())
    }
}

pub struct DeleteRepositoryHandler;

#[async_trait]
impl Handler for DeleteRepositoryHandler {
    async fn execute(&self, ctx: &ExecutionContext<'_>, payload: Value) -> Result<()> {
        let repo_id = repository_id(&payload)?;
        let repos = RepositoryStore::new(ctx.pool);
        let repo = repos
            .get(repo_id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {repo_id}")))?;

        if let Some(cloned_path) = &repo.cloned_path {
            let path = Path::new(cloned_path);
            if path.exists() {
                std::fs::remove_dir_all(path).map_err(|e| KoditError::Provider(e.to_string()))?;
            }
        }
        repos.delete(repo_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use kodit_db::connect_in_memory;

    use super::*;
    use crate::enrichment::NoopProvider;
    use crate::index::HashEmbeddingProvider;
    use crate::snippets::DefaultExtractor;

    struct FakeAdapter;

    impl Adapter for FakeAdapter {
        fn clone_repository(&self, _remote_uri: &str, dest: &Path) -> crate::git::adapter::Result<()> {
            std::fs::create_dir_all(dest).map_err(crate::git::adapter::GitOrchestratorError::Io)
        }
        fn repository_exists(&self, path: &Path) -> bool {
            path.exists()
        }
        fn fetch_repository(&self, _path: &Path) -> crate::git::adapter::Result<()> {
            Ok(())
        }
        fn pull_repository(&self, _path: &Path) -> crate::git::adapter::Result<()> {
            Ok(())
        }
        fn checkout_commit(&self, _path: &Path, _sha: &str) -> crate::git::adapter::Result<()> {
            Ok(())
        }
        fn checkout_branch(&self, _path: &Path, _branch: &str) -> crate::git::adapter::Result<()> {
            Ok(())
        }
        fn default_branch(&self, _path: &Path) -> crate::git::adapter::Result<String> {
            Ok("main".to_string())
        }
        fn all_branches(&self, _path: &Path) -> crate::git::adapter::Result<Vec<crate::git::BranchInfo>> {
            Ok(Vec::new())
        }
        fn all_branch_head_shas(&self, _path: &Path) -> crate::git::adapter::Result<Vec<(String, String)>> {
            Ok(Vec::new())
        }
        fn branch_commit_shas(&self, _path: &Path, _branch: &str) -> crate::git::adapter::Result<Vec<String>> {
            Ok(Vec::new())
        }
        fn branch_commits(&self, _path: &Path, _branch: &str) -> crate::git::adapter::Result<Vec<crate::git::CommitInfo>> {
            Ok(Vec::new())
        }
        fn all_commits_bulk(
            &self,
            _path: &Path,
            _since: Option<&str>,
        ) -> crate::git::adapter::Result<Vec<crate::git::CommitInfo>> {
            Ok(Vec::new())
        }
        fn latest_commit_sha(&self, _path: &Path, _branch: &str) -> crate::git::adapter::Result<String> {
            Ok("deadbeef".to_string())
        }
        fn commit_details(&self, _path: &Path, _sha: &str) -> crate::git::adapter::Result<crate::git::CommitInfo> {
            Err(crate::git::adapter::GitOrchestratorError::CommitNotFound("none".into()))
        }
        fn commit_files(&self, _path: &Path, _sha: &str) -> crate::git::adapter::Result<Vec<crate::git::FileInfo>> {
            Ok(Vec::new())
        }
        fn commit_diff(&self, _path: &Path, _sha: &str) -> crate::git::adapter::Result<crate::git::CommitDiff> {
            Ok(crate::git::CommitDiff {
                files: Vec::new(),
                total_insertions: 0,
                total_deletions: 0,
            })
        }
        fn all_tags(&self, _path: &Path) -> crate::git::adapter::Result<Vec<crate::git::TagInfo>> {
            Ok(Vec::new())
        }
        fn file_content(&self, _path: &Path, _sha: &str, _file_path: &str) -> crate::git::adapter::Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    fn test_deps(workspace_root: PathBuf) -> HandlerDeps {
        HandlerDeps {
            adapter: Arc::new(FakeAdapter),
            extractor: Arc::new(DefaultExtractor::new()),
            engine: Arc::new(crate::enrichment::LlmEnrichmentEngine::new(Arc::new(NoopProvider))),
            embeddings: Arc::new(HashEmbeddingProvider),
            workspace_root,
        }
    }

    #[tokio::test]
    async fn clone_repository_handler_marks_repository_cloned() {
        let pool = connect_in_memory().await.expect("connect");
        let tmp = tempfile::tempdir().expect("tempdir");
        let repos = RepositoryStore::new(&pool);
        let repo = repos
            .create("https://example.com/a.git", "example.com_a.git")
            .await
            .expect("create repo");

        let handler = CloneRepositoryHandler {
            deps: test_deps(tmp.path().to_path_buf()),
        };
        let task = kodit_db::Task {
            id: 1,
            dedup_key: "k".into(),
            operation: Operation::CloneRepository,
            payload: json!({ "repository_id": repo.id }),
            priority: 300,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let ctx = ExecutionContext::new(&pool, &task);

        handler.execute(&ctx, task.payload.clone()).await.expect("clone");

        let updated = repos.get(repo.id).await.expect("get").expect("present");
        assert_eq!(updated.status, RepositoryStatus::Cloned);
        assert!(updated.cloned_path.is_some());
    }

    #[tokio::test]
    async fn delete_repository_handler_removes_row_and_directory() {
        let pool = connect_in_memory().await.expect("connect");
        let tmp = tempfile::tempdir().expect("tempdir");
        let repos = RepositoryStore::new(&pool);
        let repo = repos
            .create("https://example.com/b.git", "example.com_b.git")
            .await
            .expect("create repo");
        repos
            .set_cloned_path(repo.id, &tmp.path().display().to_string())
            .await
            .expect("set cloned path");

        let handler = DeleteRepositoryHandler;
        let task = kodit_db::Task {
            id: 2,
            dedup_key: "k2".into(),
            operation: Operation::DeleteRepository,
            payload: json!({ "repository_id": repo.id }),
            priority: 300,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let ctx = ExecutionContext::new(&pool, &task);
        handler.execute(&ctx, task.payload.clone()).await.expect("delete");

        assert!(repos.get(repo.id).await.expect("get").is_none());
        assert!(!tmp.path().exists());
    }

    #[tokio::test]
    async fn index_commit_handler_expands_into_rescan_bundle() {
        let pool = connect_in_memory().await.expect("connect");
        let handler = IndexCommitHandler;
        let task = kodit_db::Task {
            id: 3,
            dedup_key: "k3".into(),
            operation: Operation::IndexCommit,
            payload: json!({ "repository_id": 1, "commit_sha": "deadbeef" }),
            priority: 210,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let ctx = ExecutionContext::new(&pool, &task);
        handler.execute(&ctx, task.payload.clone()).await.expect("expand");

        let first = TaskStore::new(&pool).dequeue().await.expect("dequeue").expect("task");
        assert_eq!(first.operation, Operation::ExtractSnippetsForCommit);
    }
}
