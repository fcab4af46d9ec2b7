use kodit_db::{NewTask, Operation, Repository, RepositoryStatus, RepositoryStore, TaskStore, TrackingConfig, sanitize_remote_uri};
use kodit_utils::{KoditError, PriorityBand, Result};
use serde_json::json;
use sqlx::SqlitePool;
use tracing::info;

/// Trackable-entity kind used when binding Statuses to a repository (spec
/// §4.3 "Status").
pub const REPOSITORY_TRACKABLE_TYPE: &str = "repository";

/// Orchestrates the Repository state machine and the task bundles that
/// drive it (spec §4.9). Handlers perform the actual work and advance
/// `cloning -> cloned`, `syncing -> cloned`, and `-> failed`; this service
/// owns the guards, the initial/terminal transitions, and bundle shape.
pub struct RepositoryLifecycle<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RepositoryLifecycle<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    fn repos(&self) -> RepositoryStore<'a> {
        RepositoryStore::new(self.pool)
    }

    fn tasks(&self) -> TaskStore<'a> {
        TaskStore::new(self.pool)
    }

    /// `CLONE_REPOSITORY -> SCAN_BRANCHES_TAGS_COMMITS`, base priority
    /// UserInitiated. The scan handler discovers commits and enqueues
    /// `INDEX_COMMIT` per commit once they're known.
    pub async fn add(&self, remote_uri: &str, tracking: TrackingConfig) -> Result<Repository> {
        let sanitized = sanitize_remote_uri(remote_uri);
        if self.repos().find_by_remote_uri(&sanitized).await?.is_some() {
            return Err(KoditError::RepoAlreadyExists);
        }

        let repos = self.repos();
        let repository = repos.create(remote_uri, &sanitized).await?;
        repos.set_tracking_config(repository.id, &tracking).await?;

        self.tasks()
            .enqueue_operations(
                &[Operation::CloneRepository, Operation::ScanBranchesTagsCommits],
                PriorityBand::UserInitiated.value(),
                json!({ "repository_id": repository.id }),
            )
            .await?;

        repos.set_status(repository.id, RepositoryStatus::Cloning).await?;
        info!(repository_id = repository.id, remote_uri, "repository add requested");

        repos
            .get(repository.id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {}", repository.id)))
    }

    /// `FETCH_REPOSITORY -> SCAN_BRANCHES_TAGS_COMMITS`, base priority
    /// Normal.
    pub async fn request_sync(&self, repository_id: i64) -> Result<()> {
        let repos = self.repos();
        let repository = repos
            .get(repository_id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {repository_id}")))?;
        if !repository.status.can_sync() {
            return Err(KoditError::RepoNotCloned);
        }

        self.tasks()
            .enqueue_operations(
                &[Operation::FetchRepository, Operation::ScanBranchesTagsCommits],
                PriorityBand::Normal.value(),
                json!({ "repository_id": repository_id }),
            )
            .await?;

        repos.set_status(repository_id, RepositoryStatus::Syncing).await?;
        info!(repository_id, "repository sync requested");
        Ok(())
    }

    /// `EXTRACT_SNIPPETS_FOR_COMMIT -> CREATE_CODE_EMBEDDINGS_FOR_COMMIT ->
    /// CREATE_SUMMARY_ENRICHMENT_FOR_COMMIT ->
    /// CREATE_SUMMARY_EMBEDDINGS_FOR_COMMIT ->
    /// CREATE_ARCHITECTURE_ENRICHMENT_FOR_COMMIT`, base priority
    /// UserInitiated. The caller is responsible for verifying `commit_sha`
    /// belongs to `repository_id` (spec §4.9).
    pub async fn request_rescan(&self, repository_id: i64, commit_sha: &str) -> Result<()> {
        let repository = self
            .repos()
            .get(repository_id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {repository_id}")))?;
        if repository.cloned_path.is_none() {
            return Err(KoditError::RepoNotCloned);
        }

        self.tasks()
            .enqueue_operations(
                &[
                    Operation::ExtractSnippetsForCommit,
                    Operation::CreateCodeEmbeddingsForCommit,
                    Operation::CreateSummaryEnrichmentForCommit,
                    Operation::CreateSummaryEmbeddingsForCommit,
                    Operation::CreateArchitectureEnrichmentForCommit,
                ],
                PriorityBand::UserInitiated.value(),
                json!({ "repository_id": repository_id, "commit_sha": commit_sha }),
            )
            .await?;

        info!(repository_id, commit_sha, "commit rescan requested");
        Ok(())
    }

    /// Rewrites tracking config in place; takes effect on the next sync
    /// (spec §4.9).
    pub async fn update_tracking_config(&self, repository_id: i64, tracking: TrackingConfig) -> Result<()> {
        self.repos().set_tracking_config(repository_id, &tracking).await?;
        Ok(())
    }

    /// Single `DELETE_REPOSITORY` task at UserInitiated priority. The
    /// handler performs the actual row/working-copy cleanup; this call only
    /// transitions to `deleting` and enqueues the work.
    pub async fn delete(&self, repository_id: i64) -> Result<()> {
        let repos = self.repos();
        let repository = repos
            .get(repository_id)
            .await?
            .ok_or_else(|| KoditError::not_found(format!("repository {repository_id}")))?;
        if !repository.status.can_delete() {
            return Err(KoditError::precondition("repository is already being deleted"));
        }

        self.tasks()
            .enqueue_operations(
                &[Operation::DeleteRepository],
                PriorityBand::UserInitiated.value(),
                json!({ "repository_id": repository_id }),
            )
            .await?;

        repos.set_status(repository_id, RepositoryStatus::Deleting).await?;
        info!(repository_id, "repository delete requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodit_db::connect_in_memory;

    #[tokio::test]
    async fn add_creates_cloning_repository_and_enqueues_bundle() {
        let pool = connect_in_memory().await.expect("connect");
        let lifecycle = RepositoryLifecycle::new(&pool);

        let repo = lifecycle
            .add("https://github.com/foo/bar.git", TrackingConfig::None)
            .await
            .expect("add");
        assert_eq!(repo.status, RepositoryStatus::Cloning);

        let task = TaskStore::new(&pool).dequeue().await.expect("dequeue").expect("a task");
        assert_eq!(task.operation, Operation::CloneRepository);
        assert_eq!(task.priority, PriorityBand::UserInitiated.value() + 10);
    }

    #[tokio::test]
    async fn add_twice_fails_with_already_exists() {
        let pool = connect_in_memory().await.expect("connect");
        let lifecycle = RepositoryLifecycle::new(&pool);
        lifecycle
            .add("https://github.com/foo/bar.git", TrackingConfig::None)
            .await
            .expect("first add");

        let err = lifecycle
            .add("https://github.com/foo/bar.git", TrackingConfig::None)
            .await
            .expect_err("second add must fail");
        assert!(matches!(err, KoditError::RepoAlreadyExists));
    }

    #[tokio::test]
    async fn sync_before_cloned_fails_with_repo_not_cloned() {
        let pool = connect_in_memory().await.expect("connect");
        let lifecycle = RepositoryLifecycle::new(&pool);
        let repo = lifecycle
            .add("https://github.com/foo/bar.git", TrackingConfig::None)
            .await
            .expect("add");

        let err = lifecycle.request_sync(repo.id).await.expect_err("must fail");
        assert!(matches!(err, KoditError::RepoNotCloned));
    }

    #[tokio::test]
    async fn sync_after_cloned_enqueues_normal_priority_bundle() {
        let pool = connect_in_memory().await.expect("connect");
        let lifecycle = RepositoryLifecycle::new(&pool);
        let repo = lifecycle
            .add("https://github.com/foo/bar.git", TrackingConfig::None)
            .await
            .expect("add");

        RepositoryStore::new(&pool)
            .set_status(repo.id, RepositoryStatus::Cloned)
            .await
            .expect("mark cloned");
        lifecycle.request_sync(repo.id).await.expect("sync");

        let task = TaskStore::new(&pool).dequeue().await.expect("dequeue").expect("a task");
        assert_eq!(task.operation, Operation::FetchRepository);
        assert_eq!(task.priority, PriorityBand::Normal.value() + 10);
    }

    #[tokio::test]
    async fn delete_when_already_deleting_fails_precondition() {
        let pool = connect_in_memory().await.expect("connect");
        let lifecycle = RepositoryLifecycle::new(&pool);
        let repo = lifecycle
            .add("https://github.com/foo/bar.git", TrackingConfig::None)
            .await
            .expect("add");
        lifecycle.delete(repo.id).await.expect("first delete");

        let err = lifecycle.delete(repo.id).await.expect_err("must fail");
        assert!(matches!(err, KoditError::Precondition(_)));
    }
}
