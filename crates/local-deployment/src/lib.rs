use std::path::PathBuf;
use std::sync::Arc;

use kodit_deployment::Deployment;
use kodit_executors::{HandlerRegistry, WorkerRuntime};
use kodit_services::enrichment::{LlmEnrichmentEngine, NoopProvider};
use kodit_services::handlers::{
    CloneRepositoryHandler, CreateApiDocsForCommitHandler, CreateArchitectureEnrichmentForCommitHandler,
    CreateCodeEmbeddingsForCommitHandler, CreateCommitDescriptionForCommitHandler, CreateCookbookForCommitHandler,
    CreateDatabaseSchemaForCommitHandler, CreateSummaryEmbeddingsForCommitHandler, CreateSummaryEnrichmentForCommitHandler,
    DeleteRepositoryHandler, ExtractSnippetsForCommitHandler, FetchRepositoryHandler, HandlerDeps, IndexCommitHandler,
    RescanCommitHandler, ScanBranchesTagsCommitsHandler,
};
use kodit_services::index::HashEmbeddingProvider;
use kodit_services::snippets::DefaultExtractor;
use kodit_services::{Git2Adapter, RepositoryLifecycle};
use kodit_utils::{Result, WorkerConfig};
use kodit_db::Operation;
use sqlx::SqlitePool;

/// The single-host reference deployment (spec §2 "local-first"): a SQLite
/// pool, a `git2`-backed Git Orchestrator, and hash/noop stand-ins for the
/// embedding model and LLM provider in place of a real network dependency.
pub struct LocalDeployment {
    pool: SqlitePool,
    registry: Arc<HandlerRegistry>,
    worker_config: WorkerConfig,
}

impl LocalDeployment {
    /// `database_url` is an `sqlite://` URI (or `:memory:`); `workspace_root`
    /// is where repository working copies are cloned to (spec §4.4
    /// "Cloner").
    pub async fn new(database_url: &str, workspace_root: impl Into<PathBuf>) -> Result<Self> {
        let pool = kodit_db::connect(database_url).await?;
        let registry = Arc::new(HandlerRegistry::new());

        let deps = HandlerDeps {
            adapter: Arc::new(Git2Adapter::new()),
            extractor: Arc::new(DefaultExtractor::new()),
            engine: Arc::new(LlmEnrichmentEngine::new(Arc::new(NoopProvider))),
            embeddings: Arc::new(HashEmbeddingProvider),
            workspace_root: workspace_root.into(),
        };
        register_handlers(&registry, deps).await;

        Ok(Self {
            pool,
            registry,
            worker_config: WorkerConfig::default(),
        })
    }

    pub fn lifecycle(&self) -> RepositoryLifecycle<'_> {
        RepositoryLifecycle::new(&self.pool)
    }

    /// Spawn the worker runtime's poll loop. Dropping the returned handle
    /// does not stop it; call `stop` explicitly on shutdown.
    pub async fn start_worker(&self) -> Arc<WorkerRuntime> {
        let worker = Arc::new(WorkerRuntime::new(
            self.pool.clone(),
            self.registry.clone(),
            self.worker_config.poll_interval,
        ));
        worker.start().await;
        worker
    }
}

impl Deployment for LocalDeployment {
    fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn handlers(&self) -> &HandlerRegistry {
        &self.registry
    }

    fn worker_config(&self) -> WorkerConfig {
        self.worker_config
    }
}

async fn register_handlers(registry: &HandlerRegistry, deps: HandlerDeps) {
    registry
        .register(Operation::CloneRepository, Arc::new(CloneRepositoryHandler { deps: deps.clone() }))
        .await;
    registry
        .register(Operation::FetchRepository, Arc::new(FetchRepositoryHandler { deps: deps.clone() }))
        .await;
    registry
        .register(
            Operation::ScanBranchesTagsCommits,
            Arc::new(ScanBranchesTagsCommitsHandler { deps: deps.clone() }),
        )
        .await;
    registry.register(Operation::IndexCommit, Arc::new(IndexCommitHandler)).await;
    registry
        .register(
            Operation::ExtractSnippetsForCommit,
            Arc::new(ExtractSnippetsForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateCodeEmbeddingsForCommit,
            Arc::new(CreateCodeEmbeddingsForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateSummaryEnrichmentForCommit,
            Arc::new(CreateSummaryEnrichmentForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateSummaryEmbeddingsForCommit,
            Arc::new(CreateSummaryEmbeddingsForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateArchitectureEnrichmentForCommit,
            Arc::new(CreateArchitectureEnrichmentForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateCommitDescriptionForCommit,
            Arc::new(CreateCommitDescriptionForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateDatabaseSchemaForCommit,
            Arc::new(CreateDatabaseSchemaForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(
            Operation::CreateCookbookForCommit,
            Arc::new(CreateCookbookForCommitHandler { deps: deps.clone() }),
        )
        .await;
    registry
        .register(Operation::CreateApiDocsForCommit, Arc::new(CreateApiDocsForCommitHandler { deps: deps.clone() }))
        .await;
    registry.register(Operation::DeleteRepository, Arc::new(DeleteRepositoryHandler)).await;
    registry.register(Operation::RescanCommit, Arc::new(RescanCommitHandler)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_operation_has_a_registered_handler() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let deployment = LocalDeployment::new("sqlite::memory:", tmp.path().to_path_buf())
            .await
            .expect("build deployment");

        for operation in [
            Operation::CloneRepository,
            Operation::FetchRepository,
            Operation::ScanBranchesTagsCommits,
            Operation::IndexCommit,
            Operation::ExtractSnippetsForCommit,
            Operation::CreateCodeEmbeddingsForCommit,
            Operation::CreateSummaryEnrichmentForCommit,
            Operation::CreateSummaryEmbeddingsForCommit,
            Operation::CreateArchitectureEnrichmentForCommit,
            Operation::CreateCommitDescriptionForCommit,
            Operation::CreateDatabaseSchemaForCommit,
            Operation::CreateCookbookForCommit,
            Operation::CreateApiDocsForCommit,
            Operation::DeleteRepository,
            Operation::RescanCommit,
        ] {
            assert!(
                deployment.handlers().get(operation).await.is_some(),
                "missing handler for {operation}"
            );
        }
    }

    #[tokio::test]
    async fn adding_a_repository_enqueues_a_task_the_worker_can_process() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let deployment = LocalDeployment::new("sqlite::memory:", tmp.path().to_path_buf())
            .await
            .expect("build deployment");

        deployment
            .lifecycle()
            .add("https://example.com/nonexistent.git", kodit_db::TrackingConfig::None)
            .await
            .expect("add repository");

        let worker = WorkerRuntime::new(deployment.pool.clone(), deployment.registry.clone(), deployment.worker_config.poll_interval);
        let ran = worker.process_one().await.expect("process clone task");
        assert!(ran, "clone task should have been dequeued");
    }
}
