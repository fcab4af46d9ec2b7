pub mod enrichment;
pub mod git;
pub mod handlers;
pub mod index;
pub mod lifecycle;
pub mod search;
pub mod snippets;
pub mod status;

pub use enrichment::{EnrichmentEngine, EnrichmentError, EnrichmentInputs, LlmEnrichmentEngine, LlmProvider, NoopProvider};
pub use git::{Adapter, BranchInfo, Cloner, CommitDiff, CommitInfo, FileDiff, FileInfo, Git2Adapter, GitOrchestratorError, Scanner, TagInfo};
pub use handlers::{
    CloneRepositoryHandler, CreateApiDocsForCommitHandler, CreateArchitectureEnrichmentForCommitHandler,
    CreateCodeEmbeddingsForCommitHandler, CreateCommitDescriptionForCommitHandler, CreateCookbookForCommitHandler,
    CreateDatabaseSchemaForCommitHandler, CreateSummaryEmbeddingsForCommitHandler, CreateSummaryEnrichmentForCommitHandler,
    DeleteRepositoryHandler, ExtractSnippetsForCommitHandler, FetchRepositoryHandler, HandlerDeps, IndexCommitHandler,
    RescanCommitHandler, ScanBranchesTagsCommitsHandler,
};
pub use index::{CodeIndex, EmbeddingProvider, HashEmbeddingProvider, IndexError, SqliteVectorStore, TextIndex, VectorResult, VectorStore};
pub use lifecycle::{REPOSITORY_TRACKABLE_TYPE, RepositoryLifecycle};
pub use search::{HybridSearch, MultiRequest, MultiSearchResult, reciprocal_rank_fusion};
pub use snippets::{DefaultExtractor, ExtractedSnippet, SnippetExtractor};
pub use status::{RepositoryStatusSummary, StatusNode, StatusTracker};
