pub mod models;
pub mod pool;

pub use models::branch::{Branch, BranchStore};
pub use models::commit::{Commit, CommitStore, Signature};
pub use models::commit_index::{CommitIndex, CommitIndexStatus, CommitIndexStore};
pub use models::embedding::{Embedding, EmbeddingStore, Modality};
pub use models::enrichment::{Enrichment, EnrichmentStore, EnrichmentSubtype, EnrichmentType, TrackableEntity};
pub use models::file::{File, FileStore};
pub use models::repository::{Repository, RepositoryStatus, RepositoryStore, TrackingConfig, sanitize_remote_uri};
pub use models::snippet::{Snippet, SnippetStore, content_sha};
pub use models::status::{Status, StatusState, StatusStore};
pub use models::tag::{Annotation, Tag, TagStore};
pub use models::task::{NewTask, Operation, PendingOptions, Task, TaskStore, dedup_key};

pub use pool::{connect, connect_in_memory};
