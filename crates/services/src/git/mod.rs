pub mod adapter;
pub mod cloner;
pub mod git2_adapter;
pub mod scanner;

pub use adapter::{Adapter, BranchInfo, CommitDiff, CommitInfo, FileDiff, FileInfo, GitOrchestratorError, TagInfo};
pub use cloner::Cloner;
pub use git2_adapter::Git2Adapter;
pub use scanner::Scanner;
