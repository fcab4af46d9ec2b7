use chrono::Utc;
use kodit_db::{PendingOptions, Status, StatusState, StatusStore, TaskStore};
use kodit_utils::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

/// A Status together with its children, reconstructed from the flat
/// `task_status` table (spec §4.3: "materialize nodes, then link parents").
#[derive(Debug, Clone)]
pub struct StatusNode {
    pub status: Status,
    pub children: Vec<StatusNode>,
}

impl StatusNode {
    /// Own state if child-less; otherwise aggregated per spec §4.3:
    /// `running` iff any child is running, `failed` iff any child is failed
    /// and none are running, `completed` iff all children are completed,
    /// else `pending`.
    pub fn aggregated_state(&self) -> StatusState {
        if self.children.is_empty() {
            return self.status.state;
        }
        let states: Vec<StatusState> = self.children.iter().map(StatusNode::aggregated_state).collect();
        if states.iter().any(|s| *s == StatusState::Running) {
            StatusState::Running
        } else if states.iter().any(|s| *s == StatusState::Failed) {
            StatusState::Failed
        } else if states.iter().all(|s| *s == StatusState::Completed) {
            StatusState::Completed
        } else {
            StatusState::Pending
        }
    }

    /// Own `current/total` if child-less; otherwise the average of
    /// children's completion percent (spec §4.3).
    pub fn aggregated_completion_percent(&self) -> f64 {
        if self.children.is_empty() {
            return self.status.own_completion_percent();
        }
        let sum: f64 = self.children.iter().map(StatusNode::aggregated_completion_percent).sum();
        sum / self.children.len() as f64
    }
}

/// User-visible rollup for a repository: its worst-case status across all
/// Statuses bound to it, plus how many tasks remain pending (spec §4.3
/// "Summary").
#[derive(Debug, Clone)]
pub struct RepositoryStatusSummary {
    pub status: StatusState,
    pub message: Option<String>,
    pub updated_at: chrono::DateTime<Utc>,
    pub pending_task_count: i64,
}

/// Severity order for picking the worst state across sibling roots:
/// failed > running > pending > completed.
fn severity(state: StatusState) -> u8 {
    match state {
        StatusState::Failed => 3,
        StatusState::Running => 2,
        StatusState::Pending => 1,
        StatusState::Completed => 0,
    }
}

pub struct StatusTracker<'a> {
    pool: &'a SqlitePool,
}

impl<'a> StatusTracker<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    fn store(&self) -> StatusStore<'a> {
        StatusStore::new(self.pool)
    }

    /// Create a new root or child Status in `pending` state and return its
    /// freshly minted id.
    pub async fn start(
        &self,
        operation: &str,
        parent: Option<&str>,
        trackable_type: Option<&str>,
        trackable_id: Option<&str>,
        total: Option<i64>,
    ) -> Result<String> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let status = Status {
            id: id.clone(),
            operation: operation.to_string(),
            state: StatusState::Pending,
            total,
            current: None,
            message: None,
            error: None,
            parent: parent.map(str::to_string),
            trackable_type: trackable_type.map(str::to_string),
            trackable_id: trackable_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.store().upsert(&status).await?;
        Ok(id)
    }

    pub async fn mark_running(&self, id: &str, current: Option<i64>, message: Option<&str>) -> Result<()> {
        self.transition(id, StatusState::Running, current, message, None).await
    }

    pub async fn mark_completed(&self, id: &str, message: Option<&str>) -> Result<()> {
        self.transition(id, StatusState::Completed, None, message, None).await
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        self.transition(id, StatusState::Failed, None, None, Some(error)).await
    }

    async fn transition(
        &self,
        id: &str,
        state: StatusState,
        current: Option<i64>,
        message: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        let store = self.store();
        let mut status = store
            .get(id)
            .await?
            .ok_or_else(|| kodit_utils::KoditError::not_found(format!("status {id}")))?;
        status.state = state;
        if current.is_some() {
            status.current = current;
        }
        if let Some(m) = message {
            status.message = Some(m.to_string());
        }
        if let Some(e) = error {
            status.error = Some(e.to_string());
        }
        status.updated_at = Utc::now();
        store.upsert(&status).await
    }

    /// Two-pass tree reconstruction: fetch every Status bound to the
    /// trackable, materialize nodes keyed by id, then link children to
    /// parents. Roots are nodes with no parent, or whose parent fell
    /// outside this trackable's result set.
    pub async fn load_with_hierarchy(&self, trackable_type: &str, trackable_id: &str) -> Result<Vec<StatusNode>> {
        let statuses = self.store().find_by_trackable(trackable_type, trackable_id).await?;

        let mut children_of: std::collections::HashMap<String, Vec<Status>> = std::collections::HashMap::new();
        let mut roots = Vec::new();
        let ids: std::collections::HashSet<&str> = statuses.iter().map(|s| s.id.as_str()).collect();

        for status in statuses.iter().cloned() {
            match &status.parent {
                Some(parent_id) if ids.contains(parent_id.as_str()) => {
                    children_of.entry(parent_id.clone()).or_default().push(status);
                }
                _ => roots.push(status),
            }
        }

        fn build(status: Status, children_of: &std::collections::HashMap<String, Vec<Status>>) -> StatusNode {
            let children = children_of
                .get(&status.id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .map(|child| build(child, children_of))
                .collect();
            StatusNode { status, children }
        }

        Ok(roots.into_iter().map(|root| build(root, &children_of)).collect())
    }

    /// Highest-severity state across the trackable's root Statuses, plus a
    /// count of tasks still pending for that repository (spec §4.3
    /// "Summary"). Tasks carry `repository_id` in their JSON payload rather
    /// than a dedicated column, so the count scans pending tasks and
    /// matches on that field — acceptable for a single-host queue.
    pub async fn summary(&self, trackable_type: &str, trackable_id: &str) -> Result<RepositoryStatusSummary> {
        let roots = self.load_with_hierarchy(trackable_type, trackable_id).await?;

        let worst = roots
            .iter()
            .max_by_key(|node| severity(node.aggregated_state()))
            .map(|node| node.aggregated_state())
            .unwrap_or(StatusState::Completed);

        let message = roots
            .iter()
            .max_by_key(|node| severity(node.aggregated_state()))
            .and_then(|node| node.status.message.clone());

        let updated_at = roots.iter().map(|node| node.status.updated_at).max().unwrap_or_else(Utc::now);

        let tasks = TaskStore::new(self.pool).find_pending(PendingOptions::default()).await?;
        let pending_task_count = tasks
            .iter()
            .filter(|task| {
                task.payload
                    .get("repository_id")
                    .and_then(|v| v.as_i64())
                    .map(|id| id.to_string() == trackable_id)
                    .unwrap_or(false)
            })
            .count() as i64;

        Ok(RepositoryStatusSummary {
            status: worst,
            message,
            updated_at,
            pending_task_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodit_db::connect_in_memory;

    #[tokio::test]
    async fn childless_node_reports_own_state() {
        let pool = connect_in_memory().await.expect("connect");
        let tracker = StatusTracker::new(&pool);
        let id = tracker
            .start("INDEX_COMMIT", None, Some("repository"), Some("1"), Some(10))
            .await
            .expect("start");
        tracker.mark_completed(&id, Some("done")).await.expect("complete");

        let roots = tracker.load_with_hierarchy("repository", "1").await.expect("load");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].aggregated_state(), StatusState::Completed);
    }

    #[tokio::test]
    async fn parent_is_failed_if_any_child_failed_and_none_running() {
        let pool = connect_in_memory().await.expect("connect");
        let tracker = StatusTracker::new(&pool);
        let parent = tracker
            .start("SYNC_REPOSITORY", None, Some("repository"), Some("1"), None)
            .await
            .expect("start parent");
        let child_a = tracker
            .start("FETCH_REPOSITORY", Some(&parent), Some("repository"), Some("1"), None)
            .await
            .expect("start child a");
        let child_b = tracker
            .start("SCAN_BRANCHES_TAGS_COMMITS", Some(&parent), Some("repository"), Some("1"), None)
            .await
            .expect("start child b");
        tracker.mark_completed(&child_a, None).await.expect("complete a");
        tracker.mark_failed(&child_b, "boom").await.expect("fail b");

        let roots = tracker.load_with_hierarchy("repository", "1").await.expect("load");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].children.len(), 2);
        assert_eq!(roots[0].aggregated_state(), StatusState::Failed);
    }

    #[tokio::test]
    async fn parent_is_running_if_any_child_running() {
        let pool = connect_in_memory().await.expect("connect");
        let tracker = StatusTracker::new(&pool);
        let parent = tracker
            .start("SYNC_REPOSITORY", None, Some("repository"), Some("1"), None)
            .await
            .expect("start parent");
        let child = tracker
            .start("FETCH_REPOSITORY", Some(&parent), Some("repository"), Some("1"), None)
            .await
            .expect("start child");
        tracker.mark_running(&child, Some(1), None).await.expect("run child");

        let roots = tracker.load_with_hierarchy("repository", "1").await.expect("load");
        assert_eq!(roots[0].aggregated_state(), StatusState::Running);
    }

    #[tokio::test]
    async fn parent_is_completed_only_if_all_children_completed() {
        let pool = connect_in_memory().await.expect("connect");
        let tracker = StatusTracker::new(&pool);
        let parent = tracker
            .start("SYNC_REPOSITORY", None, Some("repository"), Some("1"), None)
            .await
            .expect("start parent");
        let child_a = tracker
            .start("FETCH_REPOSITORY", Some(&parent), Some("repository"), Some("1"), None)
            .await
            .expect("start child a");
        let child_b = tracker
            .start("SCAN_BRANCHES_TAGS_COMMITS", Some(&parent), Some("repository"), Some("1"), None)
            .await
            .expect("start child b");
        tracker.mark_completed(&child_a, None).await.expect("complete a");

        let roots = tracker.load_with_hierarchy("repository", "1").await.expect("load");
        assert_eq!(roots[0].aggregated_state(), StatusState::Pending, "child_b still pending");

        tracker.mark_completed(&child_b, None).await.expect("complete b");
        let roots = tracker.load_with_hierarchy("repository", "1").await.expect("load");
        assert_eq!(roots[0].aggregated_state(), StatusState::Completed);
    }
}
