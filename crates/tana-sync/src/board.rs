use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, instrument};

use tana_client::ApiClient;
use tana_model::{Task, TaskStatus, UpdateTaskRequest};

use crate::cache::RemoteCache;
use crate::error::SyncError;
use crate::key::{CacheKey, KeyPrefix};
use crate::mutation::{MutationController, MutationPlan};
use crate::patch::{ListTarget, OptimisticPatch};
use crate::query::TaskListQuery;

/// Server seam for the status mutation the board dispatches.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<Task, SyncError>;
}

#[async_trait]
impl StatusWriter for ApiClient {
    async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<Task, SyncError> {
        let task = self
            .update_task(task_id, &UpdateTaskRequest::status_only(status))
            .await?;
        Ok(task)
    }
}

/// Gesture state of the board, one pointer at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { task_id: String, from: TaskStatus },
}

/// What a completed drop did.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// Dropped on the source column; nothing dispatched.
    NoOp,
    /// Status mutation confirmed; the server's representation of the task.
    Moved(Task),
}

/// Drag-and-drop status transitions for one project's board.
///
/// A drop dispatches the status mutation under the task's entity guard:
/// while that mutation is unresolved the task counts as dropped-pending and
/// a second drop for the same id is rejected. Gestures and mutations for
/// different task ids are independent.
pub struct BoardManager {
    mutations: MutationController,
    writer: Arc<dyn StatusWriter>,
    board_key: CacheKey,
    gesture: Mutex<DragState>,
}

pub(crate) fn task_guard(task_id: &str) -> String {
    format!("task:{task_id}")
}

impl BoardManager {
    pub fn new(
        mutations: MutationController,
        writer: Arc<dyn StatusWriter>,
        project_id: &str,
    ) -> Self {
        Self {
            mutations,
            writer,
            board_key: TaskListQuery::board().list_key(project_id),
            gesture: Mutex::new(DragState::Idle),
        }
    }

    pub fn cache(&self) -> &RemoteCache {
        self.mutations.cache()
    }

    /// Cache key of the board's backing list.
    pub fn board_key(&self) -> &CacheKey {
        &self.board_key
    }

    pub fn state(&self) -> DragState {
        self.gesture.lock().expect("gesture lock poisoned").clone()
    }

    /// Whether a dispatched drop for this task is still unresolved.
    pub fn is_drop_pending(&self, task_id: &str) -> bool {
        self.mutations.is_pending(&task_guard(task_id))
    }

    /// Pointer or keyboard picked up a card. No cache effect.
    pub fn pick_up(&self, task_id: &str, from: TaskStatus) -> Result<(), SyncError> {
        let mut gesture = self.gesture.lock().expect("gesture lock poisoned");
        if matches!(*gesture, DragState::Dragging { .. }) {
            return Err(SyncError::DragInProgress);
        }
        if self.is_drop_pending(task_id) {
            return Err(SyncError::MutationPending(task_guard(task_id)));
        }
        debug!(task_id, from = %from, "drag started");
        *gesture = DragState::Dragging {
            task_id: task_id.to_string(),
            from,
        };
        Ok(())
    }

    /// Released outside any column: back to idle, nothing dispatched.
    pub fn cancel(&self) {
        *self.gesture.lock().expect("gesture lock poisoned") = DragState::Idle;
    }

    /// Released over a column. Rewrites the task's status in the board list
    /// optimistically, dispatches the mutation, and resolves to idle whether
    /// the server confirms or rejects. The gesture slot frees at dispatch so
    /// other cards can be dragged while this one is pending.
    #[instrument(level = "debug", skip(self), fields(column = %column))]
    pub async fn drop_on(&self, column: TaskStatus) -> Result<DropOutcome, SyncError> {
        let (task_id, from) = {
            let mut gesture = self.gesture.lock().expect("gesture lock poisoned");
            let DragState::Dragging { task_id, from } = gesture.clone() else {
                return Err(SyncError::NoActiveDrag);
            };
            *gesture = DragState::Idle;
            (task_id, from)
        };

        if from == column {
            debug!(task_id, "dropped on source column, no-op");
            return Ok(DropOutcome::NoOp);
        }

        // Rewrite in place: the card keeps its slot in the list payload and
        // lands last-in among its new column's tasks until the confirming
        // refetch applies server ordering.
        let mut fields = serde_json::Map::new();
        fields.insert("status".to_string(), json!(column.as_str()));
        let plan = MutationPlan::new()
            .with_patch(OptimisticPatch::PatchListItems {
                prefix: KeyPrefix::Key(self.board_key.clone()),
                target: ListTarget::Item(task_id.clone()),
                fields,
            })
            .with_invalidate(KeyPrefix::TaskLists)
            .with_invalidate(KeyPrefix::TaskDetail {
                id: task_id.clone(),
            });

        let writer = Arc::clone(&self.writer);
        let task = self
            .mutations
            .execute(
                Some(task_guard(&task_id)),
                async move { writer.set_status(&task_id, column).await },
                plan,
            )
            .await?;
        Ok(DropOutcome::Moved(task))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;
    use time::macros::datetime;

    use tana_model::TaskPriority;

    use super::*;

    fn sample_task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.to_string(),
            project_id: "p-1".to_string(),
            title: format!("task {id}"),
            description: String::new(),
            status,
            priority: TaskPriority::Medium,
            assignee_id: None,
            created_by: "u-1".to_string(),
            due_date: None,
            tags: Vec::new(),
            created_at: datetime!(2026-01-01 00:00:00 UTC),
            updated_at: datetime!(2026-01-01 00:00:00 UTC),
        }
    }

    /// Scriptable status writer: fails or stalls on demand.
    struct FakeWriter {
        fail: bool,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeWriter {
        fn ok() -> Self {
            Self {
                fail: false,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                fail: false,
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl StatusWriter for FakeWriter {
        async fn set_status(&self, task_id: &str, status: TaskStatus) -> Result<Task, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(SyncError::Decode("update rejected".to_string()));
            }
            Ok(sample_task(task_id, status))
        }
    }

    fn board_with(writer: Arc<dyn StatusWriter>) -> (RemoteCache, MutationController, BoardManager)
    {
        let cache = RemoteCache::default();
        let mutations = MutationController::new(cache.clone());
        let board = BoardManager::new(mutations.clone(), writer, "p-1");
        cache.write(
            board.board_key().clone(),
            json!({
                "items": [
                    { "id": "t-1", "status": "todo" },
                    { "id": "t-2", "status": "todo" },
                ],
                "total": 2, "page": 1, "pageSize": 200, "hasMore": false
            }),
        );
        (cache, mutations, board)
    }

    #[tokio::test]
    async fn successful_drop_moves_card_optimistically() {
        let (cache, _mutations, board) = board_with(Arc::new(FakeWriter::ok()));

        board.pick_up("t-1", TaskStatus::Todo).unwrap();
        assert!(matches!(board.state(), DragState::Dragging { .. }));

        let outcome = board.drop_on(TaskStatus::Done).await.unwrap();
        match outcome {
            DropOutcome::Moved(task) => assert_eq!(task.status, TaskStatus::Done),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(board.state(), DragState::Idle);

        let page = cache.get(board.board_key()).unwrap();
        assert_eq!(page["items"][0]["status"], "done");
        assert!(cache.is_stale(board.board_key()));
    }

    #[tokio::test]
    async fn drop_on_source_column_is_a_noop() {
        let writer = Arc::new(FakeWriter::ok());
        let (cache, mutations, board) = board_with(writer.clone());

        board.pick_up("t-1", TaskStatus::Todo).unwrap();
        let outcome = board.drop_on(TaskStatus::Todo).await.unwrap();
        assert_eq!(outcome, DropOutcome::NoOp);
        assert_eq!(board.state(), DragState::Idle);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);

        // No mutation, no staleness, no notices.
        assert!(!cache.is_stale(board.board_key()));
        assert!(mutations.drain_notices().is_empty());
    }

    #[tokio::test]
    async fn failed_drop_restores_column_and_surfaces_one_notice() {
        let (cache, mutations, board) = board_with(Arc::new(FakeWriter::failing()));

        board.pick_up("t-1", TaskStatus::Todo).unwrap();
        let err = board.drop_on(TaskStatus::Done).await.unwrap_err();
        assert!(matches!(err, SyncError::Decode(_)));

        // Back in "todo" immediately after failure handling.
        let page = cache.get(board.board_key()).unwrap();
        assert_eq!(page["items"][0]["status"], "todo");

        // Exactly one user-visible notice.
        assert_eq!(mutations.drain_notices().len(), 1);
        assert_eq!(board.state(), DragState::Idle);
        assert!(!board.is_drop_pending("t-1"));
    }

    #[tokio::test]
    async fn same_task_redrag_is_rejected_while_pending() {
        let writer = Arc::new(FakeWriter::slow(Duration::from_millis(100)));
        let (_cache, mutations, board) = board_with(writer);
        let board = Arc::new(board);

        board.pick_up("t-1", TaskStatus::Todo).unwrap();
        let first = tokio::spawn({
            let board = Arc::clone(&board);
            async move { board.drop_on(TaskStatus::Done).await }
        });

        // Wait until the first drop holds the task's guard.
        for _ in 0..100 {
            if board.is_drop_pending("t-1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = board.pick_up("t-1", TaskStatus::Done).unwrap_err();
        assert!(matches!(err, SyncError::MutationPending(_)));

        first.await.unwrap().unwrap();
        assert!(!board.is_drop_pending("t-1"));
        assert!(mutations.drain_notices().is_empty());
    }

    #[tokio::test]
    async fn drags_for_different_tasks_run_concurrently() {
        let writer = Arc::new(FakeWriter::slow(Duration::from_millis(50)));
        let (_cache, _mutations, board) = board_with(writer.clone());
        let board = Arc::new(board);

        board.pick_up("t-1", TaskStatus::Todo).unwrap();
        let first = tokio::spawn({
            let board = Arc::clone(&board);
            async move { board.drop_on(TaskStatus::Done).await }
        });

        // The gesture slot frees at dispatch, so a second card can start
        // while the first mutation is still in flight.
        for _ in 0..100 {
            if board.is_drop_pending("t-1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        board.pick_up("t-2", TaskStatus::Todo).unwrap();
        let second = board.drop_on(TaskStatus::Review).await.unwrap();
        assert!(matches!(second, DropOutcome::Moved(_)));

        assert!(matches!(
            first.await.unwrap().unwrap(),
            DropOutcome::Moved(_)
        ));
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn drop_without_pickup_is_rejected() {
        let (_cache, _mutations, board) = board_with(Arc::new(FakeWriter::ok()));
        let err = board.drop_on(TaskStatus::Done).await.unwrap_err();
        assert!(matches!(err, SyncError::NoActiveDrag));
    }
}
