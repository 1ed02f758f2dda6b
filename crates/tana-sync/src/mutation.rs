use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::cache::RemoteCache;
use crate::error::SyncError;
use crate::key::KeyPrefix;
use crate::patch::OptimisticPatch;

/// Transient, dismissable user-facing failure notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    /// Whether offering a retry action makes sense (transport failures and
    /// server-side errors; not validation or conflicts).
    pub retryable: bool,
}

/// What a mutation does to the cache besides its server call.
#[derive(Debug, Clone, Default)]
pub struct MutationPlan {
    patches: Vec<OptimisticPatch>,
    invalidates: Vec<KeyPrefix>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimistic patch applied before the server call is dispatched.
    pub fn with_patch(mut self, patch: OptimisticPatch) -> Self {
        self.patches.push(patch);
        self
    }

    /// Scope invalidated after the call resolves, success or failure.
    pub fn with_invalidate(mut self, prefix: KeyPrefix) -> Self {
        self.invalidates.push(prefix);
        self
    }
}

/// The sole writer of cache entries outside of fetch responses.
///
/// Serializes mutations per entity guard and guarantees a failed mutation
/// never leaves the cache in an optimistic-but-unconfirmed state: the
/// snapshot is restored and the plan's scopes invalidated in the same
/// failure-handling step.
#[derive(Clone)]
pub struct MutationController {
    cache: RemoteCache,
    pending: Arc<Mutex<HashSet<String>>>,
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl MutationController {
    pub fn new(cache: RemoteCache) -> Self {
        Self {
            cache,
            pending: Arc::new(Mutex::new(HashSet::new())),
            notices: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn cache(&self) -> &RemoteCache {
        &self.cache
    }

    /// Whether a mutation holding this entity guard is still unresolved.
    pub fn is_pending(&self, guard: &str) -> bool {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .contains(guard)
    }

    /// Take every accumulated user-facing notice, oldest first.
    pub fn drain_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().expect("notices lock poisoned"))
    }

    /// Run a mutation: apply the plan's optimistic patches synchronously,
    /// await the server call, then converge the cache.
    ///
    /// `guard` serializes mutations per entity id: a second `execute` with
    /// the same guard is rejected with [`SyncError::MutationPending`] until
    /// the first resolves. A dispatched call always runs to completion.
    pub async fn execute<T>(
        &self,
        guard: Option<String>,
        call: impl Future<Output = Result<T, SyncError>>,
        plan: MutationPlan,
    ) -> Result<T, SyncError> {
        let _guard = match guard {
            Some(key) => Some(PendingGuard::acquire(Arc::clone(&self.pending), key)?),
            None => None,
        };

        // Snapshot of every entry the patches touch, first prior per key.
        let mut seen = HashSet::new();
        let mut snapshot = Vec::new();
        for patch in &plan.patches {
            for (key, prior) in patch.apply(&self.cache) {
                if seen.insert(key.clone()) {
                    snapshot.push((key, prior));
                }
            }
        }

        match call.await {
            Ok(value) => {
                // The optimistic patch is not reverted: invalidation
                // converges every dependent key to the server's state.
                for prefix in &plan.invalidates {
                    self.cache.invalidate(prefix);
                }
                debug!(invalidated = plan.invalidates.len(), "mutation confirmed");
                Ok(value)
            }
            Err(err) => {
                for (key, prior) in snapshot {
                    self.cache.restore(&key, prior);
                }
                // Invalidate anyway so subscribed views re-derive from a
                // consistent state.
                for prefix in &plan.invalidates {
                    self.cache.invalidate(prefix);
                }
                if !err.is_unauthorized() {
                    self.notices
                        .lock()
                        .expect("notices lock poisoned")
                        .push(Notice {
                            message: err.to_string(),
                            retryable: err.is_retryable(),
                        });
                }
                warn!(error = %err, "mutation failed, cache rolled back");
                Err(err)
            }
        }
    }
}

/// Held for the lifetime of one mutation; releases the entity guard on drop
/// so the guard is freed on every exit path.
struct PendingGuard {
    pending: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl PendingGuard {
    fn acquire(pending: Arc<Mutex<HashSet<String>>>, key: String) -> Result<Self, SyncError> {
        {
            let mut set = pending.lock().expect("pending lock poisoned");
            if !set.insert(key.clone()) {
                return Err(SyncError::MutationPending(key));
            }
        }
        Ok(Self { pending, key })
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::key::CacheKey;
    use crate::patch::ListTarget;

    use super::*;

    fn board_key() -> CacheKey {
        CacheKey::TaskList {
            project_id: "p-1".to_string(),
            sig: String::new(),
        }
    }

    fn status_patch(task_id: &str, status: &str) -> OptimisticPatch {
        let mut fields = serde_json::Map::new();
        fields.insert("status".to_string(), json!(status));
        OptimisticPatch::PatchListItems {
            prefix: KeyPrefix::Key(board_key()),
            target: ListTarget::Item(task_id.to_string()),
            fields,
        }
    }

    fn seed_board(cache: &RemoteCache) {
        cache.write(
            board_key(),
            json!({
                "items": [ { "id": "t-1", "status": "todo" } ],
                "total": 1, "page": 1, "pageSize": 20, "hasMore": false
            }),
        );
    }

    #[tokio::test]
    async fn successful_mutation_keeps_patch_and_invalidates() {
        let cache = RemoteCache::default();
        let controller = MutationController::new(cache.clone());
        seed_board(&cache);

        let plan = MutationPlan::new()
            .with_patch(status_patch("t-1", "done"))
            .with_invalidate(KeyPrefix::TaskLists);

        let out: Result<(), SyncError> = controller
            .execute(Some("task:t-1".to_string()), async { Ok(()) }, plan)
            .await;
        assert!(out.is_ok());

        // Patch survives; entry is stale pending the confirming refetch.
        let page = cache.get(&board_key()).unwrap();
        assert_eq!(page["items"][0]["status"], "done");
        assert!(cache.is_stale(&board_key()));
        assert!(controller.drain_notices().is_empty());
    }

    #[tokio::test]
    async fn failed_mutation_restores_snapshot_and_pushes_one_notice() {
        let cache = RemoteCache::default();
        let controller = MutationController::new(cache.clone());
        seed_board(&cache);

        let plan = MutationPlan::new()
            .with_patch(status_patch("t-1", "done"))
            .with_invalidate(KeyPrefix::TaskLists);

        let out: Result<(), SyncError> = controller
            .execute(
                Some("task:t-1".to_string()),
                async { Err(SyncError::Decode("server said no".to_string())) },
                plan,
            )
            .await;
        assert!(out.is_err());

        // Rolled back to the pre-mutation snapshot, immediately.
        let page = cache.get(&board_key()).unwrap();
        assert_eq!(page["items"][0]["status"], "todo");

        let notices = controller.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].message.contains("server said no"));
        assert!(!notices[0].retryable);
        assert!(!controller.is_pending("task:t-1"));
    }

    #[tokio::test]
    async fn server_side_failures_are_flagged_retryable() {
        let cache = RemoteCache::default();
        let controller = MutationController::new(cache);

        let out: Result<(), SyncError> = controller
            .execute(
                None,
                async {
                    Err(SyncError::from(tana_client::ApiError::Api {
                        status: 503,
                        code: "unavailable".to_string(),
                        message: "try again later".to_string(),
                    }))
                },
                MutationPlan::new(),
            )
            .await;
        assert!(out.is_err());

        let notices = controller.drain_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].retryable);
    }

    #[tokio::test]
    async fn second_mutation_for_same_guard_is_rejected_while_pending() {
        let cache = RemoteCache::default();
        let controller = MutationController::new(cache.clone());
        seed_board(&cache);

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let slow = tokio::spawn({
            let controller = controller.clone();
            async move {
                let _: Result<(), SyncError> = controller
                    .execute(
                        Some("task:t-1".to_string()),
                        async move {
                            let _ = release_rx.await;
                            Ok(())
                        },
                        MutationPlan::new(),
                    )
                    .await;
            }
        });

        // Wait for the first mutation to hold the guard.
        for _ in 0..100 {
            if controller.is_pending("task:t-1") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let rejected: Result<(), SyncError> = controller
            .execute(
                Some("task:t-1".to_string()),
                async { Ok(()) },
                MutationPlan::new(),
            )
            .await;
        assert!(matches!(rejected, Err(SyncError::MutationPending(_))));

        // Different guards run independently.
        let ok: Result<(), SyncError> = controller
            .execute(
                Some("task:t-2".to_string()),
                async { Ok(()) },
                MutationPlan::new(),
            )
            .await;
        assert!(ok.is_ok());

        let _ = release_tx.send(());
        let _ = slow.await;
        assert!(!controller.is_pending("task:t-1"));
    }

    #[tokio::test]
    async fn unauthorized_failures_do_not_produce_notices() {
        let cache = RemoteCache::default();
        let controller = MutationController::new(cache);

        let out: Result<(), SyncError> = controller
            .execute(
                None,
                async { Err(SyncError::from(tana_client::ApiError::Unauthorized)) },
                MutationPlan::new(),
            )
            .await;
        assert!(out.is_err());
        assert!(controller.drain_notices().is_empty());
    }
}
