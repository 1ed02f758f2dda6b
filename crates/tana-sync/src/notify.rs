use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use tana_client::ApiClient;
use tana_model::{Notification, Page, UnreadCount};

use crate::cache::RemoteCache;
use crate::error::SyncError;
use crate::from_value;
use crate::key::{CacheKey, KeyPrefix};
use crate::mutation::{MutationController, MutationPlan};
use crate::patch::{ListTarget, OptimisticPatch};

/// Server seam for the notification endpoints.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    async fn list(&self, query: &str) -> Result<Page<Notification>, SyncError>;
    async fn unread_count(&self) -> Result<UnreadCount, SyncError>;
    async fn mark_read(&self, id: &str) -> Result<(), SyncError>;
    async fn mark_all_read(&self) -> Result<(), SyncError>;
}

#[async_trait]
impl NotificationApi for ApiClient {
    async fn list(&self, query: &str) -> Result<Page<Notification>, SyncError> {
        Ok(self.list_notifications(query).await?)
    }

    async fn unread_count(&self) -> Result<UnreadCount, SyncError> {
        Ok(ApiClient::unread_count(self).await?)
    }

    async fn mark_read(&self, id: &str) -> Result<(), SyncError> {
        Ok(self.mark_notification_read(id).await?)
    }

    async fn mark_all_read(&self) -> Result<(), SyncError> {
        Ok(self.mark_all_notifications_read().await?)
    }
}

/// Notification reads, read-state mutations, and the unread-count badge.
#[derive(Clone)]
pub struct NotificationCenter {
    mutations: MutationController,
    api: Arc<dyn NotificationApi>,
}

impl NotificationCenter {
    pub fn new(mutations: MutationController, api: Arc<dyn NotificationApi>) -> Self {
        Self { mutations, api }
    }

    fn cache(&self) -> &RemoteCache {
        self.mutations.cache()
    }

    /// Cached page of notifications for a canonical query string.
    pub async fn list(&self, query: &str) -> Result<Page<Notification>, SyncError> {
        let api = Arc::clone(&self.api);
        let query_owned = query.to_string();
        let value = self
            .cache()
            .read(
                CacheKey::NotificationList {
                    sig: query.to_string(),
                },
                move || {
                    let api = Arc::clone(&api);
                    let query = query_owned.clone();
                    async move {
                        let page = api.list(&query).await?;
                        serde_json::to_value(page).map_err(|e| SyncError::Decode(e.to_string()))
                    }
                },
            )
            .await?;
        from_value(value)
    }

    /// Cached unread-count badge value.
    pub async fn unread_count(&self) -> Result<u64, SyncError> {
        let api = Arc::clone(&self.api);
        let value = self
            .cache()
            .read(CacheKey::UnreadCount, move || {
                let api = Arc::clone(&api);
                async move {
                    let count = api.unread_count().await?;
                    serde_json::to_value(count).map_err(|e| SyncError::Decode(e.to_string()))
                }
            })
            .await?;
        let count: UnreadCount = from_value(value)?;
        Ok(count.count)
    }

    /// Mark one notification read. The cached row flips and the badge
    /// decrements immediately, clamped at zero; the server's answer arrives
    /// with the follow-up refetch.
    pub async fn mark_read(&self, id: &str) -> Result<(), SyncError> {
        let mut fields = serde_json::Map::new();
        fields.insert("read".to_string(), json!(true));
        let mut plan = MutationPlan::new()
            .with_patch(OptimisticPatch::PatchListItems {
                prefix: KeyPrefix::NotificationLists,
                target: ListTarget::Item(id.to_string()),
                fields,
            })
            .with_invalidate(KeyPrefix::NotificationLists)
            .with_invalidate(KeyPrefix::UnreadCount);
        if let Some(count) = self.cached_count() {
            plan = plan.with_patch(OptimisticPatch::ReplaceEntity {
                key: CacheKey::UnreadCount,
                value: json!({ "count": count.saturating_sub(1) }),
            });
        }

        let api = Arc::clone(&self.api);
        let id_owned = id.to_string();
        self.mutations
            .execute(
                Some(format!("notification:{id}")),
                async move { api.mark_read(&id_owned).await },
                plan,
            )
            .await
    }

    /// Mark everything read: every cached notification row flips and the
    /// badge drops to zero in one step.
    pub async fn mark_all_read(&self) -> Result<(), SyncError> {
        let mut fields = serde_json::Map::new();
        fields.insert("read".to_string(), json!(true));
        let plan = MutationPlan::new()
            .with_patch(OptimisticPatch::PatchListItems {
                prefix: KeyPrefix::NotificationLists,
                target: ListTarget::All,
                fields,
            })
            .with_patch(OptimisticPatch::ReplaceEntity {
                key: CacheKey::UnreadCount,
                value: json!({ "count": 0 }),
            })
            .with_invalidate(KeyPrefix::NotificationLists)
            .with_invalidate(KeyPrefix::UnreadCount);

        let api = Arc::clone(&self.api);
        self.mutations
            .execute(
                Some("notifications:all".to_string()),
                async move { api.mark_all_read().await },
                plan,
            )
            .await
    }

    fn cached_count(&self) -> Option<u64> {
        self.cache()
            .get(&CacheKey::UnreadCount)?
            .get("count")?
            .as_u64()
    }

    /// Refresh the badge count regardless of freshness, periodically.
    ///
    /// Each tick invalidates the count entry and reads through it, so a tick
    /// that races a badge-driven read joins that fetch instead of doubling
    /// it. Errors are logged and the poller keeps going.
    pub fn spawn_poller(&self, period: Duration) -> PollerHandle {
        let token = CancellationToken::new();
        let center = self.clone();
        let poller_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so the poller only
            // adds traffic after a full period.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = poller_token.cancelled() => {
                        debug!("unread-count poller stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }
                center
                    .cache()
                    .invalidate(&KeyPrefix::Key(CacheKey::UnreadCount));
                if let Err(err) = center.unread_count().await {
                    warn!(error = %err, "unread-count poll failed");
                }
            }
        });
        PollerHandle {
            token,
            handle: Some(handle),
        }
    }
}

/// Handle to a running unread-count poller. Cancels on drop.
pub struct PollerHandle {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop polling and wait for the in-flight tick, if any, to finish.
    pub async fn stop(mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
