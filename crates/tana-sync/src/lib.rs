mod cache;
pub use cache::{CacheConfig, Observer, RemoteCache, Subscription};

mod key;
pub use key::{CacheKey, KeyPrefix};

mod patch;
pub use patch::{ListTarget, OptimisticPatch};

mod mutation;
pub use mutation::{MutationController, MutationPlan, Notice};

mod query;
pub use query::{SortColumn, SortOrder, TaskListQuery};

mod board;
pub use board::{BoardManager, DragState, DropOutcome, StatusWriter};

mod notify;
pub use notify::{NotificationApi, NotificationCenter, PollerHandle};

mod ops;
pub use ops::Operations;

mod error;
pub use error::SyncError;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use tana_client::ApiClient;

pub(crate) fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|e| SyncError::Decode(e.to_string()))
}

/// Application root of the synchronization layer.
///
/// Constructed once at startup and shared by handle; owns the cache, the
/// mutation controller and any running pollers. Dropping the engine (or
/// calling [`SyncEngine::shutdown`]) stops background work.
pub struct SyncEngine {
    client: Arc<ApiClient>,
    mutations: MutationController,
    notifications: NotificationCenter,
    poller: std::sync::Mutex<Option<PollerHandle>>,
}

impl SyncEngine {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self::with_config(client, CacheConfig::default())
    }

    pub fn with_config(client: Arc<ApiClient>, cfg: CacheConfig) -> Self {
        let cache = RemoteCache::new(cfg);
        let mutations = MutationController::new(cache);
        let notifications = NotificationCenter::new(
            mutations.clone(),
            Arc::clone(&client) as Arc<dyn NotificationApi>,
        );
        Self {
            client,
            mutations,
            notifications,
            poller: std::sync::Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &RemoteCache {
        self.mutations.cache()
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn ops(&self) -> Operations {
        Operations::new(Arc::clone(&self.client), self.mutations.clone())
    }

    /// Drag-and-drop manager for one project's board view.
    pub fn board(&self, project_id: &str) -> BoardManager {
        BoardManager::new(
            self.mutations.clone(),
            Arc::clone(&self.client) as Arc<dyn StatusWriter>,
            project_id,
        )
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Failure notices accumulated by mutations since the last drain.
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.mutations.drain_notices()
    }

    /// Start the unread-count poller. A previous poller, if any, is stopped
    /// by replacement.
    pub fn start_polling(&self, period: Duration) {
        let handle = self.notifications.spawn_poller(period);
        *self.poller.lock().expect("poller lock poisoned") = Some(handle);
    }

    /// Stop background work. In-flight mutations still run to completion.
    pub async fn shutdown(&self) {
        let handle = self.poller.lock().expect("poller lock poisoned").take();
        if let Some(handle) = handle {
            handle.stop().await;
        }
    }
}
