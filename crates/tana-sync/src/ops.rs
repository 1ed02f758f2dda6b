//! Typed operations binding the endpoint surface to the cache and the
//! mutation controller: one method per operation a view can trigger.
//!
//! Reads go through [`RemoteCache::read`] so repeated renders hit the cache
//! and leave a retained fetcher behind for background refetch. Writes go
//! through [`MutationController::execute`] with the invalidation scopes the
//! corresponding view depends on.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use tana_client::{ApiClient, ApiError};
use tana_model::{
    AddProjectMemberRequest, AuthResponse, Comment, CreateCommentRequest, CreateProjectRequest,
    CreateTaskRequest, CreateWebhookRequest, LoginRequest, NotificationPreferences, Page, Project,
    ProjectMember, RegisterRequest, Task, UpdateProjectRequest, UpdateTaskRequest,
    UpdateUserRequest, UpdateWebhookRequest, User, WebhookConfig,
};

use crate::cache::RemoteCache;
use crate::error::SyncError;
use crate::from_value;
use crate::key::{CacheKey, KeyPrefix};
use crate::mutation::{MutationController, MutationPlan};
use crate::patch::OptimisticPatch;
use crate::query::TaskListQuery;

fn to_value<T: Serialize>(value: &T) -> Result<Value, SyncError> {
    serde_json::to_value(value).map_err(|e| SyncError::Decode(e.to_string()))
}

fn validation(message: impl Into<String>) -> SyncError {
    SyncError::from(ApiError::Validation(message.into()))
}

/// Typed façade over the dashboard API, cache-aware on reads and
/// invalidation-aware on writes.
#[derive(Clone)]
pub struct Operations {
    client: Arc<ApiClient>,
    mutations: MutationController,
}

impl Operations {
    pub fn new(client: Arc<ApiClient>, mutations: MutationController) -> Self {
        Self { client, mutations }
    }

    fn cache(&self) -> &RemoteCache {
        self.mutations.cache()
    }

    async fn read_typed<T, F, Fut>(&self, key: CacheKey, fetch: F) -> Result<T, SyncError>
    where
        T: DeserializeOwned,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, SyncError>> + Send + 'static,
    {
        let value = self.cache().read(key, fetch).await?;
        from_value(value)
    }

    // --- auth ---------------------------------------------------------------

    /// Authenticate and install the session token on the shared client.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, SyncError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(validation("email and password are required"));
        }
        let auth = self
            .client
            .login(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.client.set_token(auth.token.clone());
        info!(user = %auth.user.id, "logged in");
        Ok(auth)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> Result<AuthResponse, SyncError> {
        if email.trim().is_empty() || password.is_empty() || name.trim().is_empty() {
            return Err(validation("email, password and name are required"));
        }
        let auth = self
            .client
            .register(&RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                name: name.to_string(),
            })
            .await?;
        self.client.set_token(auth.token.clone());
        Ok(auth)
    }

    /// Drop the session token. Cached data is left in place; the next 401
    /// would clear the session anyway and views re-auth before reading.
    pub fn logout(&self) {
        self.client.clear_token();
        info!("logged out");
    }

    // --- users --------------------------------------------------------------

    pub async fn current_user(&self) -> Result<User, SyncError> {
        let client = Arc::clone(&self.client);
        self.read_typed(CacheKey::CurrentUser, move || {
            let client = Arc::clone(&client);
            async move {
                let user = client.me().await?;
                to_value(&user)
            }
        })
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, SyncError> {
        let client = Arc::clone(&self.client);
        self.read_typed(CacheKey::UserList, move || {
            let client = Arc::clone(&client);
            async move {
                let users = client.list_users().await?;
                to_value(&users)
            }
        })
        .await
    }

    pub async fn get_user(&self, id: &str) -> Result<User, SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        self.read_typed(CacheKey::UserDetail { id: id.to_string() }, move || {
            let client = Arc::clone(&client);
            let id = id_owned.clone();
            async move {
                let user = client.get_user(&id).await?;
                to_value(&user)
            }
        })
        .await
    }

    /// Profile update. Invalidates the user's detail entry and the current
    /// user, since the profile form edits the session's own account.
    pub async fn update_user(&self, id: &str, req: UpdateUserRequest) -> Result<User, SyncError> {
        if req.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(validation("name must not be empty"));
        }
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new()
            .with_invalidate(KeyPrefix::UserDetail { id: id.to_string() })
            .with_invalidate(KeyPrefix::CurrentUser);
        self.mutations
            .execute(
                Some(format!("user:{id}")),
                async move { Ok(client.update_user(&id_owned, &req).await?) },
                plan,
            )
            .await
    }

    // --- tasks --------------------------------------------------------------

    pub async fn list_tasks(
        &self,
        project_id: &str,
        query: &TaskListQuery,
    ) -> Result<Page<Task>, SyncError> {
        let client = Arc::clone(&self.client);
        let project = project_id.to_string();
        let rendered = query.to_query_string();
        self.read_typed(query.list_key(project_id), move || {
            let client = Arc::clone(&client);
            let project = project.clone();
            let rendered = rendered.clone();
            async move {
                let page = client.list_tasks(&project, &rendered).await?;
                to_value(&page)
            }
        })
        .await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        self.read_typed(CacheKey::TaskDetail { id: id.to_string() }, move || {
            let client = Arc::clone(&client);
            let id = id_owned.clone();
            async move {
                let task = client.get_task(&id).await?;
                to_value(&task)
            }
        })
        .await
    }

    pub async fn create_task(
        &self,
        project_id: &str,
        req: CreateTaskRequest,
    ) -> Result<Task, SyncError> {
        if req.title.trim().is_empty() {
            return Err(validation("task title must not be empty"));
        }
        let client = Arc::clone(&self.client);
        let project = project_id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::ProjectTaskLists {
            project_id: project_id.to_string(),
        });
        self.mutations
            .execute(
                None,
                async move { Ok(client.create_task(&project, &req).await?) },
                plan,
            )
            .await
    }

    /// Partial update. The changed fields land in the cached detail entry
    /// immediately; lists converge via invalidation.
    pub async fn update_task(&self, id: &str, req: UpdateTaskRequest) -> Result<Task, SyncError> {
        let mut plan = MutationPlan::new()
            .with_invalidate(KeyPrefix::TaskLists)
            .with_invalidate(KeyPrefix::TaskDetail { id: id.to_string() });
        if let Value::Object(fields) = to_value(&req)? {
            if !fields.is_empty() {
                plan = plan.with_patch(OptimisticPatch::MergeFields {
                    key: CacheKey::TaskDetail { id: id.to_string() },
                    fields,
                });
            }
        }

        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        self.mutations
            .execute(
                Some(format!("task:{id}")),
                async move { Ok(client.update_task(&id_owned, &req).await?) },
                plan,
            )
            .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new()
            .with_invalidate(KeyPrefix::TaskLists)
            .with_invalidate(KeyPrefix::TaskDetail { id: id.to_string() });
        self.mutations
            .execute(
                Some(format!("task:{id}")),
                async move { Ok(client.delete_task(&id_owned).await?) },
                plan,
            )
            .await
    }

    // --- projects -----------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Page<Project>, SyncError> {
        let client = Arc::clone(&self.client);
        self.read_typed(CacheKey::ProjectList, move || {
            let client = Arc::clone(&client);
            async move {
                let page = client.list_projects().await?;
                to_value(&page)
            }
        })
        .await
    }

    pub async fn get_project(&self, id: &str) -> Result<Project, SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        self.read_typed(CacheKey::ProjectDetail { id: id.to_string() }, move || {
            let client = Arc::clone(&client);
            let id = id_owned.clone();
            async move {
                let project = client.get_project(&id).await?;
                to_value(&project)
            }
        })
        .await
    }

    pub async fn create_project(&self, req: CreateProjectRequest) -> Result<Project, SyncError> {
        if req.name.trim().is_empty() {
            return Err(validation("project name must not be empty"));
        }
        let client = Arc::clone(&self.client);
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::ProjectLists);
        self.mutations
            .execute(None, async move { Ok(client.create_project(&req).await?) }, plan)
            .await
    }

    pub async fn update_project(
        &self,
        id: &str,
        req: UpdateProjectRequest,
    ) -> Result<Project, SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new()
            .with_invalidate(KeyPrefix::ProjectLists)
            .with_invalidate(KeyPrefix::ProjectDetail { id: id.to_string() });
        self.mutations
            .execute(
                Some(format!("project:{id}")),
                async move { Ok(client.update_project(&id_owned, &req).await?) },
                plan,
            )
            .await
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new()
            .with_invalidate(KeyPrefix::ProjectLists)
            .with_invalidate(KeyPrefix::ProjectDetail { id: id.to_string() })
            .with_invalidate(KeyPrefix::ProjectTaskLists {
                project_id: id.to_string(),
            });
        self.mutations
            .execute(
                Some(format!("project:{id}")),
                async move { Ok(client.delete_project(&id_owned).await?) },
                plan,
            )
            .await
    }

    pub async fn list_project_members(
        &self,
        project_id: &str,
    ) -> Result<Vec<ProjectMember>, SyncError> {
        let client = Arc::clone(&self.client);
        let project = project_id.to_string();
        self.read_typed(
            CacheKey::ProjectMembers {
                project_id: project_id.to_string(),
            },
            move || {
                let client = Arc::clone(&client);
                let project = project.clone();
                async move {
                    let members = client.list_project_members(&project).await?;
                    to_value(&members)
                }
            },
        )
        .await
    }

    pub async fn add_project_member(
        &self,
        project_id: &str,
        req: AddProjectMemberRequest,
    ) -> Result<ProjectMember, SyncError> {
        let client = Arc::clone(&self.client);
        let project = project_id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::ProjectMembers {
            project_id: project_id.to_string(),
        });
        self.mutations
            .execute(
                None,
                async move { Ok(client.add_project_member(&project, &req).await?) },
                plan,
            )
            .await
    }

    pub async fn remove_project_member(
        &self,
        project_id: &str,
        member_id: &str,
    ) -> Result<(), SyncError> {
        let client = Arc::clone(&self.client);
        let project = project_id.to_string();
        let member = member_id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::ProjectMembers {
            project_id: project_id.to_string(),
        });
        self.mutations
            .execute(
                None,
                async move { Ok(client.remove_project_member(&project, &member).await?) },
                plan,
            )
            .await
    }

    // --- comments -----------------------------------------------------------

    pub async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, SyncError> {
        let client = Arc::clone(&self.client);
        let task = task_id.to_string();
        self.read_typed(
            CacheKey::CommentList {
                task_id: task_id.to_string(),
            },
            move || {
                let client = Arc::clone(&client);
                let task = task.clone();
                async move {
                    let comments = client.list_comments(&task).await?;
                    to_value(&comments)
                }
            },
        )
        .await
    }

    pub async fn create_comment(
        &self,
        task_id: &str,
        req: CreateCommentRequest,
    ) -> Result<Comment, SyncError> {
        if req.body.trim().is_empty() {
            return Err(validation("comment body must not be empty"));
        }
        let client = Arc::clone(&self.client);
        let task = task_id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::CommentList {
            task_id: task_id.to_string(),
        });
        self.mutations
            .execute(
                None,
                async move { Ok(client.create_comment(&task, &req).await?) },
                plan,
            )
            .await
    }

    pub async fn delete_comment(&self, id: &str, task_id: &str) -> Result<(), SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::CommentList {
            task_id: task_id.to_string(),
        });
        self.mutations
            .execute(
                None,
                async move { Ok(client.delete_comment(&id_owned).await?) },
                plan,
            )
            .await
    }

    // --- preferences --------------------------------------------------------

    pub async fn get_preferences(&self) -> Result<NotificationPreferences, SyncError> {
        let client = Arc::clone(&self.client);
        self.read_typed(CacheKey::Preferences, move || {
            let client = Arc::clone(&client);
            async move {
                let prefs = client.get_preferences().await?;
                to_value(&prefs)
            }
        })
        .await
    }

    /// Full replacement; the settings form shows the new state immediately.
    pub async fn update_preferences(
        &self,
        prefs: NotificationPreferences,
    ) -> Result<NotificationPreferences, SyncError> {
        let client = Arc::clone(&self.client);
        let plan = MutationPlan::new()
            .with_patch(OptimisticPatch::ReplaceEntity {
                key: CacheKey::Preferences,
                value: to_value(&prefs)?,
            })
            .with_invalidate(KeyPrefix::Preferences);
        self.mutations
            .execute(
                Some("preferences".to_string()),
                async move { Ok(client.put_preferences(&prefs).await?) },
                plan,
            )
            .await
    }

    // --- webhooks -----------------------------------------------------------

    pub async fn list_webhooks(&self) -> Result<Vec<WebhookConfig>, SyncError> {
        let client = Arc::clone(&self.client);
        self.read_typed(CacheKey::WebhookList, move || {
            let client = Arc::clone(&client);
            async move {
                let hooks = client.list_webhooks().await?;
                to_value(&hooks)
            }
        })
        .await
    }

    pub async fn create_webhook(&self, req: CreateWebhookRequest) -> Result<WebhookConfig, SyncError> {
        if req.url.trim().is_empty() {
            return Err(validation("webhook url must not be empty"));
        }
        let client = Arc::clone(&self.client);
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::Webhooks);
        self.mutations
            .execute(None, async move { Ok(client.create_webhook(&req).await?) }, plan)
            .await
    }

    pub async fn update_webhook(
        &self,
        id: &str,
        req: UpdateWebhookRequest,
    ) -> Result<WebhookConfig, SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::Webhooks);
        self.mutations
            .execute(
                Some(format!("webhook:{id}")),
                async move { Ok(client.update_webhook(&id_owned, &req).await?) },
                plan,
            )
            .await
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<(), SyncError> {
        let client = Arc::clone(&self.client);
        let id_owned = id.to_string();
        let plan = MutationPlan::new().with_invalidate(KeyPrefix::Webhooks);
        self.mutations
            .execute(
                Some(format!("webhook:{id}")),
                async move { Ok(client.delete_webhook(&id_owned).await?) },
                plan,
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use tana_model::TaskPriority;

    use super::*;

    fn ops() -> Operations {
        let cache = RemoteCache::default();
        Operations::new(
            Arc::new(ApiClient::new("http://localhost:0")),
            MutationController::new(cache),
        )
    }

    #[tokio::test]
    async fn empty_task_title_is_rejected_before_dispatch() {
        let ops = ops();
        let err = ops
            .create_task(
                "p-1",
                CreateTaskRequest {
                    title: "   ".to_string(),
                    description: String::new(),
                    priority: TaskPriority::Medium,
                    assignee_id: None,
                    due_date: None,
                    tags: Vec::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Api(e) if matches!(*e, ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_before_dispatch() {
        let ops = ops();
        let err = ops.login("", "hunter2").await.unwrap_err();
        assert!(matches!(err, SyncError::Api(e) if matches!(*e, ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn blank_profile_name_is_rejected_before_dispatch() {
        let ops = ops();
        let err = ops
            .update_user(
                "u-1",
                UpdateUserRequest {
                    name: Some("  ".to_string()),
                    ..UpdateUserRequest::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Api(e) if matches!(*e, ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn empty_comment_body_is_rejected_before_dispatch() {
        let ops = ops();
        let err = ops
            .create_comment(
                "t-1",
                CreateCommentRequest {
                    body: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Api(e) if matches!(*e, ApiError::Validation(_))));
        // Pre-flight rejection leaves no notice behind.
    }
}
