//! Typed endpoint surface, one method per API operation.
//!
//! List endpoints take a pre-rendered query string (possibly empty) so the
//! caller stays in charge of filter canonicalization.

use tana_model::{
    AddProjectMemberRequest, AuthResponse, Comment, CreateCommentRequest, CreateProjectRequest,
    CreateTaskRequest, CreateWebhookRequest, LoginRequest, Notification, NotificationPreferences,
    Page, Project, ProjectMember, RegisterRequest, Task, UnreadCount, UpdateProjectRequest,
    UpdateTaskRequest, UpdateUserRequest, UpdateWebhookRequest, User, WebhookConfig,
};

use crate::client::ApiClient;
use crate::error::ApiError;

fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

impl ApiClient {
    // --- auth ---------------------------------------------------------------

    pub async fn login(&self, req: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.post("/auth/login", req).await
    }

    pub async fn register(&self, req: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.post("/auth/register", req).await
    }

    pub async fn refresh(&self) -> Result<AuthResponse, ApiError> {
        self.post_empty("/auth/refresh").await
    }

    // --- users --------------------------------------------------------------

    /// Profile of the authenticated user.
    pub async fn me(&self) -> Result<User, ApiError> {
        self.get("/auth/me").await
    }

    pub async fn list_users(&self) -> Result<Vec<User>, ApiError> {
        self.get("/users").await
    }

    pub async fn get_user(&self, id: &str) -> Result<User, ApiError> {
        self.get(&format!("/users/{id}")).await
    }

    pub async fn update_user(&self, id: &str, req: &UpdateUserRequest) -> Result<User, ApiError> {
        self.patch(&format!("/users/{id}"), req).await
    }

    // --- projects -----------------------------------------------------------

    pub async fn list_projects(&self) -> Result<Page<Project>, ApiError> {
        self.get("/projects").await
    }

    pub async fn get_project(&self, id: &str) -> Result<Project, ApiError> {
        self.get(&format!("/projects/{id}")).await
    }

    pub async fn create_project(&self, req: &CreateProjectRequest) -> Result<Project, ApiError> {
        self.post("/projects", req).await
    }

    pub async fn update_project(
        &self,
        id: &str,
        req: &UpdateProjectRequest,
    ) -> Result<Project, ApiError> {
        self.patch(&format!("/projects/{id}"), req).await
    }

    pub async fn delete_project(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/projects/{id}")).await
    }

    pub async fn list_project_members(&self, id: &str) -> Result<Vec<ProjectMember>, ApiError> {
        self.get(&format!("/projects/{id}/members")).await
    }

    pub async fn add_project_member(
        &self,
        id: &str,
        req: &AddProjectMemberRequest,
    ) -> Result<ProjectMember, ApiError> {
        self.post(&format!("/projects/{id}/members"), req).await
    }

    pub async fn remove_project_member(
        &self,
        id: &str,
        member_id: &str,
    ) -> Result<(), ApiError> {
        self.delete(&format!("/projects/{id}/members/{member_id}"))
            .await
    }

    // --- tasks --------------------------------------------------------------

    pub async fn list_tasks(&self, project_id: &str, query: &str) -> Result<Page<Task>, ApiError> {
        self.get(&with_query(&format!("/projects/{project_id}/tasks"), query))
            .await
    }

    pub async fn get_task(&self, id: &str) -> Result<Task, ApiError> {
        self.get(&format!("/tasks/{id}")).await
    }

    pub async fn create_task(
        &self,
        project_id: &str,
        req: &CreateTaskRequest,
    ) -> Result<Task, ApiError> {
        self.post(&format!("/projects/{project_id}/tasks"), req)
            .await
    }

    pub async fn update_task(&self, id: &str, req: &UpdateTaskRequest) -> Result<Task, ApiError> {
        self.patch(&format!("/tasks/{id}"), req).await
    }

    pub async fn delete_task(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/tasks/{id}")).await
    }

    // --- comments -----------------------------------------------------------

    pub async fn list_comments(&self, task_id: &str) -> Result<Vec<Comment>, ApiError> {
        self.get(&format!("/tasks/{task_id}/comments")).await
    }

    pub async fn create_comment(
        &self,
        task_id: &str,
        req: &CreateCommentRequest,
    ) -> Result<Comment, ApiError> {
        self.post(&format!("/tasks/{task_id}/comments"), req).await
    }

    pub async fn delete_comment(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/comments/{id}")).await
    }

    // --- notifications ------------------------------------------------------

    pub async fn list_notifications(&self, query: &str) -> Result<Page<Notification>, ApiError> {
        self.get(&with_query("/notifications", query)).await
    }

    pub async fn unread_count(&self) -> Result<UnreadCount, ApiError> {
        self.get("/notifications/unread-count").await
    }

    pub async fn mark_notification_read(&self, id: &str) -> Result<(), ApiError> {
        self.patch::<serde_json::Value, ()>(&format!("/notifications/{id}/read"), &())
            .await?;
        Ok(())
    }

    pub async fn mark_all_notifications_read(&self) -> Result<(), ApiError> {
        self.post_empty::<serde_json::Value>("/notifications/read-all")
            .await?;
        Ok(())
    }

    // --- preferences --------------------------------------------------------

    pub async fn get_preferences(&self) -> Result<NotificationPreferences, ApiError> {
        self.get("/preferences").await
    }

    pub async fn put_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> Result<NotificationPreferences, ApiError> {
        self.put("/preferences", prefs).await
    }

    // --- webhooks -----------------------------------------------------------

    pub async fn list_webhooks(&self) -> Result<Vec<WebhookConfig>, ApiError> {
        self.get("/webhooks").await
    }

    pub async fn create_webhook(
        &self,
        req: &CreateWebhookRequest,
    ) -> Result<WebhookConfig, ApiError> {
        self.post("/webhooks", req).await
    }

    pub async fn update_webhook(
        &self,
        id: &str,
        req: &UpdateWebhookRequest,
    ) -> Result<WebhookConfig, ApiError> {
        self.patch(&format!("/webhooks/{id}"), req).await
    }

    pub async fn delete_webhook(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/webhooks/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_string_is_appended_only_when_present() {
        assert_eq!(with_query("/notifications", ""), "/notifications");
        assert_eq!(
            with_query("/notifications", "page=2&limit=50"),
            "/notifications?page=2&limit=50"
        );
    }
}
