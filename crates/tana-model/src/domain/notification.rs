use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::EntityId;

/// Server-side event kind a notification was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TaskAssigned,
    TaskStatusChanged,
    CommentAdded,
    ProjectInvited,
    TaskDueSoon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Email,
    Webhook,
}

/// A delivered notification as returned by `GET /notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: EntityId,
    pub user_id: EntityId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub channel: NotificationChannel,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Payload of `GET /notifications/unread-count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub count: u64,
}

/// Per-event-kind channel routing, stored via `GET/PUT /preferences`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub user_id: EntityId,
    #[serde(default)]
    pub task_assigned: Vec<NotificationChannel>,
    #[serde(default)]
    pub task_status_changed: Vec<NotificationChannel>,
    #[serde(default)]
    pub comment_added: Vec<NotificationChannel>,
    #[serde(default)]
    pub project_invited: Vec<NotificationChannel>,
    #[serde(default)]
    pub task_due_soon: Vec<NotificationChannel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_type_field_is_named_type_on_the_wire() {
        let json = r#"{
            "id": "n-1",
            "userId": "u-1",
            "type": "task_assigned",
            "channel": "in_app",
            "title": "Assigned",
            "body": "You were assigned a task",
            "read": false,
            "createdAt": "2026-02-01T08:00:00Z"
        }"#;

        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationType::TaskAssigned);
        assert_eq!(n.channel, NotificationChannel::InApp);
        assert!(!n.read);
    }
}
