use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{EntityId, NotificationType};

/// An outbound webhook registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub id: EntityId,
    pub user_id: EntityId,
    pub url: String,
    pub secret: String,
    pub events: Vec<NotificationType>,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWebhookRequest {
    pub url: String,
    pub events: Vec<NotificationType>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateWebhookRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<NotificationType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}
