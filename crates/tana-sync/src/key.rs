use std::fmt;

/// Structured identifier addressing one cache entry.
///
/// List keys carry the canonical filter signature produced by the query
/// engine; detail keys carry the entity id. Two query states that differ
/// only in explicitly-spelled defaults produce the same signature and so the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    TaskList { project_id: String, sig: String },
    TaskDetail { id: String },
    ProjectList,
    ProjectDetail { id: String },
    ProjectMembers { project_id: String },
    CommentList { task_id: String },
    NotificationList { sig: String },
    UnreadCount,
    Preferences,
    WebhookList,
    CurrentUser,
    UserList,
    UserDetail { id: String },
}

/// Invalidation scope: either one exact key or a whole family of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPrefix {
    /// Exactly one entry.
    Key(CacheKey),
    /// Every task list, any project, any filter signature.
    TaskLists,
    /// Every task list of one project.
    ProjectTaskLists { project_id: String },
    TaskDetail { id: String },
    ProjectLists,
    ProjectDetail { id: String },
    ProjectMembers { project_id: String },
    CommentList { task_id: String },
    NotificationLists,
    UnreadCount,
    Preferences,
    Webhooks,
    CurrentUser,
    UserLists,
    UserDetail { id: String },
}

impl CacheKey {
    /// Whether this key falls under the given invalidation scope.
    pub fn matches(&self, prefix: &KeyPrefix) -> bool {
        match (prefix, self) {
            (KeyPrefix::Key(key), _) => key == self,
            (KeyPrefix::TaskLists, CacheKey::TaskList { .. }) => true,
            (
                KeyPrefix::ProjectTaskLists { project_id },
                CacheKey::TaskList {
                    project_id: key_pid,
                    ..
                },
            ) => project_id == key_pid,
            (KeyPrefix::TaskDetail { id }, CacheKey::TaskDetail { id: key_id }) => id == key_id,
            (KeyPrefix::ProjectLists, CacheKey::ProjectList) => true,
            (KeyPrefix::ProjectDetail { id }, CacheKey::ProjectDetail { id: key_id }) => {
                id == key_id
            }
            (
                KeyPrefix::ProjectMembers { project_id },
                CacheKey::ProjectMembers {
                    project_id: key_pid,
                },
            ) => project_id == key_pid,
            (
                KeyPrefix::CommentList { task_id },
                CacheKey::CommentList {
                    task_id: key_tid,
                },
            ) => task_id == key_tid,
            (KeyPrefix::NotificationLists, CacheKey::NotificationList { .. }) => true,
            (KeyPrefix::UnreadCount, CacheKey::UnreadCount) => true,
            (KeyPrefix::Preferences, CacheKey::Preferences) => true,
            (KeyPrefix::Webhooks, CacheKey::WebhookList) => true,
            (KeyPrefix::CurrentUser, CacheKey::CurrentUser) => true,
            (KeyPrefix::UserLists, CacheKey::UserList) => true,
            (KeyPrefix::UserDetail { id }, CacheKey::UserDetail { id: key_id }) => id == key_id,
            _ => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::TaskList { project_id, sig } => {
                write!(f, "tasks/{project_id}/list?{sig}")
            }
            CacheKey::TaskDetail { id } => write!(f, "tasks/detail/{id}"),
            CacheKey::ProjectList => write!(f, "projects/list"),
            CacheKey::ProjectDetail { id } => write!(f, "projects/detail/{id}"),
            CacheKey::ProjectMembers { project_id } => {
                write!(f, "projects/{project_id}/members")
            }
            CacheKey::CommentList { task_id } => write!(f, "tasks/{task_id}/comments"),
            CacheKey::NotificationList { sig } => write!(f, "notifications/list?{sig}"),
            CacheKey::UnreadCount => write!(f, "notifications/unread-count"),
            CacheKey::Preferences => write!(f, "preferences"),
            CacheKey::WebhookList => write!(f, "webhooks/list"),
            CacheKey::CurrentUser => write!(f, "users/me"),
            CacheKey::UserList => write!(f, "users/list"),
            CacheKey::UserDetail { id } => write!(f, "users/detail/{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_list(pid: &str, sig: &str) -> CacheKey {
        CacheKey::TaskList {
            project_id: pid.to_string(),
            sig: sig.to_string(),
        }
    }

    #[test]
    fn task_lists_prefix_covers_every_list_but_no_detail() {
        assert!(task_list("p-1", "").matches(&KeyPrefix::TaskLists));
        assert!(task_list("p-2", "status=todo").matches(&KeyPrefix::TaskLists));
        assert!(
            !CacheKey::TaskDetail {
                id: "t-1".to_string()
            }
            .matches(&KeyPrefix::TaskLists)
        );
    }

    #[test]
    fn project_scoped_task_lists_prefix_is_narrower() {
        let prefix = KeyPrefix::ProjectTaskLists {
            project_id: "p-1".to_string(),
        };
        assert!(task_list("p-1", "status=todo").matches(&prefix));
        assert!(!task_list("p-2", "status=todo").matches(&prefix));
    }

    #[test]
    fn detail_prefix_does_not_touch_lists() {
        let prefix = KeyPrefix::TaskDetail {
            id: "t-1".to_string(),
        };
        assert!(
            CacheKey::TaskDetail {
                id: "t-1".to_string()
            }
            .matches(&prefix)
        );
        assert!(!task_list("p-1", "").matches(&prefix));
    }

    #[test]
    fn user_detail_prefix_does_not_touch_the_current_user() {
        let prefix = KeyPrefix::UserDetail {
            id: "u-1".to_string(),
        };
        assert!(
            CacheKey::UserDetail {
                id: "u-1".to_string()
            }
            .matches(&prefix)
        );
        assert!(!CacheKey::CurrentUser.matches(&prefix));
        assert!(CacheKey::CurrentUser.matches(&KeyPrefix::CurrentUser));
        assert!(CacheKey::UserList.matches(&KeyPrefix::UserLists));
    }

    #[test]
    fn exact_key_prefix_matches_only_itself() {
        let key = task_list("p-1", "pageSize=200");
        assert!(key.matches(&KeyPrefix::Key(key.clone())));
        assert!(!task_list("p-1", "").matches(&KeyPrefix::Key(key)));
    }
}
