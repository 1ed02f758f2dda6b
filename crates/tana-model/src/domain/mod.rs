mod task;
pub use task::{CreateTaskRequest, Task, UpdateTaskRequest};

mod task_status;
pub use task_status::TaskStatus;

mod task_priority;
pub use task_priority::TaskPriority;

mod project;
pub use project::{
    AddProjectMemberRequest, CreateProjectRequest, Project, ProjectMember, ProjectMemberRole,
    UpdateProjectRequest,
};

mod user;
pub use user::{AuthResponse, LoginRequest, RegisterRequest, UpdateUserRequest, User, UserRole};

mod comment;
pub use comment::{Comment, CreateCommentRequest};

mod notification;
pub use notification::{
    Notification, NotificationChannel, NotificationPreferences, NotificationType, UnreadCount,
};

mod webhook;
pub use webhook::{CreateWebhookRequest, UpdateWebhookRequest, WebhookConfig};

mod page;
pub use page::Page;

/// Opaque entity identifier as issued by the server.
pub type EntityId = String;
