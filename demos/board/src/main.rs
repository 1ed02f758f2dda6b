//! End-to-end wiring demo: log in, load a project board, move the first
//! "todo" task one column to the right, and watch the unread badge.
//!
//! ```sh
//! TANA_BASE_URL=http://localhost:3000/api \
//! TANA_EMAIL=demo@example.com TANA_PASSWORD=demo \
//! board-demo <project-id>
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use tana_client::ApiClient;
use tana_model::TaskStatus;
use tana_sync::{DropOutcome, SyncEngine, TaskListQuery};

fn env(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{name} is not set"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tana_observe::logger_init(&tana_observe::LoggerConfig::default())?;

    let project_id = std::env::args()
        .nth(1)
        .context("usage: board-demo <project-id>")?;

    let client = Arc::new(ApiClient::new(env("TANA_BASE_URL")?));
    client.on_session_expired(|| warn!("session expired, log in again"));

    let engine = SyncEngine::new(client);
    let ops = engine.ops();

    let auth = ops.login(&env("TANA_EMAIL")?, &env("TANA_PASSWORD")?).await?;
    info!(user = %auth.user.name, "authenticated");

    let page = ops.list_tasks(&project_id, &TaskListQuery::board()).await?;
    info!(total = page.total, "board loaded");
    for task in &page.items {
        info!(id = %task.id, status = %task.status, title = %task.title, "task");
    }

    if let Some(task) = page.items.iter().find(|t| t.status == TaskStatus::Todo) {
        let board = engine.board(&project_id);
        board.pick_up(&task.id, task.status)?;
        match board.drop_on(TaskStatus::InProgress).await {
            Ok(DropOutcome::Moved(task)) => info!(id = %task.id, "moved to in_progress"),
            Ok(DropOutcome::NoOp) => info!("already there"),
            Err(err) => warn!(error = %err, "move failed"),
        }
    }

    engine.start_polling(Duration::from_secs(30));
    let unread = engine.notifications().unread_count().await?;
    info!(unread, "notification badge");

    for notice in engine.drain_notices() {
        warn!(message = %notice.message, retryable = notice.retryable, "notice");
    }

    engine.shutdown().await;
    Ok(())
}
