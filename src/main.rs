use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use secrecy::SecretString;

use taskdeck_auth::AuthService;
use taskdeck_core::{AuthProvider, NoticeSender, TaskStore};
use taskdeck_store::{Database, SqliteTaskStore};
use taskdeck_sync::{trend_series, BoardSummary, SessionProvider, SyncPhase, TaskBoard, TaskForm};

const DEMO_EMAIL: &str = "demo@taskdeck.dev";
const DEMO_PASSWORD: &str = "demo-password";

/// Wires the full stack and runs one scripted dashboard session:
/// sign in, create a task through the form, toggle an activity,
/// read the summary, delete the task, sign out.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting taskdeck");

    let data_dir = dirs_home().join(".taskdeck");
    std::fs::create_dir_all(&data_dir)?;
    let db = Database::open(&data_dir.join("taskdeck.db"))?;

    let auth = Arc::new(AuthService::new(db.clone()));
    let store = Arc::new(SqliteTaskStore::new(db));

    // Demo account; already present on repeat runs.
    if let Ok(identity) = auth.register(DEMO_EMAIL, &SecretString::from(DEMO_PASSWORD.to_string()))
    {
        auth.mark_verified(&identity.user_id)?;
    }

    // Surface notices in the log; a real embedder renders toasts.
    let (notices, mut notice_rx) = NoticeSender::channel(64);
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            tracing::info!(level = ?notice.level, title = %notice.title, "{}", notice.body);
        }
    });

    let session = SessionProvider::start(Arc::clone(&auth) as Arc<dyn AuthProvider>);
    let board = TaskBoard::mount(
        Arc::clone(&store) as Arc<dyn TaskStore>,
        session.subscribe(),
        notices.clone(),
    );
    let mut state = board.state();

    let identity = auth
        .sign_in(DEMO_EMAIL, SecretString::from(DEMO_PASSWORD.to_string()))
        .await?;
    state.wait_for(|s| s.phase == SyncPhase::Synced).await?;
    tracing::info!(user_id = %identity.user_id, "dashboard synced");

    // Create a task through the form controller.
    let mut form = TaskForm::create(Arc::clone(&store) as Arc<dyn TaskStore>, notices.clone());
    form.title = "Explore the dashboard".into();
    form.description = "Seeded by the demo binary".into();
    form.set_activity_input("Open the board");
    form.add_activity();
    form.set_activity_input("Toggle an item");
    form.add_activity();
    form.submit(Some(&identity)).await?;

    let task = {
        let synced = state.wait_for(|s| !s.tasks.is_empty()).await?;
        synced.tasks[0].clone()
    };
    tracing::info!(task_id = %task.id, progress = task.progress(), "task on the board");

    // Optimistic toggle, then the snapshot confirming it.
    board.toggle_activity(&task.id, 0).await;
    {
        let toggled = state
            .wait_for(|s| {
                s.tasks
                    .iter()
                    .find(|t| t.id == task.id)
                    .and_then(|t| t.activities.first())
                    .is_some_and(|a| a.completed)
            })
            .await?;
        tracing::info!(
            progress = toggled.tasks[0].progress(),
            "first activity completed"
        );
    }

    {
        let current = state.borrow();
        let summary = BoardSummary::from_tasks(&current.tasks);
        tracing::info!(
            total = summary.total,
            pending = summary.pending,
            in_progress = summary.in_progress,
            completed = summary.completed,
            "board summary"
        );
        for point in trend_series(&current.tasks, Utc::now().date_naive()) {
            tracing::info!(
                day = %point.day,
                label = %point.label,
                created = point.created,
                completed = point.completed,
                "trend"
            );
        }
    }

    // Clean up the demo task and sign out.
    board.delete_task(&task.id).await;
    state
        .wait_for(|s| s.tasks.iter().all(|t| t.id != task.id))
        .await?;

    auth.sign_out().await;
    state.wait_for(|s| s.should_redirect).await?;
    tracing::info!("signed out, dashboard cleared");

    board.unmount();
    session.shutdown();
    Ok(())
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
