// Cherry Diary - local diary and reminder storage
// Entry point: sets up storage and runs the reminder scanner until Ctrl+C

use cherry_diary::services::LogNotifier;
use cherry_diary::{app, AppConfig};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cherry_diary=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cherry Diary");

    let config = AppConfig::from_env();
    let state = app::setup(&config).await?;

    let summaries = state.diary.list_summaries().await?;
    let stats = state.reminders.stats().await?;
    tracing::info!(
        "{} diary entries, {} reminders ({} pending, {} overdue)",
        summaries.len(),
        stats.total,
        stats.pending,
        stats.overdue
    );

    let scanner = state.spawn_scanner(&config, Arc::new(LogNotifier));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scanner.shutdown().await;

    Ok(())
}
