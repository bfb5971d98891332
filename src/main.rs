use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use matchbot::channels::{ChannelManager, CliChannel, TelegramChannel};
use matchbot::config::BotConfig;
use matchbot::conversation::ConversationEngine;
use matchbot::dispatcher::Dispatcher;
use matchbot::profile::UserId;
use matchbot::store::{LibSqlBackend, ProfileStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BotConfig::from_env().context("invalid configuration")?;

    // Logs go to stderr (stdout belongs to the CLI channel), plus a daily
    // file when a log directory is configured.
    let (file_layer, _log_guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "matchbot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    eprintln!("💘 Matchbot v{}", env!("CARGO_PKG_VERSION"));

    // ── Database ─────────────────────────────────────────────────────────
    let db = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Profiles: {}", db.count().await.unwrap_or_default());
    eprintln!(
        "   Age range: {}-{}",
        config.age_bounds.min, config.age_bounds.max
    );

    let engine = Arc::new(ConversationEngine::new(
        db.clone(),
        db,
        config.age_bounds,
    ));

    // ── Channels ─────────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();

    if let Some(telegram) = &config.telegram {
        let allowed = &telegram.allowed_users;
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if allowed.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                allowed.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::new(
            telegram.bot_token.clone(),
            telegram.allowed_users.clone(),
        )));
    }

    if config.cli_enabled {
        channels.add(Box::new(CliChannel::new(UserId(1))));
        eprintln!("   CLI: enabled (type /start; !as <id> switches user)");
    }

    if channels.is_empty() {
        anyhow::bail!("no channels enabled; set TELEGRAM_BOT_TOKEN or MATCHBOT_CLI=1");
    }
    eprintln!("   Channels: {}\n", channels.names().join(", "));

    if let Err(e) = channels.health_check_all().await {
        tracing::warn!(error = %e, "Channel health check failed");
    }

    Dispatcher::new(engine, Arc::new(channels), config.worker_idle_timeout)
        .run()
        .await?;

    Ok(())
}
