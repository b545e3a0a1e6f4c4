use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ytdig_core::YoutubeClient;
use ytdigd::config::{SyncConfig, session_from_env};
use ytdigd::service::current_subscriptions;
use ytdigd::sync::engine::SyncEngine;
use ytdigd::sync::store::RecordStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CliMode {
    Run { force: bool },
    Help,
}

fn parse_cli_mode<I>(args: I) -> anyhow::Result<CliMode>
where
    I: IntoIterator<Item = String>,
{
    let mut mode = CliMode::Run { force: false };
    for arg in args.into_iter().skip(1) {
        match arg.as_str() {
            "--force" => {
                if let CliMode::Run { force } = &mut mode {
                    *force = true;
                }
            }
            "--help" | "-h" => mode = CliMode::Help,
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    dotenvy::dotenv().ok();
    let force = match parse_cli_mode(std::env::args())? {
        CliMode::Help => {
            println!("Usage: ytdigd [--force]");
            println!("  --force   Refresh subscriptions even if the snapshot is recent");
            return Ok(());
        }
        CliMode::Run { force } => force,
    };

    let config = SyncConfig::from_env()?;
    let store = RecordStore::new_at(&config.db_path)
        .await
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;
    let client = YoutubeClient::with_base_url(&config.api_base)
        .context("invalid catalog base url")?
        .with_page_size(config.page_size)
        .with_max_pages(config.max_pages);
    let engine = SyncEngine::new(client, store).with_policy(config.policy());

    let mut session = session_from_env();
    if force {
        match &session {
            Some(session) if engine.request_refresh(&session.user.id).await? => {
                info!(user_id = %session.user.id, "refresh requested");
            }
            Some(_) => {}
            None => warn!("--force ignored without a session"),
        }
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing the current item");
            on_signal.cancel();
        }
    });

    let channels = current_subscriptions(&engine, session.as_mut(), &cancel)
        .await
        .context("failed to load subscriptions")?;
    println!("{}", serde_json::to_string_pretty(&channels)?);
    Ok(())
}
