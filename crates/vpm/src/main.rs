use std::sync::Arc;

use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;

use vpm_core::{
    config::Config,
    controller::PoolController,
    names::NameSupplier,
    store::{DurableStore, JsonFileStore},
    voice_state::VoiceStates,
};
use vpm_discord::DiscordPlatform;
use vpm_wordlist::WordListClient;

mod events;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vpm_core::logging::init("vpm")?;

    let cfg = Config::load()?;
    tracing::info!(
        hubs = cfg.hubs.len(),
        state_dir = %cfg.state_dir.display(),
        move_on_join = cfg.move_on_join,
        "voice pool manager starting"
    );

    let voice = Arc::new(VoiceStates::new());
    let platform = Arc::new(DiscordPlatform::new(
        cfg.discord_bot_token.clone(),
        cfg.discord_api_base.clone(),
        cfg.platform_timeout,
        voice.clone(),
    )?);
    let store: Arc<dyn DurableStore> = Arc::new(JsonFileStore::new(&cfg.state_dir));
    let words = Arc::new(WordListClient::new(
        cfg.wordlist_url.clone(),
        cfg.name_fetch_timeout,
    )?);

    let names = NameSupplier::new(cfg.names(), words, store.clone());
    if names.cached() < cfg.name_low_water {
        names.trigger_replenish();
    }

    let ctl = Arc::new(PoolController::new(
        cfg.controller(),
        platform,
        Arc::new(cfg.hub_directory()),
        store,
        names,
    ));

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    // Gateway dispatches are forwarded to us one JSON object per line.
    let stdin = BufReader::new(tokio::io::stdin());
    events::run(stdin, ctl.clone(), voice, shutdown).await?;

    ctl.names().wait_idle().await;
    tracing::info!("voice pool manager stopped");
    Ok(())
}
