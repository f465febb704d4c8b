//! Gateway event loop: JSON lines in, controller calls out.
//!
//! The voice-state cache is updated inline, in arrival order, so occupancy is
//! never read out of order. Controller work is spawned; the controller's own
//! lock serializes it.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use vpm_core::{
    controller::PoolController,
    gateway::{decode_line, GatewayEvent},
    voice_state::VoiceStates,
};

pub async fn run<R>(
    reader: R,
    ctl: Arc<PoolController>,
    voice: Arc<VoiceStates>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut tasks = JoinSet::new();

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            tracing::info!("event stream closed");
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match decode_line(&line) {
            Ok(ev) => dispatch(ev, &ctl, &voice, &mut tasks),
            Err(e) => tracing::warn!("skipping gateway line: {e}"),
        }

        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::error!("event handler panicked: {e}");
            }
        }
    }

    while let Some(done) = tasks.join_next().await {
        if let Err(e) = done {
            tracing::error!("event handler panicked: {e}");
        }
    }
    Ok(())
}

fn dispatch(
    ev: GatewayEvent,
    ctl: &Arc<PoolController>,
    voice: &VoiceStates,
    tasks: &mut JoinSet<()>,
) {
    match ev {
        GatewayEvent::Ready => {
            let ctl = ctl.clone();
            tasks.spawn(async move {
                let report = ctl.reconcile_on_ready().await;
                tracing::info!(
                    orphans = report.orphans.len(),
                    guilds = report.passes.len(),
                    "startup reconciliation finished"
                );
            });
        }
        GatewayEvent::GuildCreate {
            guild_id,
            voice_states,
        } => {
            voice.seed_guild(guild_id, &voice_states);
            tracing::debug!(guild = %guild_id, members = voice_states.len(), "seeded voice states");
        }
        GatewayEvent::VoiceStateUpdate(update) => {
            let change = voice.apply(update);
            if change.is_noop() {
                return;
            }
            let ctl = ctl.clone();
            tasks.spawn(async move {
                ctl.handle_membership_change(change).await;
            });
        }
        GatewayEvent::ChannelDelete {
            guild_id,
            channel_id,
        } => {
            voice.forget_channel(channel_id);
            let Some(guild_id) = guild_id else {
                return;
            };
            let ctl = ctl.clone();
            tasks.spawn(async move {
                ctl.handle_channel_deleted(guild_id, channel_id).await;
            });
        }
        GatewayEvent::Other(_) => {}
    }
}
