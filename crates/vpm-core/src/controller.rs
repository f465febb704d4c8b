//! Elastic voice-channel pool controller.
//!
//! Keeps exactly one empty channel among a guild's hub and the channels we
//! created for it:
//! - nobody idle anywhere -> create one channel shaped like the hub
//! - several idle -> delete the surplus (never the hub)
//!
//! Every pass runs under one controller-wide lock that is held across the
//! remote read, the decision and the create/delete calls. Two events landing
//! together therefore cannot both see "zero empty" and both create, or both
//! pick the same channel to delete. This gives up parallelism across guilds,
//! which is fine at the channel counts involved.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{
    domain::{ChannelId, ChannelTemplate, DeleteOutcome, GuildId, MembershipChange, VoiceChannel},
    names::NameSupplier,
    pool::PoolState,
    ports::{ChannelPlatform, HubDirectory},
    store::DurableStore,
    Result,
};

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Created channels are named `<prefix> <token>`.
    pub channel_prefix: String,
    /// Move a user who joins the hub into the spare channel.
    pub move_on_join: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            channel_prefix: "Voice".to_string(),
            move_on_join: false,
        }
    }
}

/// What one enforcement pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub created: Vec<ChannelId>,
    pub deleted: Vec<ChannelId>,
    /// Pool ids dropped because the platform no longer knows them.
    pub purged: Vec<ChannelId>,
    /// The single empty channel left after the pass (may be the hub).
    pub spare: Option<ChannelId>,
}

impl PassReport {
    pub fn is_quiet(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.purged.is_empty()
    }
}

/// Outcome of the startup reconciliation.
#[derive(Clone, Debug, Default)]
pub struct ReconcileReport {
    pub orphans: Vec<ChannelId>,
    pub passes: Vec<(GuildId, PassReport)>,
}

pub struct PoolController {
    platform: Arc<dyn ChannelPlatform>,
    hubs: Arc<dyn HubDirectory>,
    store: Arc<dyn DurableStore>,
    names: NameSupplier,
    cfg: ControllerConfig,
    pool: Mutex<PoolState>,
}

struct Member {
    channel: VoiceChannel,
    occupants: usize,
}

impl PoolController {
    pub fn new(
        cfg: ControllerConfig,
        platform: Arc<dyn ChannelPlatform>,
        hubs: Arc<dyn HubDirectory>,
        store: Arc<dyn DurableStore>,
        names: NameSupplier,
    ) -> Self {
        let pool = PoolState::load(store.as_ref());
        Self {
            platform,
            hubs,
            store,
            names,
            cfg,
            pool: Mutex::new(pool),
        }
    }

    pub fn names(&self) -> &NameSupplier {
        &self.names
    }

    pub async fn managed_channels(&self) -> Vec<ChannelId> {
        self.pool.lock().await.ids()
    }

    /// Restore the one-empty-channel invariant for `guild_id`.
    ///
    /// A guild without a hub, or whose hub no longer resolves, is left alone.
    /// Errors are only returned for failed reads before anything was changed.
    pub async fn ensure_one_empty_channel(&self, guild_id: GuildId) -> Result<PassReport> {
        let mut pool = self.pool.lock().await;
        self.enforce(&mut pool, guild_id).await
    }

    /// Event-handler boundary for voice membership changes. Never fails.
    pub async fn handle_membership_change(&self, change: MembershipChange) -> PassReport {
        if change.is_noop() {
            return PassReport::default();
        }
        let Some(hub_id) = self.hubs.hub_channel(change.guild_id) else {
            return PassReport::default();
        };

        let mut pool = self.pool.lock().await;
        let report = match self.enforce(&mut pool, change.guild_id).await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(guild = %change.guild_id, "voice pool enforcement failed: {e}");
                return PassReport::default();
            }
        };

        if self.cfg.move_on_join && change.current == Some(hub_id) {
            if let Some(spare) = report.spare.filter(|s| *s != hub_id) {
                match self
                    .platform
                    .move_member(change.guild_id, change.user_id, spare)
                    .await
                {
                    Ok(()) => tracing::info!(user = %change.user_id, channel = %spare, "moved user out of hub"),
                    Err(e) => tracing::warn!(user = %change.user_id, "failed to move user: {e}"),
                }
            }
        }

        report
    }

    /// A channel was deleted on the platform. Forget it if it was ours and
    /// re-enforce its guild. Never fails.
    pub async fn handle_channel_deleted(&self, guild_id: GuildId, channel_id: ChannelId) -> PassReport {
        let mut pool = self.pool.lock().await;
        let forgotten = pool.remove(channel_id);
        if forgotten {
            tracing::info!(channel = %channel_id, "managed channel deleted externally");
            self.persist(&pool);
        }

        if self.hubs.hub_channel(guild_id).is_none() {
            return PassReport::default();
        }

        match self.enforce(&mut pool, guild_id).await {
            Ok(mut r) => {
                if forgotten {
                    r.purged.insert(0, channel_id);
                }
                r
            }
            Err(e) => {
                tracing::error!(guild = %guild_id, "voice pool enforcement failed: {e}");
                PassReport::default()
            }
        }
    }

    /// Startup pass: reload persisted state, drop ids whose channels vanished
    /// while we were offline, then enforce every configured guild once.
    pub async fn reconcile_on_ready(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        {
            let mut pool = self.pool.lock().await;
            *pool = PoolState::load(self.store.as_ref());

            let mut learned = false;
            for id in pool.ids() {
                match self.platform.resolve_channel(id).await {
                    Ok(Some(channel)) => learned |= pool.assign_guild(id, channel.guild_id),
                    Ok(None) => {
                        pool.remove(id);
                        report.orphans.push(id);
                    }
                    Err(e) => tracing::warn!(channel = %id, "could not check channel, keeping it: {e}"),
                }
            }

            if !report.orphans.is_empty() {
                tracing::info!(count = report.orphans.len(), "cleaned up orphaned dynamic channels");
            }
            if learned || !report.orphans.is_empty() {
                self.persist(&pool);
            }
        }

        for guild_id in self.hubs.guilds() {
            let mut pool = self.pool.lock().await;
            match self.enforce(&mut pool, guild_id).await {
                Ok(r) => report.passes.push((guild_id, r)),
                Err(e) => tracing::error!(guild = %guild_id, "startup enforcement failed: {e}"),
            }
        }

        report
    }

    async fn enforce(&self, pool: &mut PoolState, guild_id: GuildId) -> Result<PassReport> {
        let mut report = PassReport::default();

        let Some(hub_id) = self.hubs.hub_channel(guild_id) else {
            return Ok(report);
        };
        let Some(hub) = self.platform.resolve_channel(hub_id).await? else {
            tracing::warn!(guild = %guild_id, hub = %hub_id, "hub channel not found, skipping");
            return Ok(report);
        };

        // Read everything first; nothing is changed remotely until the whole
        // relevant set is known.
        let hub_occupants = self.platform.occupant_count(&hub).await?;
        let mut pooled = Vec::new();
        let mut learned = false;
        // Channels known to belong to other guilds are never read here.
        for (id, known_guild) in pool.candidates_for(guild_id) {
            if id == hub_id {
                continue;
            }
            let resolved = match self.platform.resolve_channel(id).await {
                Ok(resolved) => resolved,
                Err(e) if known_guild.is_none() => {
                    tracing::warn!(channel = %id, "could not check channel of unknown guild, skipping: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            match resolved {
                Some(channel) => {
                    learned |= pool.assign_guild(id, channel.guild_id);
                    if channel.guild_id == guild_id {
                        let occupants = self.platform.occupant_count(&channel).await?;
                        pooled.push(Member { channel, occupants });
                    }
                }
                None => report.purged.push(id),
            }
        }

        for id in &report.purged {
            pool.remove(*id);
        }
        if !report.purged.is_empty() {
            tracing::info!(count = report.purged.len(), "dropped vanished dynamic channels");
        }
        if learned || !report.purged.is_empty() {
            self.persist(pool);
        }

        let empty_pooled: Vec<ChannelId> = pooled
            .iter()
            .filter(|m| m.occupants == 0)
            .map(|m| m.channel.id)
            .collect();
        let hub_empty = hub_occupants == 0;
        let empty_count = empty_pooled.len() + usize::from(hub_empty);

        match empty_count {
            0 => {
                report.spare = self.create_spare(pool, &hub).await;
                report.created.extend(report.spare);
            }
            1 => {
                report.spare = if hub_empty {
                    Some(hub_id)
                } else {
                    empty_pooled.first().copied()
                };
            }
            _ => {
                // Keep the hub if it is idle, otherwise the oldest idle channel.
                let keep = if hub_empty { hub_id } else { empty_pooled[0] };
                let surplus: Vec<ChannelId> = empty_pooled
                    .iter()
                    .copied()
                    .filter(|id| *id != keep)
                    .take(empty_count - 1)
                    .collect();

                for &id in &surplus {
                    match self.platform.delete_channel(id).await {
                        Ok(outcome) => {
                            if outcome == DeleteOutcome::NotFound {
                                tracing::debug!(channel = %id, "channel already gone");
                            }
                            pool.remove(id);
                            report.deleted.push(id);
                            tracing::info!(guild = %guild_id, channel = %id, "deleted dynamic voice channel");
                        }
                        // Still ours and still empty: the next pass retries it.
                        Err(e) => tracing::warn!(channel = %id, "error deleting dynamic channel: {e}"),
                    }
                }

                if !report.deleted.is_empty() {
                    self.persist(pool);
                }
                if report.deleted.len() == surplus.len() {
                    report.spare = Some(keep);
                } else {
                    tracing::warn!(
                        guild = %guild_id,
                        remaining = surplus.len() - report.deleted.len(),
                        "partial pass, surplus channels left for the next pass"
                    );
                }
            }
        }

        Ok(report)
    }

    async fn create_spare(&self, pool: &mut PoolState, hub: &VoiceChannel) -> Option<ChannelId> {
        let template = ChannelTemplate::from_hub(hub);
        let name = format!("{} {}", self.cfg.channel_prefix, self.names.next_name());

        match self
            .platform
            .create_voice_channel(hub.guild_id, &name, &template)
            .await
        {
            Ok(id) => {
                pool.insert(id, hub.guild_id);
                self.persist(pool);
                tracing::info!(guild = %hub.guild_id, channel = %id, "created dynamic voice '{name}'");
                Some(id)
            }
            Err(e) => {
                tracing::warn!(guild = %hub.guild_id, "error creating dynamic voice: {e}");
                None
            }
        }
    }

    fn persist(&self, pool: &PoolState) {
        if let Err(e) = pool.persist(self.store.as_ref()) {
            tracing::warn!("failed to persist pool state: {e}");
        }
    }
}
