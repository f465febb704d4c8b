use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChannelTemplate, DeleteOutcome, GuildId, UserId, VoiceChannel},
    Result,
};

/// Hexagonal port for the chat platform's channel API.
///
/// Every call may suspend; the controller awaits them one at a time while it
/// holds its pool lock.
#[async_trait]
pub trait ChannelPlatform: Send + Sync {
    /// `Ok(None)` means the platform says the channel no longer exists.
    async fn resolve_channel(&self, id: ChannelId) -> Result<Option<VoiceChannel>>;

    async fn occupant_count(&self, channel: &VoiceChannel) -> Result<usize>;

    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        template: &ChannelTemplate,
    ) -> Result<ChannelId>;

    async fn delete_channel(&self, id: ChannelId) -> Result<DeleteOutcome>;

    /// Only used when move-on-join is enabled.
    async fn move_member(&self, guild_id: GuildId, user_id: UserId, to: ChannelId) -> Result<()>;
}

/// External word-list service used to name new channels.
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn fetch_words(&self, count: usize) -> Result<Vec<String>>;
}

/// Per-guild hub configuration (owned elsewhere, read-only here).
pub trait HubDirectory: Send + Sync {
    fn hub_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Every guild that has a hub configured.
    fn guilds(&self) -> Vec<GuildId>;
}
