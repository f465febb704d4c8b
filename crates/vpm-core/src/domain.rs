use std::fmt;

/// Discord guild ("community") id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GuildId(pub u64);

/// Discord channel id. Snowflakes are unique across guilds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u64);

/// Discord user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub u64);

macro_rules! display_snowflake {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_snowflake!(GuildId, ChannelId, UserId);

/// Target of a permission overwrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwriteKind {
    Role,
    Member,
}

/// One access-control entry on a channel (allow/deny bitsets).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub id: u64,
    pub kind: OverwriteKind,
    pub allow: u64,
    pub deny: u64,
}

/// A voice channel as resolved from the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    pub bitrate: u32,
    /// 0 means unlimited.
    pub user_limit: u32,
    pub category_id: Option<ChannelId>,
    pub position: i32,
    pub overwrites: Vec<PermissionOverwrite>,
}

/// Snapshot of the hub's settings, copied onto every channel we create.
///
/// Taken at creation time so later hub edits (or removal) never affect a
/// channel that is already being built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelTemplate {
    pub bitrate: u32,
    pub user_limit: u32,
    pub category_id: Option<ChannelId>,
    pub overwrites: Vec<PermissionOverwrite>,
    pub position: i32,
}

impl ChannelTemplate {
    /// Copy the hub and place the new channel directly after it.
    pub fn from_hub(hub: &VoiceChannel) -> Self {
        Self {
            bitrate: hub.bitrate,
            user_limit: hub.user_limit,
            category_id: hub.category_id,
            overwrites: hub.overwrites.clone(),
            position: hub.position.saturating_add(1),
        }
    }
}

/// Result of a delete call. A missing channel counts as already deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// A user's voice membership moved from `previous` to `current`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MembershipChange {
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub previous: Option<ChannelId>,
    pub current: Option<ChannelId>,
}

impl MembershipChange {
    pub fn is_noop(&self) -> bool {
        self.previous == self.current
    }
}
