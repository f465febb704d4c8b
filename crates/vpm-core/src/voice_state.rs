//! Who is sitting in which voice channel, as reported by the gateway.
//!
//! The REST API cannot list a channel's occupants, so occupancy is answered
//! from this cache. It also turns raw voice-state updates (which only carry
//! the new channel) into `previous -> current` membership changes.

use std::{collections::HashMap, sync::RwLock};

use crate::domain::{ChannelId, GuildId, MembershipChange, UserId};

/// A single voice state as delivered by the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoiceStateUpdate {
    pub guild_id: GuildId,
    pub user_id: UserId,
    /// `None` when the user disconnected.
    pub channel_id: Option<ChannelId>,
}

#[derive(Debug, Default)]
pub struct VoiceStates {
    members: RwLock<HashMap<(GuildId, UserId), ChannelId>>,
}

impl VoiceStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, update: VoiceStateUpdate) -> MembershipChange {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        let key = (update.guild_id, update.user_id);
        let previous = match update.channel_id {
            Some(channel) => members.insert(key, channel),
            None => members.remove(&key),
        };

        MembershipChange {
            user_id: update.user_id,
            guild_id: update.guild_id,
            previous,
            current: update.channel_id,
        }
    }

    /// Replace everything known about `guild_id` with a fresh snapshot.
    pub fn seed_guild(&self, guild_id: GuildId, states: &[VoiceStateUpdate]) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.retain(|(g, _), _| *g != guild_id);
        for s in states {
            if let Some(channel) = s.channel_id {
                members.insert((guild_id, s.user_id), channel);
            }
        }
    }

    pub fn occupant_count(&self, channel_id: ChannelId) -> usize {
        let members = self.members.read().unwrap_or_else(|e| e.into_inner());
        members.values().filter(|c| **c == channel_id).count()
    }

    /// Drop everyone recorded in a channel that no longer exists.
    pub fn forget_channel(&self, channel_id: ChannelId) {
        let mut members = self.members.write().unwrap_or_else(|e| e.into_inner());
        members.retain(|_, c| *c != channel_id);
    }
}
