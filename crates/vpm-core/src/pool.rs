//! The set of channels the controller created and is responsible for.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    domain::{ChannelId, GuildId},
    gateway::snowflake,
    store::DurableStore,
    Result,
};

pub const POOL_STATE_KEY: &str = "dynamic_voice/active_channels";

/// Controller-created channel ids, each tagged with its guild.
///
/// The guild is `None` only for entries loaded from older state files that
/// stored bare ids; it is filled in the first time the channel resolves.
/// Iteration is in ascending id order. Snowflakes grow over time, so this is
/// also creation order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolState {
    channels: BTreeMap<ChannelId, Option<GuildId>>,
}

#[derive(Serialize)]
struct Entry {
    id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    guild: Option<u64>,
}

impl PoolState {
    /// Load from the store. Absent, unreadable or malformed state is empty
    /// state; reconciliation heals whatever that loses.
    pub fn load(store: &dyn DurableStore) -> Self {
        let value = match store.load_value(POOL_STATE_KEY) {
            Ok(Some(v)) => v,
            Ok(None) => return Self::default(),
            Err(e) => {
                tracing::warn!("pool state unreadable, starting empty: {e}");
                return Self::default();
            }
        };

        let Some(items) = value.as_array() else {
            tracing::warn!("pool state is not an array, starting empty");
            return Self::default();
        };

        let mut channels = BTreeMap::new();
        for item in items {
            // Older state files stored bare ids, as numbers or decimal strings.
            let entry = match item.as_object() {
                Some(obj) => obj.get("id").and_then(snowflake).map(|id| {
                    (
                        ChannelId(id),
                        obj.get("guild").and_then(snowflake).map(GuildId),
                    )
                }),
                None => snowflake(item).map(|id| (ChannelId(id), None)),
            };
            match entry {
                Some((id, guild)) => {
                    channels.insert(id, guild);
                }
                None => tracing::warn!("skipping malformed pool entry: {item}"),
            }
        }

        tracing::info!(count = channels.len(), "loaded dynamic channels from persistence");
        Self { channels }
    }

    pub fn persist(&self, store: &dyn DurableStore) -> Result<()> {
        let entries: Vec<Entry> = self
            .channels
            .iter()
            .map(|(id, guild)| Entry {
                id: id.0,
                guild: guild.map(|g| g.0),
            })
            .collect();
        store.save(POOL_STATE_KEY, &entries)
    }

    pub fn insert(&mut self, id: ChannelId, guild_id: GuildId) {
        self.channels.insert(id, Some(guild_id));
    }

    /// Record the guild of an entry whose guild was unknown.
    /// Returns whether anything changed.
    pub fn assign_guild(&mut self, id: ChannelId, guild_id: GuildId) -> bool {
        match self.channels.get_mut(&id) {
            Some(slot @ None) => {
                *slot = Some(guild_id);
                true
            }
            _ => false,
        }
    }

    pub fn remove(&mut self, id: ChannelId) -> bool {
        self.channels.remove(&id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Snapshot of the ids, so callers can mutate the state while walking it.
    pub fn ids(&self) -> Vec<ChannelId> {
        self.channels.keys().copied().collect()
    }

    /// Ids that belong to `guild_id`, plus ids whose guild is not yet known.
    pub fn candidates_for(&self, guild_id: GuildId) -> Vec<(ChannelId, Option<GuildId>)> {
        self.channels
            .iter()
            .filter(|(_, g)| g.map_or(true, |g| g == guild_id))
            .map(|(id, g)| (*id, *g))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    #[test]
    fn absent_state_loads_empty() {
        let store = MemoryStore::new();
        assert!(PoolState::load(&store).is_empty());
    }

    #[test]
    fn malformed_state_degrades_to_empty() {
        let store = MemoryStore::with_value(POOL_STATE_KEY, json!({"oops": true}));
        assert!(PoolState::load(&store).is_empty());
    }

    #[test]
    fn accepts_tagged_entries_and_legacy_ids_skipping_garbage() {
        let store = MemoryStore::with_value(
            POOL_STATE_KEY,
            json!([{"id": 30, "guild": 2}, "20", "x", null, 10, {"guild": 1}]),
        );
        let state = PoolState::load(&store);
        assert_eq!(state.ids(), vec![ChannelId(10), ChannelId(20), ChannelId(30)]);
        assert_eq!(
            state.candidates_for(GuildId(1)),
            vec![(ChannelId(10), None), (ChannelId(20), None)]
        );
        assert_eq!(
            state.candidates_for(GuildId(2)),
            vec![
                (ChannelId(10), None),
                (ChannelId(20), None),
                (ChannelId(30), Some(GuildId(2)))
            ]
        );
    }

    #[test]
    fn persist_writes_sorted_tagged_entries() {
        let store = MemoryStore::new();
        let mut state = PoolState::default();
        state.insert(ChannelId(9), GuildId(1));
        state.insert(ChannelId(3), GuildId(2));
        state.persist(&store).unwrap();
        assert_eq!(
            store.get(POOL_STATE_KEY),
            Some(json!([{"id": 3, "guild": 2}, {"id": 9, "guild": 1}]))
        );
        assert_eq!(PoolState::load(&store), state);
    }

    #[test]
    fn assign_guild_only_fills_unknown_entries() {
        let store = MemoryStore::with_value(POOL_STATE_KEY, json!([5, {"id": 6, "guild": 1}]));
        let mut state = PoolState::load(&store);
        assert!(state.assign_guild(ChannelId(5), GuildId(2)));
        assert!(!state.assign_guild(ChannelId(5), GuildId(3)));
        assert!(!state.assign_guild(ChannelId(6), GuildId(2)));
        assert!(!state.assign_guild(ChannelId(7), GuildId(2)));
        assert!(state.candidates_for(GuildId(3)).is_empty());
    }
}
