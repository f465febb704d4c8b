//! In-memory fakes for the ports, shared by the unit tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{
        ChannelId, ChannelTemplate, DeleteOutcome, GuildId, OverwriteKind, PermissionOverwrite,
        UserId, VoiceChannel,
    },
    errors::Error,
    ports::{ChannelPlatform, HubDirectory, WordSource},
    Result,
};

pub(crate) struct ScriptedWords {
    words: Option<Vec<String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedWords {
    pub(crate) fn ok(words: Vec<&str>) -> Self {
        Self::slow(Duration::ZERO, words)
    }

    pub(crate) fn slow(delay: Duration, words: Vec<&str>) -> Self {
        Self {
            words: Some(words.into_iter().map(str::to_string).collect()),
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            words: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WordSource for ScriptedWords {
    async fn fetch_words(&self, count: usize) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.words {
            Some(w) => Ok(w.iter().take(count).cloned().collect()),
            None => Err(Error::External("word list unavailable".to_string())),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeHubs {
    hubs: BTreeMap<GuildId, ChannelId>,
}

impl FakeHubs {
    pub(crate) fn with(pairs: &[(u64, u64)]) -> Self {
        Self {
            hubs: pairs
                .iter()
                .map(|(g, c)| (GuildId(*g), ChannelId(*c)))
                .collect(),
        }
    }
}

impl HubDirectory for FakeHubs {
    fn hub_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.hubs.get(&guild_id).copied()
    }

    fn guilds(&self) -> Vec<GuildId> {
        self.hubs.keys().copied().collect()
    }
}

#[derive(Default)]
struct PlatformState {
    channels: BTreeMap<ChannelId, VoiceChannel>,
    occupants: HashMap<ChannelId, usize>,
    next_id: u64,
    created: Vec<(ChannelId, String, ChannelTemplate)>,
    deleted: Vec<ChannelId>,
    moves: Vec<(UserId, ChannelId)>,
    fail_create: bool,
    fail_delete: HashSet<ChannelId>,
    fail_resolve: HashSet<ChannelId>,
    vanish_on_delete: HashSet<ChannelId>,
}

/// A guild's worth of voice channels held in memory.
pub(crate) struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            state: Mutex::new(PlatformState {
                next_id: 1000,
                ..Default::default()
            }),
        }
    }
}

impl FakePlatform {
    fn st(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_channel(&self, guild: u64, id: u64, position: i32) -> VoiceChannel {
        let ch = VoiceChannel {
            id: ChannelId(id),
            guild_id: GuildId(guild),
            name: format!("channel-{id}"),
            bitrate: 64_000,
            user_limit: 5,
            category_id: Some(ChannelId(7)),
            position,
            overwrites: vec![PermissionOverwrite {
                id: guild,
                kind: OverwriteKind::Role,
                allow: 0x0010_0000,
                deny: 0,
            }],
        };
        self.st().channels.insert(ch.id, ch.clone());
        ch
    }

    pub(crate) fn set_occupants(&self, id: u64, n: usize) {
        self.st().occupants.insert(ChannelId(id), n);
    }

    /// Simulate someone deleting the channel behind our back.
    pub(crate) fn remove_externally(&self, id: u64) {
        self.st().channels.remove(&ChannelId(id));
    }

    pub(crate) fn fail_creates(&self) {
        self.st().fail_create = true;
    }

    pub(crate) fn fail_delete_of(&self, id: ChannelId) {
        self.st().fail_delete.insert(id);
    }

    pub(crate) fn vanish_on_delete(&self, id: ChannelId) {
        self.st().vanish_on_delete.insert(id);
    }

    pub(crate) fn fail_resolve_of(&self, id: ChannelId) {
        self.st().fail_resolve.insert(id);
    }

    pub(crate) fn exists(&self, id: ChannelId) -> bool {
        self.st().channels.contains_key(&id)
    }

    pub(crate) fn created(&self) -> Vec<ChannelId> {
        self.st().created.iter().map(|(id, _, _)| *id).collect()
    }

    pub(crate) fn created_with(&self) -> Vec<(ChannelId, String, ChannelTemplate)> {
        self.st().created.clone()
    }

    pub(crate) fn deleted(&self) -> Vec<ChannelId> {
        self.st().deleted.clone()
    }

    pub(crate) fn moves(&self) -> Vec<(UserId, ChannelId)> {
        self.st().moves.clone()
    }

    pub(crate) fn action_count(&self) -> usize {
        let st = self.st();
        st.created.len() + st.deleted.len()
    }

    /// Number of empty channels among `hub` and the given pool ids that still exist.
    pub(crate) fn empty_among(&self, hub: u64, pool: &[ChannelId]) -> usize {
        let st = self.st();
        std::iter::once(ChannelId(hub))
            .chain(pool.iter().copied().filter(|id| id.0 != hub))
            .filter(|id| st.channels.contains_key(id))
            .filter(|id| st.occupants.get(id).copied().unwrap_or(0) == 0)
            .count()
    }
}

#[async_trait]
impl ChannelPlatform for FakePlatform {
    async fn resolve_channel(&self, id: ChannelId) -> Result<Option<VoiceChannel>> {
        // Stand-in for the network round trip, so concurrent passes interleave.
        tokio::task::yield_now().await;
        let st = self.st();
        if st.fail_resolve.contains(&id) {
            return Err(Error::External(format!("resolve {id} timed out")));
        }
        Ok(st.channels.get(&id).cloned())
    }

    async fn occupant_count(&self, channel: &VoiceChannel) -> Result<usize> {
        Ok(self.st().occupants.get(&channel.id).copied().unwrap_or(0))
    }

    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        template: &ChannelTemplate,
    ) -> Result<ChannelId> {
        let mut st = self.st();
        if st.fail_create {
            return Err(Error::External("missing permissions".to_string()));
        }
        st.next_id += 1;
        let id = ChannelId(st.next_id);
        st.channels.insert(
            id,
            VoiceChannel {
                id,
                guild_id,
                name: name.to_string(),
                bitrate: template.bitrate,
                user_limit: template.user_limit,
                category_id: template.category_id,
                position: template.position,
                overwrites: template.overwrites.clone(),
            },
        );
        st.created.push((id, name.to_string(), template.clone()));
        Ok(id)
    }

    async fn delete_channel(&self, id: ChannelId) -> Result<DeleteOutcome> {
        tokio::task::yield_now().await;
        let mut st = self.st();
        if st.fail_delete.contains(&id) {
            return Err(Error::External("503 service unavailable".to_string()));
        }
        st.deleted.push(id);
        if st.vanish_on_delete.contains(&id) {
            st.channels.remove(&id);
            return Ok(DeleteOutcome::NotFound);
        }
        Ok(match st.channels.remove(&id) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    async fn move_member(&self, _guild_id: GuildId, user_id: UserId, to: ChannelId) -> Result<()> {
        self.st().moves.push((user_id, to));
        Ok(())
    }
}
