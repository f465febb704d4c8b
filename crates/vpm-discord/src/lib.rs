//! Discord adapter (REST).
//!
//! Implements the `vpm-core` ChannelPlatform port over the Discord HTTP API.
//! Occupancy is not available over REST; it comes from the shared
//! `VoiceStates` cache that the gateway event loop keeps current.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::json;
use tokio::time::sleep;

use vpm_core::{
    domain::{
        ChannelId, ChannelTemplate, DeleteOutcome, GuildId, OverwriteKind, PermissionOverwrite,
        UserId, VoiceChannel,
    },
    errors::Error,
    gateway::snowflake,
    ports::ChannelPlatform,
    voice_state::VoiceStates,
    Result,
};

const GUILD_VOICE: u64 = 2;
const GUILD_STAGE_VOICE: u64 = 13;

#[derive(Clone)]
pub struct DiscordPlatform {
    http: reqwest::Client,
    api_base: String,
    token: String,
    voice: Arc<VoiceStates>,
}

impl DiscordPlatform {
    pub fn new(
        token: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
        voice: Arc<VoiceStates>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("DiscordBot (vpm, 0.1)")
            .build()
            .map_err(|e| Error::External(format!("discord client build error: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            voice,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    /// Send a request, retrying once when Discord answers 429.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            let mut req = self
                .http
                .request(method.clone(), self.url(path))
                .header("Authorization", format!("Bot {}", self.token));
            if let Some(b) = body {
                req = req.json(b);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| Error::External(format!("discord request error: {e}")))?;

            if resp.status() == StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RETRIES {
                attempts += 1;
                let wait = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("retry_after").and_then(|r| r.as_f64()))
                    .unwrap_or(1.0);
                tracing::debug!("discord rate limited on {path}, retrying in {wait}s");
                sleep(Duration::from_secs_f64(wait.clamp(0.0, 30.0))).await;
                continue;
            }

            return Ok(resp);
        }
    }

    async fn fail(resp: reqwest::Response, what: &str) -> Error {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Error::External(format!(
            "discord {what} failed: {status} {}",
            body.chars().take(200).collect::<String>()
        ))
    }
}

#[async_trait]
impl ChannelPlatform for DiscordPlatform {
    async fn resolve_channel(&self, id: ChannelId) -> Result<Option<VoiceChannel>> {
        let resp = self.send(Method::GET, &format!("/channels/{id}"), None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "get channel").await);
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("discord json error: {e}")))?;
        Ok(voice_channel_from_json(&v))
    }

    async fn occupant_count(&self, channel: &VoiceChannel) -> Result<usize> {
        Ok(self.voice.occupant_count(channel.id))
    }

    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        name: &str,
        template: &ChannelTemplate,
    ) -> Result<ChannelId> {
        let body = create_channel_body(name, template);
        let resp = self
            .send(Method::POST, &format!("/guilds/{guild_id}/channels"), Some(&body))
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "create channel").await);
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::External(format!("discord json error: {e}")))?;
        v.get("id")
            .and_then(snowflake)
            .map(ChannelId)
            .ok_or_else(|| Error::External("created channel has no id".to_string()))
    }

    async fn delete_channel(&self, id: ChannelId) -> Result<DeleteOutcome> {
        let resp = self.send(Method::DELETE, &format!("/channels/{id}"), None).await?;
        match resp.status() {
            s if s.is_success() => {
                self.voice.forget_channel(id);
                Ok(DeleteOutcome::Deleted)
            }
            s if s == StatusCode::NOT_FOUND => Ok(DeleteOutcome::NotFound),
            _ => Err(Self::fail(resp, "delete channel").await),
        }
    }

    async fn move_member(&self, guild_id: GuildId, user_id: UserId, to: ChannelId) -> Result<()> {
        let body = json!({ "channel_id": to.to_string() });
        let resp = self
            .send(
                Method::PATCH,
                &format!("/guilds/{guild_id}/members/{user_id}"),
                Some(&body),
            )
            .await?;
        if !resp.status().is_success() {
            return Err(Self::fail(resp, "move member").await);
        }
        Ok(())
    }
}

/// Map a channel object; anything that is not a guild voice/stage channel
/// is treated as absent.
pub fn voice_channel_from_json(v: &serde_json::Value) -> Option<VoiceChannel> {
    let kind = v.get("type").and_then(|t| t.as_u64())?;
    if kind != GUILD_VOICE && kind != GUILD_STAGE_VOICE {
        return None;
    }

    let overwrites = v
        .get("permission_overwrites")
        .and_then(|o| o.as_array())
        .map(|items| items.iter().filter_map(overwrite_from_json).collect::<Vec<_>>())
        .unwrap_or_default();

    Some(VoiceChannel {
        id: ChannelId(snowflake(v.get("id")?)?),
        guild_id: GuildId(snowflake(v.get("guild_id")?)?),
        name: v
            .get("name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string(),
        bitrate: v.get("bitrate").and_then(|b| b.as_u64()).unwrap_or(64_000) as u32,
        user_limit: v.get("user_limit").and_then(|l| l.as_u64()).unwrap_or(0) as u32,
        category_id: v.get("parent_id").and_then(snowflake).map(ChannelId),
        position: v.get("position").and_then(|p| p.as_i64()).unwrap_or(0) as i32,
        overwrites,
    })
}

fn overwrite_from_json(v: &serde_json::Value) -> Option<PermissionOverwrite> {
    let kind = match v.get("type").and_then(|t| t.as_u64())? {
        0 => OverwriteKind::Role,
        1 => OverwriteKind::Member,
        _ => return None,
    };
    Some(PermissionOverwrite {
        id: snowflake(v.get("id")?)?,
        kind,
        allow: v.get("allow").and_then(snowflake).unwrap_or(0),
        deny: v.get("deny").and_then(snowflake).unwrap_or(0),
    })
}

/// Body for `POST /guilds/{guild}/channels`.
pub fn create_channel_body(name: &str, t: &ChannelTemplate) -> serde_json::Value {
    let overwrites: Vec<serde_json::Value> = t
        .overwrites
        .iter()
        .map(|o| {
            json!({
                "id": o.id.to_string(),
                "type": match o.kind {
                    OverwriteKind::Role => 0,
                    OverwriteKind::Member => 1,
                },
                "allow": o.allow.to_string(),
                "deny": o.deny.to_string(),
            })
        })
        .collect();

    json!({
        "name": name,
        "type": GUILD_VOICE,
        "bitrate": t.bitrate,
        "user_limit": t.user_limit,
        "parent_id": t.category_id.map(|c| c.to_string()),
        "position": t.position,
        "permission_overwrites": overwrites,
    })
}
