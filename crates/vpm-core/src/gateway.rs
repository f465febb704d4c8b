//! Decoding of gateway dispatches forwarded as JSON lines.
//!
//! Each line is `{"t": <event name>, "d": <payload>}`, the shape of a Discord
//! gateway dispatch. Only the events the pool controller reacts to are
//! decoded; everything else comes back as `Other`.

use crate::{
    domain::{ChannelId, GuildId, UserId},
    errors::Error,
    voice_state::VoiceStateUpdate,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready,
    GuildCreate {
        guild_id: GuildId,
        voice_states: Vec<VoiceStateUpdate>,
    },
    VoiceStateUpdate(VoiceStateUpdate),
    ChannelDelete {
        guild_id: Option<GuildId>,
        channel_id: ChannelId,
    },
    Other(String),
}

pub fn decode_line(line: &str) -> Result<GatewayEvent> {
    let v: serde_json::Value = serde_json::from_str(line)?;
    let name = v
        .get("t")
        .and_then(|t| t.as_str())
        .ok_or_else(|| Error::InvalidEvent("missing event name".to_string()))?;
    let d = v.get("d").unwrap_or(&serde_json::Value::Null);

    match name {
        "READY" => Ok(GatewayEvent::Ready),
        "GUILD_CREATE" => {
            let guild_id = GuildId(required_snowflake(d, "id")?);
            let voice_states = d
                .get("voice_states")
                .and_then(|s| s.as_array())
                .map(|states| {
                    states
                        .iter()
                        .filter_map(|s| {
                            Some(VoiceStateUpdate {
                                guild_id,
                                user_id: UserId(snowflake(s.get("user_id")?)?),
                                channel_id: s.get("channel_id").and_then(snowflake).map(ChannelId),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            Ok(GatewayEvent::GuildCreate {
                guild_id,
                voice_states,
            })
        }
        "VOICE_STATE_UPDATE" => {
            // DM calls have no guild; they never involve a hub.
            let Some(guild_id) = d.get("guild_id").and_then(snowflake) else {
                return Ok(GatewayEvent::Other(name.to_string()));
            };
            Ok(GatewayEvent::VoiceStateUpdate(VoiceStateUpdate {
                guild_id: GuildId(guild_id),
                user_id: UserId(required_snowflake(d, "user_id")?),
                channel_id: d.get("channel_id").and_then(snowflake).map(ChannelId),
            }))
        }
        "CHANNEL_DELETE" => Ok(GatewayEvent::ChannelDelete {
            guild_id: d.get("guild_id").and_then(snowflake).map(GuildId),
            channel_id: ChannelId(required_snowflake(d, "id")?),
        }),
        other => Ok(GatewayEvent::Other(other.to_string())),
    }
}

/// Snowflakes arrive as decimal strings; plain numbers are accepted too.
pub fn snowflake(v: &serde_json::Value) -> Option<u64> {
    match v {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn required_snowflake(d: &serde_json::Value, field: &str) -> Result<u64> {
    d.get(field)
        .and_then(snowflake)
        .ok_or_else(|| Error::InvalidEvent(format!("missing or invalid `{field}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_voice_state_update() {
        let ev = decode_line(
            r#"{"t":"VOICE_STATE_UPDATE","d":{"guild_id":"1","channel_id":"100","user_id":"7","self_mute":true}}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            GatewayEvent::VoiceStateUpdate(VoiceStateUpdate {
                guild_id: GuildId(1),
                user_id: UserId(7),
                channel_id: Some(ChannelId(100)),
            })
        );
    }

    #[test]
    fn disconnect_has_no_channel() {
        let ev = decode_line(
            r#"{"t":"VOICE_STATE_UPDATE","d":{"guild_id":"1","channel_id":null,"user_id":"7"}}"#,
        )
        .unwrap();
        let GatewayEvent::VoiceStateUpdate(u) = ev else {
            panic!("unexpected event");
        };
        assert_eq!(u.channel_id, None);
    }

    #[test]
    fn guild_create_collects_voice_states() {
        let ev = decode_line(
            r#"{"t":"GUILD_CREATE","d":{"id":"1","voice_states":[
                {"user_id":"7","channel_id":"100"},
                {"user_id":"bad","channel_id":"100"},
                {"user_id":"8","channel_id":"101"}
            ]}}"#,
        )
        .unwrap();
        let GatewayEvent::GuildCreate {
            guild_id,
            voice_states,
        } = ev
        else {
            panic!("unexpected event");
        };
        assert_eq!(guild_id, GuildId(1));
        assert_eq!(voice_states.len(), 2);
        assert_eq!(voice_states[1].channel_id, Some(ChannelId(101)));
    }

    #[test]
    fn channel_delete_and_ready() {
        assert_eq!(
            decode_line(r#"{"t":"CHANNEL_DELETE","d":{"id":"55","guild_id":"1","type":2}}"#).unwrap(),
            GatewayEvent::ChannelDelete {
                guild_id: Some(GuildId(1)),
                channel_id: ChannelId(55),
            }
        );
        assert_eq!(decode_line(r#"{"t":"READY","d":{}}"#).unwrap(), GatewayEvent::Ready);
    }

    #[test]
    fn unknown_and_malformed_lines() {
        assert_eq!(
            decode_line(r#"{"t":"TYPING_START","d":{}}"#).unwrap(),
            GatewayEvent::Other("TYPING_START".to_string())
        );
        assert!(decode_line("not json").is_err());
        assert!(decode_line(r#"{"d":{}}"#).is_err());
        assert!(decode_line(r#"{"t":"VOICE_STATE_UPDATE","d":{"guild_id":"1"}}"#).is_err());
    }
}
