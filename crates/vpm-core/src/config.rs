use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    controller::ControllerConfig,
    domain::{ChannelId, GuildId},
    errors::Error,
    names::NameSupplierConfig,
    ports::HubDirectory,
    Result,
};

/// Typed configuration for the pool manager, read from the environment.
#[derive(Clone, Debug)]
pub struct Config {
    // Platform
    pub discord_bot_token: String,
    pub discord_api_base: String,
    pub platform_timeout: Duration,

    // Hubs: guild -> hub channel
    pub hubs: BTreeMap<GuildId, ChannelId>,

    // Persistence
    pub state_dir: PathBuf,

    // Channel naming
    pub channel_prefix: String,
    pub wordlist_url: String,
    pub name_batch_size: usize,
    pub name_low_water: usize,
    pub name_fetch_timeout: Duration,

    // Behavior flags
    pub move_on_join: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let discord_bot_token = env_str("DISCORD_BOT_TOKEN").unwrap_or_default();
        if discord_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let hubs = parse_hubs(&env_str("VPM_HUBS").unwrap_or_default())?;
        if hubs.is_empty() {
            return Err(Error::Config(
                "VPM_HUBS environment variable is required (guild_id:channel_id,...)".to_string(),
            ));
        }

        let discord_api_base = env_str("DISCORD_API_BASE")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://discord.com/api/v10".to_string());
        let platform_timeout =
            Duration::from_millis(env_u64("PLATFORM_TIMEOUT_MS").unwrap_or(10_000));

        let state_dir =
            PathBuf::from(env_str("VPM_STATE_DIR").unwrap_or("/tmp/vpm-state".to_string()));
        fs::create_dir_all(&state_dir)?;

        let defaults = NameSupplierConfig::default();
        let channel_prefix = env_str("VPM_CHANNEL_PREFIX")
            .and_then(non_empty)
            .unwrap_or_else(|| "Voice".to_string());
        let wordlist_url = env_str("WORDLIST_URL")
            .and_then(non_empty)
            .unwrap_or_else(|| "https://random-word-api.vercel.app/api".to_string());
        let name_batch_size = env_usize("NAME_BATCH_SIZE")
            .unwrap_or(defaults.batch_size)
            .max(1);
        let name_low_water = env_usize("NAME_LOW_WATER").unwrap_or(defaults.low_water);
        let name_fetch_timeout = env_u64("NAME_FETCH_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.fetch_timeout);

        let move_on_join = env_bool("VPM_MOVE_ON_JOIN").unwrap_or(false);

        Ok(Self {
            discord_bot_token,
            discord_api_base,
            platform_timeout,
            hubs,
            state_dir,
            channel_prefix,
            wordlist_url,
            name_batch_size,
            name_low_water,
            name_fetch_timeout,
            move_on_join,
        })
    }

    pub fn controller(&self) -> ControllerConfig {
        ControllerConfig {
            channel_prefix: self.channel_prefix.clone(),
            move_on_join: self.move_on_join,
        }
    }

    pub fn names(&self) -> NameSupplierConfig {
        NameSupplierConfig {
            batch_size: self.name_batch_size,
            low_water: self.name_low_water,
            fetch_timeout: self.name_fetch_timeout,
        }
    }

    pub fn hub_directory(&self) -> StaticHubDirectory {
        StaticHubDirectory::new(self.hubs.clone())
    }
}

/// Hub configuration fixed at startup.
#[derive(Clone, Debug, Default)]
pub struct StaticHubDirectory {
    hubs: BTreeMap<GuildId, ChannelId>,
}

impl StaticHubDirectory {
    pub fn new(hubs: BTreeMap<GuildId, ChannelId>) -> Self {
        Self { hubs }
    }
}

impl HubDirectory for StaticHubDirectory {
    fn hub_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.hubs.get(&guild_id).copied()
    }

    fn guilds(&self) -> Vec<GuildId> {
        self.hubs.keys().copied().collect()
    }
}

/// Parse `guild:channel,guild:channel`.
pub fn parse_hubs(raw: &str) -> Result<BTreeMap<GuildId, ChannelId>> {
    let mut hubs = BTreeMap::new();
    for pair in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parsed = pair
            .split_once(':')
            .and_then(|(g, c)| Some((g.trim().parse::<u64>().ok()?, c.trim().parse::<u64>().ok()?)));
        let Some((guild, channel)) = parsed else {
            return Err(Error::Config(format!("invalid hub entry: {pair:?}")));
        };
        if hubs.insert(GuildId(guild), ChannelId(channel)).is_some() {
            return Err(Error::Config(format!("duplicate hub for guild {guild}")));
        }
    }
    Ok(hubs)
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hub_pairs() {
        let hubs = parse_hubs(" 1:100, 2:200 ,").unwrap();
        assert_eq!(hubs.len(), 2);
        assert_eq!(hubs.get(&GuildId(2)), Some(&ChannelId(200)));

        let dir = StaticHubDirectory::new(hubs);
        assert_eq!(dir.hub_channel(GuildId(1)), Some(ChannelId(100)));
        assert_eq!(dir.hub_channel(GuildId(3)), None);
        assert_eq!(dir.guilds(), vec![GuildId(1), GuildId(2)]);
    }

    #[test]
    fn rejects_bad_hub_entries() {
        assert!(parse_hubs("1-100").is_err());
        assert!(parse_hubs("x:100").is_err());
        assert!(parse_hubs("1:100,1:101").is_err());
        assert!(parse_hubs("").unwrap().is_empty());
    }
}
