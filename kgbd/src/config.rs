//! Daemon configuration: YAML schema, validation and derived indexes.

use crate::colors::ColorScheme;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

fn default_rpc_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_rpc_port() -> u16 {
    5391
}

fn default_service_name() -> String {
    "KGB".to_string()
}

fn default_queue_limit() -> usize {
    150
}

fn default_min_protocol_ver() -> u32 {
    1
}

fn default_port() -> u16 {
    6667
}

fn default_nick() -> String {
    "KGB".to_string()
}

fn default_username() -> String {
    "kgb".to_string()
}

fn default_ircname() -> String {
    "KGB bot".to_string()
}

/// One repository known to the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepoConfig {
    /// Empty password disables authentication for this repository.
    #[serde(default)]
    pub password: String,
}

/// One IRC network to keep a session on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    pub server: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_ircname")]
    pub ircname: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub nickserv_password: Option<String>,
}

impl NetworkConfig {
    /// True when a change requires tearing the session down and
    /// reconnecting; channel membership alone reconciles in place.
    pub fn identity_changed(&self, other: &NetworkConfig) -> bool {
        self != other
    }
}

/// One channel the bot sits on.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub repos: Vec<String>,
    /// Channel-scoped smart answers, overriding the global list.
    #[serde(default)]
    pub smart_answers: Option<Vec<String>>,
    #[serde(default)]
    pub smart_answers_polygen: bool,
}

/// Whole daemon configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_rpc_addr")]
    pub rpc_addr: String,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
    #[serde(default = "default_min_protocol_ver")]
    pub min_protocol_ver: u32,
    /// `nick!user@host` globs allowed to run bot commands.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub colors: ColorScheme,
    #[serde(default)]
    pub smart_answers: Vec<String>,
    #[serde(default)]
    pub repositories: HashMap<String, RepoConfig>,
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    /// Derived at load: repository id → channel names.
    #[serde(skip)]
    repo_channels: HashMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("channel {channel} references unknown network {network:?}")]
    UnknownNetwork { channel: String, network: String },
    #[error("channel {channel} references unknown repository {repo:?}")]
    UnknownRepo { channel: String, repo: String },
    #[error("duplicate channel {0:?}")]
    DuplicateChannel(String),
}

/// Load a config file and build the derived indexes.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let display = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: display.clone(),
        source,
    })?;
    let mut config: Config =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
    config.finish()?;
    Ok(config)
}

impl Config {
    /// Validate cross-references and populate the reverse index.
    pub fn finish(&mut self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name.clone()) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }
            if !self.networks.contains_key(&channel.network) {
                return Err(ConfigError::UnknownNetwork {
                    channel: channel.name.clone(),
                    network: channel.network.clone(),
                });
            }
            for repo in &channel.repos {
                if !self.repositories.contains_key(repo) {
                    return Err(ConfigError::UnknownRepo {
                        channel: channel.name.clone(),
                        repo: repo.clone(),
                    });
                }
            }
        }

        let mut index: HashMap<String, Vec<String>> = HashMap::new();
        for channel in &self.channels {
            for repo in &channel.repos {
                index
                    .entry(repo.clone())
                    .or_default()
                    .push(channel.name.clone());
            }
        }
        self.repo_channels = index;
        Ok(())
    }

    /// Channel lookup by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// All channels configured on a network.
    pub fn channels_on(&self, network: &str) -> Vec<&ChannelConfig> {
        self.channels.iter().filter(|c| c.network == network).collect()
    }

    /// Channels a repository announces to (empty for unknown repos).
    pub fn channels_for_repo(&self, repo: &str) -> &[String] {
        self.repo_channels
            .get(repo)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True when the reload needs the restart path instead of a live swap.
    pub fn rpc_bind_changed(&self, other: &Config) -> bool {
        self.rpc_addr != other.rpc_addr
            || self.rpc_port != other.rpc_port
            || self.service_name != other.service_name
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = "\
rpc_addr: 127.0.0.1
rpc_port: 5391
queue_limit: 150
admins:
- 'alice!*@*.example.net'
repositories:
  test:
    password: 'v,sjflir'
  open:
    password: ''
networks:
  oftc:
    server: irc.example.net
  second:
    server: irc2.example.net
    port: 6697
    nick: KGB2
channels:
- name: '#commits'
  network: oftc
  repos: [test, open]
- name: '#elsewhere'
  network: second
  repos: [test]
  smart_answers: ['da, tovarish']
";

    fn parse(text: &str) -> Result<Config, ConfigError> {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        load(f.path())
    }

    #[test]
    fn sample_config_loads_with_defaults() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.service_name, "KGB");
        assert_eq!(config.min_protocol_ver, 1);

        let oftc = &config.networks["oftc"];
        assert_eq!(oftc.port, 6667);
        assert_eq!(oftc.nick, "KGB");
        assert_eq!(oftc.username, "kgb");
        assert_eq!(oftc.ircname, "KGB bot");

        assert_eq!(config.networks["second"].port, 6697);
    }

    #[test]
    fn reverse_index_maps_repos_to_channels() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.channels_for_repo("test"), ["#commits", "#elsewhere"]);
        assert_eq!(config.channels_for_repo("open"), ["#commits"]);
        assert!(config.channels_for_repo("missing").is_empty());
    }

    #[test]
    fn channel_lookup_by_name() {
        let config = parse(SAMPLE).unwrap();
        assert!(config.channel("#commits").is_some());
        assert!(config.channel("#nope").is_none());
        assert_eq!(config.channels_on("oftc").len(), 1);
    }

    #[test]
    fn unknown_network_is_rejected() {
        let broken = SAMPLE.replace("network: oftc", "network: nowhere");
        assert!(matches!(
            parse(&broken),
            Err(ConfigError::UnknownNetwork { .. })
        ));
    }

    #[test]
    fn unknown_repo_is_rejected() {
        let broken = SAMPLE.replace("repos: [test, open]", "repos: [ghost]");
        assert!(matches!(parse(&broken), Err(ConfigError::UnknownRepo { .. })));
    }

    #[test]
    fn rpc_bind_change_detection() {
        let a = parse(SAMPLE).unwrap();
        let mut b = a.clone();
        assert!(!a.rpc_bind_changed(&b));
        b.rpc_port = 9999;
        assert!(a.rpc_bind_changed(&b));

        let mut c = a.clone();
        c.service_name = "TASS".to_string();
        assert!(a.rpc_bind_changed(&c));
    }

    #[test]
    fn identity_changed_spots_connection_relevant_edits() {
        let config = parse(SAMPLE).unwrap();
        let base = config.networks["oftc"].clone();
        let mut changed = base.clone();
        changed.nick = "KGB3".to_string();
        assert!(base.identity_changed(&changed));
        assert!(!base.identity_changed(&base.clone()));
    }
}
