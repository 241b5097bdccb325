use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_MAX_MESSAGES: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKey {
    Agent1,
    Agent2,
}

impl AgentKey {
    pub const ALL: [AgentKey; 2] = [AgentKey::Agent1, AgentKey::Agent2];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentKey::Agent1 => "agent1",
            AgentKey::Agent2 => "agent2",
        }
    }

    pub fn index(self) -> usize {
        match self {
            AgentKey::Agent1 => 0,
            AgentKey::Agent2 => 1,
        }
    }

    fn env_prefix(self) -> &'static str {
        match self {
            AgentKey::Agent1 => "AGENT_1",
            AgentKey::Agent2 => "AGENT_2",
        }
    }

    fn default_name(self) -> &'static str {
        match self {
            AgentKey::Agent1 => "小文",
            AgentKey::Agent2 => "小七",
        }
    }
}

impl fmt::Display for AgentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent1" => Ok(AgentKey::Agent1),
            "agent2" => Ok(AgentKey::Agent2),
            other => Err(SettingsError::UnknownAgent(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("unknown agent `{0}`")]
    UnknownAgent(String),
    #[error("{var}: invalid base url `{value}`: {reason}")]
    InvalidBaseUrl { var: String, value: String, reason: String },
    #[error("{var}: unknown auth scheme `{value}` (expected `x-api-key` or `bearer`)")]
    UnknownAuthScheme { var: String, value: String },
    #[error("{var}: unknown run mode `{value}` (expected `wait` or `background`)")]
    UnknownRunMode { var: String, value: String },
    #[error("{var}: `{value}` is not a number")]
    InvalidNumber { var: String, value: String },
}

/// How the credential travels to the remote agent API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthScheme {
    /// `X-API-Key: <key>`
    #[default]
    ApiKeyHeader,
    /// `Authorization: Bearer <key>`
    Bearer,
}

impl FromStr for AuthScheme {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "x-api-key" | "api-key" => Ok(AuthScheme::ApiKeyHeader),
            "bearer" => Ok(AuthScheme::Bearer),
            _ => Err(()),
        }
    }
}

/// Which run endpoint a message is posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunMode {
    /// `/threads/{id}/runs/wait`
    #[default]
    Wait,
    /// `/threads/{id}/runs`
    Background,
}

impl RunMode {
    pub fn path_segments(self) -> &'static [&'static str] {
        match self {
            RunMode::Wait => &["runs", "wait"],
            RunMode::Background => &["runs"],
        }
    }
}

impl FromStr for RunMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wait" => Ok(RunMode::Wait),
            "background" | "runs" => Ok(RunMode::Background),
            _ => Err(()),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct AgentSettings {
    pub api_key: String,
    pub base_url: Url,
    pub assistant_id: String,
    pub auth_scheme: AuthScheme,
    pub run_mode: RunMode,
}

// Keeps the credential out of logs.
impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url.as_str())
            .field("assistant_id", &self.assistant_id)
            .field("auth_scheme", &self.auth_scheme)
            .field("run_mode", &self.run_mode)
            .finish()
    }
}

/// Server-side credentials for every known agent, resolved once at start-up.
///
/// An agent whose credential, base url or assistant id is missing is simply
/// absent from the map; the relay answers 404 for it. Values that are present
/// but malformed are a start-up error.
#[derive(Debug, Clone, Default)]
pub struct RelaySettings {
    agents: HashMap<AgentKey, AgentSettings>,
}

impl RelaySettings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut agents = HashMap::new();
        for key in AgentKey::ALL {
            match load_agent(key, &lookup)? {
                Some(settings) => {
                    tracing::info!(agent = %key, base_url = %settings.base_url, "agent configured");
                    agents.insert(key, settings);
                }
                None => tracing::warn!(agent = %key, "agent configuration incomplete; relay disabled for it"),
            }
        }
        Ok(Self { agents })
    }

    pub fn with_agent(mut self, key: AgentKey, settings: AgentSettings) -> Self {
        self.agents.insert(key, settings);
        self
    }

    pub fn agent(&self, key: AgentKey) -> Option<&AgentSettings> {
        self.agents.get(&key)
    }

    pub fn configured(&self) -> impl Iterator<Item = AgentKey> + '_ {
        AgentKey::ALL.into_iter().filter(|k| self.agents.contains_key(k))
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn load_agent<F>(key: AgentKey, lookup: &F) -> Result<Option<AgentSettings>, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let prefix = key.env_prefix();
    let var = |suffix: &str| format!("{prefix}_{suffix}");

    let auth_scheme = match non_empty(lookup, &var("AUTH_SCHEME")) {
        Some(value) => value
            .parse::<AuthScheme>()
            .map_err(|_| SettingsError::UnknownAuthScheme { var: var("AUTH_SCHEME"), value })?,
        None => AuthScheme::default(),
    };
    let run_mode = match non_empty(lookup, &var("RUN_MODE")) {
        Some(value) => value
            .parse::<RunMode>()
            .map_err(|_| SettingsError::UnknownRunMode { var: var("RUN_MODE"), value })?,
        None => RunMode::default(),
    };

    let base_url = match non_empty(lookup, &var("BASE_URL")) {
        Some(value) => Some(parse_base_url(&var("BASE_URL"), &value)?),
        None => None,
    };
    let api_key = non_empty(lookup, &var("API_KEY"));
    let assistant_id = non_empty(lookup, &var("ID"));

    let (Some(api_key), Some(base_url), Some(assistant_id)) = (api_key, base_url, assistant_id) else {
        return Ok(None);
    };
    Ok(Some(AgentSettings { api_key, base_url, assistant_id, auth_scheme, run_mode }))
}

fn parse_base_url(var: &str, value: &str) -> Result<Url, SettingsError> {
    let invalid = |reason: String| SettingsError::InvalidBaseUrl {
        var: var.to_string(),
        value: value.to_string(),
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("expected an http(s) base url".into()));
    }
    Ok(url)
}

/// Non-sensitive defaults for the dashboard panels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardDefaults {
    pub agent1_name: String,
    pub agent2_name: String,
    pub max_messages: usize,
}

impl Default for DashboardDefaults {
    fn default() -> Self {
        Self {
            agent1_name: AgentKey::Agent1.default_name().into(),
            agent2_name: AgentKey::Agent2.default_name().into(),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

impl DashboardDefaults {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let max_messages = match non_empty(&lookup, "MAX_MESSAGES") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| SettingsError::InvalidNumber { var: "MAX_MESSAGES".into(), value })?,
            None => defaults.max_messages,
        };
        Ok(Self {
            agent1_name: non_empty(&lookup, "AGENT_1_NAME").unwrap_or(defaults.agent1_name),
            agent2_name: non_empty(&lookup, "AGENT_2_NAME").unwrap_or(defaults.agent2_name),
            max_messages,
        })
    }

    pub fn name_for(&self, key: AgentKey) -> &str {
        match key {
            AgentKey::Agent1 => &self.agent1_name,
            AgentKey::Agent2 => &self.agent2_name,
        }
    }
}
