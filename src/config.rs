use anyhow::{bail, Context, Result};
use serde::{de::Error as _, Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use teloxide::types::ChatId;

/// Chat and user identifiers may be written either as integers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(i64),
    Text(String),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Int(id) => id.to_string(),
            RawId::Text(text) => text.trim().to_string(),
        }
    }
}

fn deserialize_chat_id<'de, D>(deserializer: D) -> std::result::Result<ChatId, D::Error>
where
    D: Deserializer<'de>,
{
    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(ChatId(id)),
        RawId::Text(text) => text
            .trim()
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| D::Error::custom(format!("invalid chat id: {:?}", text))),
    }
}

fn deserialize_ids<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<RawId>::deserialize(deserializer)?;
    Ok(raw.into_iter().map(RawId::into_string).collect())
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// User ids and chat ids share one list; both are compared as strings.
    #[serde(deserialize_with = "deserialize_ids")]
    pub allowed_ids: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(deserialize_with = "deserialize_chat_id")]
    pub source_chat_id: ChatId,
    #[serde(deserialize_with = "deserialize_chat_id")]
    pub destination_chat_id: ChatId,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessagesConfig {
    #[serde(default = "default_start_message")]
    pub start: String,
    #[serde(default = "default_alive_message")]
    pub alive: String,
    #[serde(default = "default_no_errors_message")]
    pub no_errors: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            start: default_start_message(),
            alive: default_alive_message(),
            no_errors: default_no_errors_message(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiagnosticsConfig {
    /// Keep only the newest N entries. Unbounded when absent.
    #[serde(default)]
    pub max_entries: Option<usize>,
}

fn default_start_message() -> String {
    "Hello. This bot copies posts from its source channel into a dedicated chat \
     and does not work in other chats or channels."
        .to_string()
}

fn default_alive_message() -> String {
    "Relax, I'm alive".to_string()
}

fn default_no_errors_message() -> String {
    "No errors or warnings were recorded during this session".to_string()
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

/// Flat JSON layout used by the first deployments of the relay.
#[derive(Deserialize)]
struct LegacyConfig {
    #[serde(rename = "TOKEN")]
    token: String,
    #[serde(rename = "SOURCE_CHAT_ID", deserialize_with = "deserialize_chat_id")]
    source_chat_id: ChatId,
    #[serde(rename = "DESTINATION_CHAT_ID", deserialize_with = "deserialize_chat_id")]
    destination_chat_id: ChatId,
    #[serde(rename = "ALLOWED_USER_IDS", deserialize_with = "deserialize_ids")]
    allowed_user_ids: Vec<String>,
}

impl From<LegacyConfig> for Config {
    fn from(legacy: LegacyConfig) -> Self {
        Config {
            telegram: TelegramConfig {
                bot_token: legacy.token,
                allowed_ids: legacy.allowed_user_ids,
            },
            relay: RelayConfig {
                source_chat_id: legacy.source_chat_id,
                destination_chat_id: legacy.destination_chat_id,
            },
            messages: MessagesConfig::default(),
            logging: LoggingConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config = if is_json {
            Self::from_legacy_json(&content)?
        } else {
            Self::from_toml(&content)?
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML config")
    }

    pub fn from_legacy_json(content: &str) -> Result<Self> {
        let legacy: LegacyConfig =
            serde_json::from_str(content).context("Failed to parse legacy JSON config")?;
        Ok(legacy.into())
    }

    /// Reject configurations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("telegram.bot_token must not be empty");
        }
        if self.telegram.allowed_ids.is_empty() {
            bail!("telegram.allowed_ids must list at least one identifier");
        }
        if self.telegram.allowed_ids.iter().any(|id| id.is_empty()) {
            bail!("telegram.allowed_ids must not contain blank identifiers");
        }
        if self.relay.source_chat_id.0 == 0 {
            bail!("relay.source_chat_id must be set");
        }
        if self.relay.destination_chat_id.0 == 0 {
            bail!("relay.destination_chat_id must be set");
        }
        // A copy into the source channel is itself a new channel post.
        if self.relay.source_chat_id == self.relay.destination_chat_id {
            bail!("relay.source_chat_id and relay.destination_chat_id must differ");
        }
        // Telegram rejects empty message text.
        for (name, text) in [
            ("start", &self.messages.start),
            ("alive", &self.messages.alive),
            ("no_errors", &self.messages.no_errors),
        ] {
            if text.trim().is_empty() {
                bail!("messages.{} must not be blank", name);
            }
        }
        if self.diagnostics.max_entries == Some(0) {
            bail!("diagnostics.max_entries must be greater than zero when set");
        }
        Ok(())
    }
}
