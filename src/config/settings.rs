use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Default endpoint of the group chat server
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8000";

/// Quiescence window after which a trailing `stop_typing` is sent
pub const DEFAULT_TYPING_DEBOUNCE_MS: u64 = 2000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub connector: ConnectorSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectorSettings {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    pub group_id: String,
    pub user_id: String,
    /// Debounce window for `handle_typing` in milliseconds
    #[serde(default = "default_typing_debounce_ms")]
    pub typing_debounce_ms: u64,
    /// Forward malformed inbound frames to the `error` lifecycle handler
    #[serde(default)]
    pub report_parse_errors: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter directive when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_typing_debounce_ms() -> u64 {
    DEFAULT_TYPING_DEBOUNCE_MS
}

fn default_log_level() -> String {
    "info".to_string()
}

/// In-process configuration of a single `ChatConnector`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorConfig {
    pub group_id: String,
    pub user_id: String,
    pub server_url: String,
    pub typing_debounce: Duration,
    pub report_parse_errors: bool,
}

impl ConnectorConfig {
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
            server_url: default_server_url(),
            typing_debounce: Duration::from_millis(DEFAULT_TYPING_DEBOUNCE_MS),
            report_parse_errors: false,
        }
    }

    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    pub fn with_typing_debounce(mut self, window: Duration) -> Self {
        self.typing_debounce = window;
        self
    }

    pub fn with_report_parse_errors(mut self, enabled: bool) -> Self {
        self.report_parse_errors = enabled;
        self
    }

    /// Endpoint for this group: `{server_url}/ws/chat/{group_id}`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/ws/chat/{}",
            self.server_url.trim_end_matches('/'),
            self.group_id
        )
    }
}

impl From<&ConnectorSettings> for ConnectorConfig {
    fn from(settings: &ConnectorSettings) -> Self {
        ConnectorConfig::new(settings.group_id.clone(), settings.user_id.clone())
            .with_server_url(settings.server_url.clone())
            .with_typing_debounce(Duration::from_millis(settings.typing_debounce_ms))
            .with_report_parse_errors(settings.report_parse_errors)
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("connector.server_url", DEFAULT_SERVER_URL)?
            .set_default("connector.typing_debounce_ms", DEFAULT_TYPING_DEBOUNCE_MS)?
            .set_default("connector.report_parse_errors", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // CHAT_CONNECTOR__GROUP_ID, CHAT_LOGGING__FORMAT, etc.
            .add_source(
                Environment::with_prefix("CHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn connector_config(&self) -> ConnectorConfig {
        ConnectorConfig::from(&self.connector)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
