mod settings;

pub use settings::{
    ConnectorConfig, ConnectorSettings, LogFormat, LoggingConfig, Settings, DEFAULT_SERVER_URL,
    DEFAULT_TYPING_DEBOUNCE_MS,
};
