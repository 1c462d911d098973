use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration parse failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration load failed: {0}")]
    Load(String),

    #[error("Configuration invalid: {0}")]
    Invalid(String),
}

impl From<ConfigError> for super::ProxyError {
    fn from(err: ConfigError) -> Self {
        let message = err.to_string();
        Self::config_with_source(message, err)
    }
}
