use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config directory not found")]
    ConfigDirNotFound,

    #[error(
        "settings file not found. Looked in:\n\
        - current directory: converge.local.yaml, .converge.local.yaml, converge.yaml, .converge.yaml\n\
        - ./.converge/ directory\n\
        - ~/.config/converge/converge.yaml\n\
        or point CONVERGE_CONFIG_PATH at it directly"
    )]
    ConfigFileNotFound,

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value '{value}' for {name}")]
    InvalidEnv { name: String, value: String },

    #[error("invalid setting '{field}': {message}")]
    Invalid { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
