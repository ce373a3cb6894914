use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Looked in:\n\
        - current directory: cloudsettle.local.yaml, .cloudsettle.local.yaml, cloudsettle.yaml, .cloudsettle.yaml\n\
        - ./.cloudsettle/ directory\n\
        - ~/.config/cloudsettle/cloudsettle.yaml\n\
        Set CLOUDSETTLE_CONFIG_PATH to point at a file directly"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid wait profile '{profile}': {reason}")]
    InvalidProfile { profile: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
