use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GroveError>;

#[derive(Error, Debug)]
pub enum GroveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Snapshot at {path} is unusable: {reason}")]
    Snapshot { path: PathBuf, reason: String },
}
