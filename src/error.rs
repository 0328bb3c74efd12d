// Kometa-AI error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KaiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("rubric directory unreadable: {0}")]
    RubricDirUnreadable(String),

    #[error("state corrupt and no usable backup: {0}")]
    StateCorrupt(String),

    #[error("state directory not writable: {0}")]
    StateDirUnwritable(String),

    #[error("another run holds the state lock at {0}")]
    StateLocked(String),

    #[error("oracle request failed: {0}")]
    Oracle(String),

    #[error("oracle reply could not be parsed: {0}")]
    OracleParse(String),

    #[error("oracle authentication failed: {0}")]
    OracleAuth(String),

    #[error("catalog request failed: {0}")]
    Catalog(String),

    #[error("label ownership violation: refused to touch label {0:?} outside the owned prefix")]
    LabelOwnership(String),

    #[error("smtp delivery failed: {0}")]
    Smtp(String),

    #[error("rubric parse error in {file}: {message}")]
    RubricParse { file: String, message: String },

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for KaiError {
    fn from(err: anyhow::Error) -> Self {
        KaiError::Other(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KaiError>;
