use std::path::PathBuf;

use crate::NotePath;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("wiki root does not exist: {0}")]
    WikiNotFound(PathBuf),

    #[error("invalid note path: {0}")]
    InvalidNotePath(String),

    #[error("path is outside wiki: {0}")]
    PathOutsideWiki(PathBuf),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("metadata yaml error: {0}")]
    MetadataYaml(#[from] serde_yaml::Error),

    #[error("config toml parse error: {0}")]
    ConfigToml(String),

    #[error("invalid filter criterion (expected field:operator:value): {0}")]
    InvalidCriterion(String),

    #[error("no metadata record for {0}")]
    RecordNotFound(NotePath),

    #[error("background task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
