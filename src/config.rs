use std::path::{Path, PathBuf};

use tracing::info;

use crate::{Error, Result};

/// Wiki-style `[[target|display]]`.
pub const WIKI_LINK_PATTERN: &str = r"\[\[([^\[\]\n]+?)\]\]";
/// Dokuwiki-style `{{target|display}}`.
pub const DOKU_LINK_PATTERN: &str = r"\{\{([^{}\n]+?)\}\}";

/// Config file location, relative to the wiki root.
pub const CONFIG_FILE: &str = ".notegraph/config.toml";

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct WikiConfig {
    /// Directory names to ignore anywhere in the path.
    pub ignore_dirs: Vec<String>,
    /// File extension (without dot) that marks a note.
    pub note_extension: String,
    /// Link-syntax regexes; the first capture group is the raw link text.
    pub link_patterns: Vec<String>,
    /// Longest accepted link target, in characters.
    pub max_link_len: usize,
    /// Sidecar metadata directory (relative to wiki root).
    pub metadata_dir: PathBuf,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            ignore_dirs: vec![".git".into(), ".notegraph".into(), ".trash".into()],
            note_extension: "md".into(),
            link_patterns: vec![WIKI_LINK_PATTERN.into(), DOKU_LINK_PATTERN.into()],
            max_link_len: 100,
            metadata_dir: PathBuf::from(".notegraph/meta"),
        }
    }
}

impl WikiConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::ConfigToml(e.to_string()))
    }

    /// Loads `.notegraph/config.toml` under `root`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let cfg = Self::from_toml_str(&text)?;
                info!(path = %path.display(), "config loaded");
                Ok(cfg)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config not found; using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(Error::io(&path, err)),
        }
    }
}
