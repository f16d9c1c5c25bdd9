use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result, WikiConfig};

/// Relative, forward-slash separated note path; the primary key of a record.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct NotePath(String);

impl NotePath {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Directory components, outermost first.
    pub fn folders(&self) -> Vec<String> {
        let mut parts: Vec<String> = self.0.split('/').map(str::to_string).collect();
        parts.pop();
        parts
    }
}

impl fmt::Display for NotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&Path> for NotePath {
    type Error = Error;

    fn try_from(value: &Path) -> Result<Self> {
        if value.as_os_str().is_empty() {
            return Err(Error::InvalidNotePath("empty path".into()));
        }
        if value.is_absolute() {
            return Err(Error::InvalidNotePath(
                "absolute paths are not allowed".into(),
            ));
        }

        let mut parts: Vec<String> = Vec::new();
        for c in value.components() {
            match c {
                Component::Prefix(_) | Component::RootDir => {
                    return Err(Error::InvalidNotePath(
                        "absolute paths are not allowed".into(),
                    ));
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(Error::InvalidNotePath(
                        "path traversal is not allowed".into(),
                    ));
                }
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            }
        }

        if parts.is_empty() {
            return Err(Error::InvalidNotePath("empty path".into()));
        }

        Ok(Self(parts.join("/")))
    }
}

impl TryFrom<&str> for NotePath {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::try_from(Path::new(value.trim()))
    }
}

impl TryFrom<String> for NotePath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::try_from(value.as_str())
    }
}

impl From<NotePath> for String {
    fn from(value: NotePath) -> Self {
        value.0
    }
}

/// A wiki directory on disk plus its configuration.
#[derive(Debug, Clone)]
pub struct Wiki {
    root: PathBuf,
    cfg: WikiConfig,
}

impl Wiki {
    /// Opens `root`, reading `.notegraph/config.toml` if present.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::WikiNotFound(root));
        }
        let cfg = WikiConfig::load(&root)?;
        Self::with_config(root, cfg)
    }

    pub fn with_config(root: impl Into<PathBuf>, cfg: WikiConfig) -> Result<Self> {
        let root = root.into();
        if !root.exists() {
            return Err(Error::WikiNotFound(root));
        }
        let root = std::fs::canonicalize(&root).map_err(|e| Error::io(&root, e))?;
        Ok(Self { root, cfg })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &WikiConfig {
        &self.cfg
    }

    pub fn to_abs(&self, rel: &NotePath) -> PathBuf {
        self.root.join(rel.as_path())
    }

    pub fn sidecar_path(&self, rel: &NotePath) -> PathBuf {
        self.root
            .join(&self.cfg.metadata_dir)
            .join(format!("{}.yaml", rel.as_str()))
    }

    pub fn to_rel(&self, abs: &Path) -> Result<NotePath> {
        let abs = if abs.is_absolute() {
            abs.to_path_buf()
        } else {
            self.root.join(abs)
        };

        let abs = std::fs::canonicalize(&abs).unwrap_or(abs);
        if !abs.starts_with(&self.root) {
            return Err(Error::PathOutsideWiki(abs));
        }
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| Error::PathOutsideWiki(abs.clone()))?;
        NotePath::try_from(rel)
    }

    pub fn is_ignored_rel(&self, rel: &Path) -> bool {
        rel.components().any(|c| {
            let Component::Normal(part) = c else {
                return false;
            };
            let s = part.to_string_lossy();
            self.cfg.ignore_dirs.iter().any(|d| d == &s)
        })
    }

    /// True for non-ignored, non-hidden files carrying the note extension.
    pub fn is_note_rel(&self, rel: &Path) -> bool {
        if self.is_ignored_rel(rel) {
            return false;
        }
        let file_name = rel.file_name().and_then(|s| s.to_str()).unwrap_or("");
        if file_name.is_empty() || file_name.starts_with('.') {
            return false;
        }
        rel.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.cfg.note_extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_paths_are_normalized_and_validated() {
        let p = NotePath::try_from("./notes/plan.md").unwrap();
        assert_eq!(p.as_str(), "notes/plan.md");
        assert_eq!(p.folders(), vec!["notes".to_string()]);

        assert!(NotePath::try_from("../escape.md").is_err());
        assert!(NotePath::try_from("/abs.md").is_err());
        assert!(NotePath::try_from("  ").is_err());
    }

    #[test]
    fn notes_are_filtered_by_extension_and_ignore_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let wiki = Wiki::with_config(dir.path(), WikiConfig::default()).unwrap();
        assert!(wiki.is_note_rel(Path::new("a/b.md")));
        assert!(wiki.is_note_rel(Path::new("a/B.MD")));
        assert!(!wiki.is_note_rel(Path::new("a/b.png")));
        assert!(!wiki.is_note_rel(Path::new(".git/x.md")));
        assert!(!wiki.is_note_rel(Path::new("a/.hidden.md")));
    }
}
