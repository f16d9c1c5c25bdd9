use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::record::DerivedLinks;
use crate::{Error, Metadata, MetadataPatch, NotePath, Result, Wiki};

/// All readable records plus the paths whose stored metadata was damaged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusSnapshot {
    pub records: Vec<Metadata>,
    /// Records that could not be loaded as stored. They appear in `records`
    /// as freshly initialized records when the note itself is still readable.
    pub damaged: Vec<NotePath>,
}

/// Per-path record storage plus raw note content.
///
/// `save_record` has merge semantics: only the fields set on the patch change.
/// Derived link fields are written exclusively through `replace_derived` and
/// `replace_derived_all`.
pub trait MetadataStore {
    /// Full corpus, in a stable order.
    fn all_records(&self) -> Result<Vec<Metadata>>;

    /// Like `all_records`, but also names the records that had to be recovered.
    fn snapshot(&self) -> Result<CorpusSnapshot> {
        Ok(CorpusSnapshot {
            records: self.all_records()?,
            damaged: Vec::new(),
        })
    }

    fn record(&self, path: &NotePath) -> Result<Option<Metadata>>;

    /// Raw note text.
    fn content(&self, path: &NotePath) -> Result<String>;

    /// Merges `patch` into the stored record and returns the result.
    fn save_record(&mut self, patch: MetadataPatch) -> Result<Metadata>;

    /// Creates the record for a newly written note; returns the existing one if present.
    fn initialize(&mut self, path: &NotePath) -> Result<Metadata>;

    fn replace_derived(&mut self, path: &NotePath, derived: DerivedLinks) -> Result<()>;

    /// Replaces derived links for every path, or for none of them.
    ///
    /// The default applies updates one at a time and restores the previous
    /// values if any update fails.
    fn replace_derived_all(&mut self, updates: Vec<(NotePath, DerivedLinks)>) -> Result<()> {
        let mut applied: Vec<(NotePath, DerivedLinks)> = Vec::with_capacity(updates.len());
        for (path, derived) in updates {
            match swap_derived(self, &path, derived) {
                Ok(previous) => applied.push((path, previous)),
                Err(err) => {
                    for (p, previous) in applied.into_iter().rev() {
                        if let Err(undo) = self.replace_derived(&p, previous) {
                            warn!(path = %p, error = %undo, "failed to restore derived links");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

fn swap_derived<S: MetadataStore + ?Sized>(
    store: &mut S,
    path: &NotePath,
    derived: DerivedLinks,
) -> Result<DerivedLinks> {
    let Some(previous) = store.record(path)? else {
        return Err(Error::RecordNotFound(path.clone()));
    };
    store.replace_derived(path, derived)?;
    Ok(previous.derived)
}

fn patch_path(patch: &MetadataPatch) -> Result<NotePath> {
    patch
        .path
        .clone()
        .ok_or_else(|| Error::InvalidNotePath("metadata patch without a path".into()))
}

/// In-process store, ordered by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: BTreeMap<NotePath, Metadata>,
    contents: HashMap<NotePath, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes note content and initializes its record if it has none yet.
    pub fn write_note(&mut self, path: NotePath, content: impl Into<String>) -> &mut Metadata {
        let content = content.into();
        let size = content.len() as u64;
        self.contents.insert(path.clone(), content);
        self.records
            .entry(path.clone())
            .or_insert_with(|| Metadata::new(path, size, Utc::now()))
    }

    pub fn insert_record(&mut self, record: Metadata) {
        self.records.insert(record.path.clone(), record);
    }

    pub fn remove(&mut self, path: &NotePath) -> Option<Metadata> {
        self.contents.remove(path);
        self.records.remove(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl MetadataStore for MemoryStore {
    fn all_records(&self) -> Result<Vec<Metadata>> {
        Ok(self.records.values().cloned().collect())
    }

    fn record(&self, path: &NotePath) -> Result<Option<Metadata>> {
        Ok(self.records.get(path).cloned())
    }

    fn content(&self, path: &NotePath) -> Result<String> {
        self.contents.get(path).cloned().ok_or_else(|| {
            Error::io(
                path.as_path(),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no content stored"),
            )
        })
    }

    fn save_record(&mut self, patch: MetadataPatch) -> Result<Metadata> {
        let path = patch_path(&patch)?;
        let Some(rec) = self.records.get_mut(&path) else {
            return Err(Error::RecordNotFound(path));
        };
        rec.apply(patch);
        Ok(rec.clone())
    }

    fn initialize(&mut self, path: &NotePath) -> Result<Metadata> {
        let size = self.contents.get(path).map(|c| c.len() as u64).unwrap_or(0);
        Ok(self
            .records
            .entry(path.clone())
            .or_insert_with(|| Metadata::new(path.clone(), size, Utc::now()))
            .clone())
    }

    fn replace_derived(&mut self, path: &NotePath, derived: DerivedLinks) -> Result<()> {
        let Some(rec) = self.records.get_mut(path) else {
            return Err(Error::RecordNotFound(path.clone()));
        };
        rec.derived = derived;
        Ok(())
    }
}

/// Notes are files under the wiki root; metadata lives in YAML sidecars
/// under the configured metadata directory. A note without a sidecar has an
/// implicit initial record until something saves it.
#[derive(Debug, Clone)]
pub struct FsStore {
    wiki: Wiki,
}

impl FsStore {
    pub fn new(wiki: Wiki) -> Self {
        Self { wiki }
    }

    pub fn wiki(&self) -> &Wiki {
        &self.wiki
    }

    /// Note paths under the root, sorted.
    pub fn note_paths(&self) -> Vec<NotePath> {
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(self.wiki.root())
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = match self.wiki.to_rel(entry.path()) {
                Ok(r) => r,
                Err(_) => continue,
            };
            if !self.wiki.is_note_rel(rel.as_path()) {
                continue;
            }
            out.push(rel);
        }
        out.sort();
        out
    }

    fn file_meta(&self, path: &NotePath) -> Result<Option<std::fs::Metadata>> {
        let abs = self.wiki.to_abs(path);
        match std::fs::metadata(&abs) {
            Ok(m) if m.is_file() => Ok(Some(m)),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(&abs, err)),
        }
    }

    /// The record a note has before anything is saved for it.
    fn initial(path: &NotePath, meta: &std::fs::Metadata) -> Metadata {
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Metadata::new(path.clone(), meta.len(), DateTime::<Utc>::from(mtime))
    }

    fn load(&self, path: &NotePath) -> Result<Option<Metadata>> {
        let Some(meta) = self.file_meta(path)? else {
            return Ok(None);
        };

        let sidecar = self.wiki.sidecar_path(path);
        match std::fs::read_to_string(&sidecar) {
            Ok(text) => {
                let mut rec: Metadata = serde_yaml::from_str(&text)?;
                rec.path = path.clone();
                Ok(Some(rec))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Some(Self::initial(path, &meta)))
            }
            Err(err) => Err(Error::io(&sidecar, err)),
        }
    }

    /// Loads the record with `derived` swapped in and writes it next to its
    /// sidecar. Returns the staged file and the sidecar it will replace.
    fn stage_derived(&self, path: &NotePath, derived: DerivedLinks) -> Result<(PathBuf, PathBuf)> {
        let Some(mut rec) = self.load(path)? else {
            return Err(Error::RecordNotFound(path.clone()));
        };
        rec.derived = derived;

        let sidecar = self.wiki.sidecar_path(path);
        let staged = sidecar.with_extension("yaml.tmp");
        if let Some(parent) = staged.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let text = serde_yaml::to_string(&rec)?;
        std::fs::write(&staged, text).map_err(|e| Error::io(&staged, e))?;
        Ok((staged, sidecar))
    }

    fn write(&self, rec: &Metadata) -> Result<()> {
        let sidecar = self.wiki.sidecar_path(&rec.path);
        if let Some(parent) = sidecar.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let text = serde_yaml::to_string(rec)?;
        std::fs::write(&sidecar, text).map_err(|e| Error::io(&sidecar, e))?;
        debug!(path = %rec.path, "metadata sidecar written");
        Ok(())
    }
}

impl MetadataStore for FsStore {
    fn all_records(&self) -> Result<Vec<Metadata>> {
        Ok(self.snapshot()?.records)
    }

    /// A sidecar that fails to load is logged and replaced, in the snapshot
    /// only, by the note's initial record.
    fn snapshot(&self) -> Result<CorpusSnapshot> {
        let mut out = CorpusSnapshot::default();
        for path in self.note_paths() {
            match self.load(&path) {
                Ok(Some(rec)) => out.records.push(rec),
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        path = %path,
                        error = %err,
                        "failed to load metadata; using initial record"
                    );
                    if let Ok(Some(meta)) = self.file_meta(&path) {
                        out.records.push(Self::initial(&path, &meta));
                    }
                    out.damaged.push(path);
                }
            }
        }
        Ok(out)
    }

    fn record(&self, path: &NotePath) -> Result<Option<Metadata>> {
        self.load(path)
    }

    fn content(&self, path: &NotePath) -> Result<String> {
        let abs = self.wiki.to_abs(path);
        std::fs::read_to_string(&abs).map_err(|e| Error::io(&abs, e))
    }

    fn save_record(&mut self, patch: MetadataPatch) -> Result<Metadata> {
        let path = patch_path(&patch)?;
        let Some(mut rec) = self.load(&path)? else {
            return Err(Error::RecordNotFound(path));
        };
        rec.apply(patch);
        self.write(&rec)?;
        Ok(rec)
    }

    fn initialize(&mut self, path: &NotePath) -> Result<Metadata> {
        let Some(rec) = self.load(path)? else {
            return Err(Error::RecordNotFound(path.clone()));
        };
        if !self.wiki.sidecar_path(path).exists() {
            self.write(&rec)?;
        }
        Ok(rec)
    }

    fn replace_derived(&mut self, path: &NotePath, derived: DerivedLinks) -> Result<()> {
        let Some(mut rec) = self.load(path)? else {
            return Err(Error::RecordNotFound(path.clone()));
        };
        rec.derived = derived;
        self.write(&rec)
    }

    /// Stages every sidecar first and renames them into place only once all
    /// of them were written.
    fn replace_derived_all(&mut self, updates: Vec<(NotePath, DerivedLinks)>) -> Result<()> {
        let mut staged = Vec::with_capacity(updates.len());
        for (path, derived) in updates {
            match self.stage_derived(&path, derived) {
                Ok(pair) => staged.push(pair),
                Err(err) => {
                    for (tmp, _) in &staged {
                        let _ = std::fs::remove_file(tmp);
                    }
                    return Err(err);
                }
            }
        }

        let count = staged.len();
        for (tmp, sidecar) in staged {
            std::fs::rename(&tmp, &sidecar).map_err(|e| Error::io(&sidecar, e))?;
        }
        debug!(count, "derived links written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, WikiConfig};

    fn path(s: &str) -> NotePath {
        NotePath::try_from(s).unwrap()
    }

    #[test]
    fn memory_store_merges_partial_saves() {
        let mut store = MemoryStore::new();
        store.write_note(path("a.md"), "hello").collection = "inbox".into();

        let mut patch = MetadataPatch::for_path(path("a.md"));
        patch.set_field(Field::Tags, "x");
        let saved = store.save_record(patch).unwrap();
        assert_eq!(saved.tags, vec!["x".to_string()]);
        assert_eq!(saved.collection, "inbox");
        assert_eq!(saved.size, 5);
    }

    #[test]
    fn saving_unknown_record_fails() {
        let mut store = MemoryStore::new();
        let err = store
            .save_record(MetadataPatch::for_path(path("missing.md")))
            .unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(_)));
        assert!(store.save_record(MetadataPatch::default()).is_err());
    }

    #[test]
    fn fs_store_synthesizes_then_persists_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("notes")).unwrap();
        std::fs::write(root.join("notes/a.md"), "abc").unwrap();
        std::fs::write(root.join("notes/img.png"), "png").unwrap();

        let wiki = Wiki::with_config(root, WikiConfig::default()).unwrap();
        let mut store = FsStore::new(wiki.clone());

        let all = store.all_records().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].folders, vec!["notes".to_string()]);
        assert_eq!(all[0].size, 3);
        assert!(!wiki.sidecar_path(&path("notes/a.md")).exists());

        let mut patch = MetadataPatch::for_path(path("notes/a.md"));
        patch.set_field(Field::Collection, "reading");
        store.save_record(patch).unwrap();
        assert!(wiki.sidecar_path(&path("notes/a.md")).exists());

        let rec = store.record(&path("notes/a.md")).unwrap().unwrap();
        assert_eq!(rec.collection, "reading");
        assert!(store.record(&path("notes/gone.md")).unwrap().is_none());
    }
}
