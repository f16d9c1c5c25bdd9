use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::filter::{FilterEngine, sort_records};
use crate::graph::{LinkGraphBuilder, RebuildReport, Relations};
use crate::{
    Criterion, Error, FieldMapping, FilterExpr, FsStore, LinkExtractor, Logic, Metadata,
    MetadataPatch, MetadataStore, NotePath, Result, SortDir, SortKey, Wiki, fields,
};

/// Sort and limit applied after filtering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub sort: Option<(SortKey, SortDir)>,
    pub limit: Option<usize>,
}

/// Shared handle over a metadata store.
///
/// Reads take the store's read lock. Field edits and link rebuilds take the
/// write lock, so a rebuild never interleaves with a save or another rebuild.
pub struct WikiService<S: MetadataStore> {
    store: Arc<RwLock<S>>,
    extractor: Arc<LinkExtractor>,
}

impl<S: MetadataStore> Clone for WikiService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl WikiService<FsStore> {
    /// Service over a wiki directory, with link patterns from its config.
    pub fn open(wiki: Wiki) -> Self {
        let extractor = LinkExtractor::new(wiki.config());
        Self::new(FsStore::new(wiki), extractor)
    }
}

impl<S: MetadataStore> WikiService<S> {
    pub fn new(store: S, extractor: LinkExtractor) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            extractor: Arc::new(extractor),
        }
    }

    pub fn extractor(&self) -> &LinkExtractor {
        &self.extractor
    }

    fn read(&self) -> RwLockReadGuard<'_, S> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, S> {
        self.store.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let guard = self.read();
        f(&guard)
    }

    pub fn filter_files(&self, criteria: &[Criterion], logic: Logic) -> Result<Vec<Metadata>> {
        self.with_store(|s| FilterEngine::new(s).filter_files(criteria, logic))
    }

    pub fn filter_expr(&self, expr: &FilterExpr) -> Result<Vec<Metadata>> {
        self.with_store(|s| FilterEngine::new(s).filter_expr(expr))
    }

    /// Filters, then sorts and truncates per `page`.
    pub fn filter_page(
        &self,
        criteria: &[Criterion],
        logic: Logic,
        page: Page,
    ) -> Result<Vec<Metadata>> {
        let mut out = self.filter_files(criteria, logic)?;
        if let Some((key, dir)) = page.sort {
            sort_records(&mut out, key, dir);
        }
        if let Some(limit) = page.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    pub fn extract_links(&self, content: &str) -> Vec<NotePath> {
        self.extractor.extract_links(content)
    }

    pub fn process_links(&self, content: &str) -> String {
        self.extractor.process_links(content)
    }

    pub fn map_field(&self, token: &str) -> FieldMapping {
        fields::map_field(token)
    }

    pub fn record(&self, path: &NotePath) -> Result<Metadata> {
        self.with_store(|s| s.record(path))?
            .ok_or_else(|| Error::RecordNotFound(path.clone()))
    }

    pub fn relations(&self, path: &NotePath) -> Result<Relations> {
        Ok(Relations::from(&self.record(path)?))
    }

    /// Links found in a stored note's content.
    pub fn note_links(&self, path: &NotePath) -> Result<Vec<NotePath>> {
        let content = self.with_store(|s| s.content(path))?;
        Ok(self.extract_links(&content))
    }

    pub fn save_record(&self, patch: MetadataPatch) -> Result<Metadata> {
        self.write().save_record(patch)
    }

    pub fn initialize(&self, path: &NotePath) -> Result<Metadata> {
        self.write().initialize(path)
    }

    /// Full-corpus rebuild of derived relations, holding the write lock throughout.
    pub fn rebuild_links(&self) -> Result<RebuildReport> {
        let mut guard = self.write();
        LinkGraphBuilder::new(&mut *guard, &self.extractor).rebuild()
    }
}

impl<S: MetadataStore + Send + Sync + 'static> WikiService<S> {
    /// [`WikiService::rebuild_links`] on the blocking thread pool.
    pub async fn rebuild_links_blocking(&self) -> Result<RebuildReport> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.rebuild_links())
            .await
            .map_err(|e| Error::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Field, MemoryStore};

    fn path(s: &str) -> NotePath {
        NotePath::try_from(s).unwrap()
    }

    fn service() -> WikiService<MemoryStore> {
        let mut store = MemoryStore::new();
        store.write_note(path("hub.md"), "# Hub\n[[a]] [[b]]\n");
        store.write_note(path("a.md"), "[[b]]").tags = vec!["work".into()];
        store.write_note(path("b.md"), "nothing").parents = vec![path("hub.md")];
        WikiService::new(store, LinkExtractor::default())
    }

    #[test]
    fn rebuild_then_read_relations() {
        let svc = service();
        let report = svc.rebuild_links().unwrap();
        assert_eq!(report.records, 3);
        assert!(report.dangling.is_empty());

        let rel = svc.relations(&path("b.md")).unwrap();
        assert_eq!(rel.links_to_here, vec![path("a.md"), path("hub.md")]);
        assert_eq!(rel.ancestor, vec![path("hub.md")]);

        let hub = svc.relations(&path("hub.md")).unwrap();
        assert_eq!(hub.kids, vec![path("b.md")]);
        assert_eq!(hub.used_links, vec![path("a.md"), path("b.md")]);
    }

    #[test]
    fn filter_page_sorts_and_limits() {
        let svc = service();
        let page = Page {
            sort: Some((SortKey::Path, SortDir::Desc)),
            limit: Some(2),
        };
        let out = svc.filter_page(&[], Logic::And, page).unwrap();
        let paths: Vec<_> = out.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["hub.md", "b.md"]);
    }

    #[test]
    fn saves_are_visible_to_later_filters() {
        let svc = service();
        let mut patch = MetadataPatch::for_path(path("b.md"));
        assert!(patch.set_field(Field::Tags, "work"));
        svc.save_record(patch).unwrap();

        let hits = svc
            .filter_files(&[Criterion::new("tag", "equals", "work")], Logic::And)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn missing_record_is_an_error() {
        let svc = service();
        let err = svc.relations(&path("nope.md")).unwrap_err();
        assert!(matches!(err, Error::RecordNotFound(_)));
    }
}
