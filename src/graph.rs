//! Derived link relations: kids, ancestors, used links and links-to-here.
//!
//! A rebuild is a full recomputation over the corpus. It is not safe to run
//! concurrently with itself or with writers touching the same records;
//! [`crate::WikiService`] serializes it behind the store's write lock.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, info, warn};

use crate::record::DerivedLinks;
use crate::{LinkExtractor, Metadata, MetadataStore, NotePath, Result};

/// A link or parent declaration pointing at a path with no record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DanglingLink {
    pub source: NotePath,
    pub target: NotePath,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RebuildReport {
    pub records: usize,
    /// Total resolved and unresolved used links across the corpus.
    pub used_links: usize,
    pub dangling: Vec<DanglingLink>,
    pub missing_parents: Vec<DanglingLink>,
    /// Records that reach themselves through `parents`.
    pub cycles: Vec<NotePath>,
    /// Records whose content could not be read; treated as linking nowhere.
    pub unreadable: Vec<NotePath>,
    /// Records whose stored metadata could not be loaded. Their relations are
    /// computed from the initial record and are not written back.
    pub damaged: Vec<NotePath>,
    /// Records whose derived fields differ from before the rebuild.
    pub changed: Vec<NotePath>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rebuilt {
    pub records: Vec<Metadata>,
    pub report: RebuildReport,
}

/// Everything the graph knows about one note.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relations {
    pub path: NotePath,
    pub parents: Vec<NotePath>,
    pub kids: Vec<NotePath>,
    pub ancestor: Vec<NotePath>,
    pub used_links: Vec<NotePath>,
    pub links_to_here: Vec<NotePath>,
}

impl From<&Metadata> for Relations {
    fn from(rec: &Metadata) -> Self {
        Self {
            path: rec.path.clone(),
            parents: rec.parents.clone(),
            kids: rec.derived.kids.clone(),
            ancestor: rec.derived.ancestor.clone(),
            used_links: rec.derived.used_links.clone(),
            links_to_here: rec.derived.links_to_here.clone(),
        }
    }
}

/// Recomputes all derived relations. Previous derived values are discarded,
/// so running it twice on unchanged input yields identical records.
///
/// `content` failures are logged and count as an empty link list.
pub fn rebuild_links<F>(
    mut records: Vec<Metadata>,
    extractor: &LinkExtractor,
    mut content: F,
) -> Rebuilt
where
    F: FnMut(&NotePath) -> Result<String>,
{
    let mut report = RebuildReport {
        records: records.len(),
        ..Default::default()
    };

    let index: HashMap<NotePath, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (r.path.clone(), i))
        .collect();

    // Note extensions match case-insensitively, so `[[B]]` finds `B.MD`.
    let folded: HashMap<String, usize> = records
        .iter()
        .enumerate()
        .map(|(i, r)| (fold_extension(r.path.as_str()), i))
        .collect();
    let canonical = |target: NotePath| -> NotePath {
        if index.contains_key(&target) {
            return target;
        }
        match folded.get(&fold_extension(target.as_str())) {
            Some(&j) => records[j].path.clone(),
            None => target,
        }
    };

    let used: Vec<Vec<NotePath>> = records
        .iter()
        .map(|rec| match content(&rec.path) {
            Ok(text) => {
                let mut seen = HashSet::new();
                extractor
                    .extract_links(&text)
                    .into_iter()
                    .map(&canonical)
                    .filter(|t| seen.insert(t.clone()))
                    .collect()
            }
            Err(err) => {
                warn!(
                    path = %rec.path,
                    error = %err,
                    "failed to read note content; no used links this pass"
                );
                report.unreadable.push(rec.path.clone());
                Vec::new()
            }
        })
        .collect();

    let mut links_to_here: Vec<Vec<NotePath>> = vec![Vec::new(); records.len()];
    for (i, targets) in used.iter().enumerate() {
        report.used_links += targets.len();
        for target in targets {
            match index.get(target) {
                Some(&j) => links_to_here[j].push(records[i].path.clone()),
                None => report.dangling.push(DanglingLink {
                    source: records[i].path.clone(),
                    target: target.clone(),
                }),
            }
        }
    }

    let parent_ix: Vec<Vec<usize>> = records
        .iter()
        .map(|rec| {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for p in &rec.parents {
                match index.get(p) {
                    Some(&j) => {
                        if seen.insert(j) {
                            out.push(j);
                        }
                    }
                    None => report.missing_parents.push(DanglingLink {
                        source: rec.path.clone(),
                        target: p.clone(),
                    }),
                }
            }
            out
        })
        .collect();

    let mut kids: Vec<Vec<NotePath>> = vec![Vec::new(); records.len()];
    for (i, parents) in parent_ix.iter().enumerate() {
        for &p in parents {
            kids[p].push(records[i].path.clone());
        }
    }

    let mut ancestors: Vec<Vec<NotePath>> = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let (found, cyclic) = ancestors_of(i, &parent_ix);
        if cyclic {
            warn!(path = %rec.path, "parents form a cycle through this note");
            report.cycles.push(rec.path.clone());
        }
        ancestors.push(found.into_iter().map(|j| records[j].path.clone()).collect());
    }

    for (i, ((used_links, links_to_here), (kids, ancestor))) in used
        .into_iter()
        .zip(links_to_here)
        .zip(kids.into_iter().zip(ancestors))
        .enumerate()
    {
        let derived = DerivedLinks {
            kids,
            ancestor,
            used_links,
            links_to_here,
        };
        let rec = &mut records[i];
        if rec.derived != derived {
            debug!(path = %rec.path, "derived links changed");
            report.changed.push(rec.path.clone());
            rec.derived = derived;
        }
    }

    info!(
        records = report.records,
        used_links = report.used_links,
        dangling = report.dangling.len(),
        cycles = report.cycles.len(),
        unreadable = report.unreadable.len(),
        changed = report.changed.len(),
        "link graph rebuilt"
    );

    Rebuilt { records, report }
}

fn fold_extension(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => {
            format!("{stem}.{}", ext.to_ascii_lowercase())
        }
        _ => path.to_string(),
    }
}

/// Breadth-first walk over parent edges. Each node is visited once; the
/// start node is never included, even when a cycle leads back to it.
fn ancestors_of(start: usize, parent_ix: &[Vec<usize>]) -> (Vec<usize>, bool) {
    let mut visited = HashSet::from([start]);
    let mut queue: VecDeque<usize> = parent_ix[start].iter().copied().collect();
    let mut out = Vec::new();
    let mut cyclic = false;

    while let Some(n) = queue.pop_front() {
        if n == start {
            cyclic = true;
            continue;
        }
        if !visited.insert(n) {
            continue;
        }
        out.push(n);
        queue.extend(parent_ix[n].iter().copied());
    }

    (out, cyclic)
}

/// Rebuilds derived relations for every record in a store and writes back
/// the records whose relations changed.
pub struct LinkGraphBuilder<'a, S: MetadataStore + ?Sized> {
    store: &'a mut S,
    extractor: &'a LinkExtractor,
}

impl<'a, S: MetadataStore + ?Sized> LinkGraphBuilder<'a, S> {
    pub fn new(store: &'a mut S, extractor: &'a LinkExtractor) -> Self {
        Self { store, extractor }
    }

    /// Recomputes the graph and persists it all-or-nothing. Damaged records
    /// take part in the computation but are never written.
    pub fn rebuild(&mut self) -> Result<RebuildReport> {
        let snapshot = self.store.snapshot()?;
        let store = &*self.store;
        let Rebuilt {
            records,
            mut report,
        } = rebuild_links(snapshot.records, self.extractor, |p| store.content(p));
        report.damaged = snapshot.damaged;

        let updates: Vec<(NotePath, DerivedLinks)> = {
            let changed: HashSet<&NotePath> = report.changed.iter().collect();
            let damaged: HashSet<&NotePath> = report.damaged.iter().collect();
            records
                .into_iter()
                .filter(|r| changed.contains(&r.path) && !damaged.contains(&r.path))
                .map(|r| (r.path, r.derived))
                .collect()
        };
        if !report.damaged.is_empty() {
            warn!(
                damaged = report.damaged.len(),
                "records with unreadable metadata were not updated"
            );
        }
        self.store.replace_derived_all(updates)?;
        Ok(report)
    }
}
