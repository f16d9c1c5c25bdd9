use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use tracing::warn;

use crate::{NotePath, WikiConfig};

/// Finds link syntax in note text. Patterns are compiled once; the first
/// capture group of each match is the raw link text.
#[derive(Debug, Clone)]
pub struct LinkExtractor {
    patterns: Vec<Regex>,
    note_suffix: String,
    max_len: usize,
}

#[derive(Debug, Clone, Copy)]
struct LinkSpan<'a> {
    start: usize,
    end: usize,
    raw: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkText {
    target: String,
    display: Option<String>,
}

impl Default for LinkExtractor {
    fn default() -> Self {
        Self::new(&WikiConfig::default())
    }
}

impl LinkExtractor {
    pub fn new(cfg: &WikiConfig) -> Self {
        Self::with_patterns(&cfg.link_patterns, &cfg.note_extension, cfg.max_link_len)
    }

    /// Invalid patterns (or patterns without a capture group) are logged and skipped.
    pub fn with_patterns<S: AsRef<str>>(
        patterns: &[S],
        note_extension: &str,
        max_len: usize,
    ) -> Self {
        let mut compiled = Vec::with_capacity(patterns.len());
        for p in patterns {
            let p = p.as_ref();
            match Regex::new(p) {
                Ok(re) if re.captures_len() > 1 => compiled.push(re),
                Ok(_) => warn!(pattern = p, "link pattern has no capture group; skipped"),
                Err(err) => warn!(pattern = p, error = %err, "invalid link pattern; skipped"),
            }
        }

        Self {
            patterns: compiled,
            note_suffix: format!(".{note_extension}"),
            max_len,
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Linked note paths in order of first occurrence, without duplicates.
    pub fn extract_links(&self, content: &str) -> Vec<NotePath> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for span in self.spans(content) {
            let Some(link) = self.normalize(span.raw) else {
                continue;
            };
            let Some(path) = self.note_target(&link.target) else {
                continue;
            };
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
        out
    }

    /// Rewrites every link span into a markdown hyperlink `[label](target.md)`.
    /// Spans that fail normalization are left as written.
    pub fn process_links(&self, content: &str) -> String {
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0usize;
        for span in self.spans(content) {
            if span.start < cursor {
                continue;
            }
            let Some(link) = self.normalize(span.raw) else {
                continue;
            };
            out.push_str(&content[cursor..span.start]);
            out.push_str(&self.render(&link));
            cursor = span.end;
        }
        out.push_str(&content[cursor..]);
        out
    }

    /// All pattern matches across the configured patterns, by position.
    fn spans<'a>(&self, content: &'a str) -> Vec<LinkSpan<'a>> {
        let mut out = Vec::new();
        for re in &self.patterns {
            for caps in re.captures_iter(content) {
                let (Some(whole), Some(raw)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                out.push(LinkSpan {
                    start: whole.start(),
                    end: whole.end(),
                    raw: raw.as_str(),
                });
            }
        }
        // Earliest first; on a tie the longer span wins.
        out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| b.end.cmp(&a.end)));
        out
    }

    fn normalize(&self, raw: &str) -> Option<LinkText> {
        let (target, display) = match raw.split_once('|') {
            Some((t, d)) => (t, Some(d)),
            None => (raw, None),
        };

        let target = truncate_at_closer(target);
        let target = target.strip_prefix("../").unwrap_or(target);
        let target = target.trim();
        if target.is_empty() || target.contains('\n') || target.chars().count() > self.max_len {
            return None;
        }

        let display = display
            .map(|d| truncate_at_closer(d).trim().to_string())
            .filter(|d| !d.is_empty());

        Some(LinkText {
            target: target.to_string(),
            display,
        })
    }

    fn has_note_suffix(&self, target: &str) -> bool {
        let n = self.note_suffix.len();
        target.len() >= n
            && target.is_char_boundary(target.len() - n)
            && target[target.len() - n..].eq_ignore_ascii_case(&self.note_suffix)
    }

    /// Appends the note suffix unless the target already names a file type.
    fn with_suffix(&self, target: &str) -> String {
        let mut t = target.to_string();
        if !self.has_note_suffix(target) && file_extension(target).is_none() {
            t.push_str(&self.note_suffix);
        }
        t
    }

    fn note_target(&self, target: &str) -> Option<NotePath> {
        if target.ends_with('/') {
            return None;
        }
        let t = self.with_suffix(target);
        if !self.has_note_suffix(&t) {
            return None;
        }
        NotePath::try_from(t.as_str()).ok()
    }

    fn render(&self, link: &LinkText) -> String {
        let target = self.with_suffix(&link.target);
        let label = link.display.as_deref().unwrap_or(&link.target);
        let label = if self.has_note_suffix(label) {
            &label[..label.len() - self.note_suffix.len()]
        } else {
            label
        };

        if target.contains(char::is_whitespace) {
            format!("[{label}](<{target}>)")
        } else {
            format!("[{label}]({target})")
        }
    }
}

/// A trailing `.xyz` counts as a file extension only when it is short,
/// alphanumeric and has a letter; `2024.01.02` and `v1.2` have none.
fn file_extension(target: &str) -> Option<&str> {
    let ext = Path::new(target).extension()?.to_str()?;
    let is_ext = (1..=4).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && ext.chars().any(|c| c.is_ascii_alphabetic());
    is_ext.then_some(ext)
}

fn truncate_at_closer(s: &str) -> &str {
    let cut = [s.find("]]"), s.find("}}")].into_iter().flatten().min();
    match cut {
        Some(ix) => &s[..ix],
        None => s,
    }
}
