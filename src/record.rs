use chrono::{DateTime, Utc};

use crate::{Field, NotePath};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                let raw = raw.trim();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(raw))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    FileType {
        Note => "note",
        Project => "project",
        Task => "task",
        Journal => "journal",
        Reference => "reference",
    }
);

string_enum!(
    Status {
        Draft => "draft",
        Active => "active",
        Paused => "paused",
        Done => "done",
        Archived => "archived",
    }
);

string_enum!(
    Priority {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

/// Projects/Areas/Resources/Archive classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Para {
    pub projects: Vec<String>,
    pub areas: Vec<String>,
    pub resources: Vec<String>,
    pub archive: Vec<String>,
}

/// The four relations computed by a link graph rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DerivedLinks {
    pub kids: Vec<NotePath>,
    pub ancestor: Vec<NotePath>,
    pub used_links: Vec<NotePath>,
    pub links_to_here: Vec<NotePath>,
}

/// Structured metadata attached to one note.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub path: NotePath,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub folders: Vec<String>,
    #[serde(default)]
    pub collection: String,
    #[serde(default = "default_file_type")]
    pub file_type: FileType,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub created_at: DateTime<Utc>,
    pub last_edited: DateTime<Utc>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub para: Para,
    #[serde(default)]
    pub parents: Vec<NotePath>,
    #[serde(flatten)]
    pub derived: DerivedLinks,
}

fn default_file_type() -> FileType {
    FileType::Note
}

/// A partial, user-driven update. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataPatch {
    pub path: Option<NotePath>,
    pub tags: Option<Vec<String>>,
    pub folders: Option<Vec<String>>,
    pub collection: Option<String>,
    pub file_type: Option<FileType>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_edited: Option<DateTime<Utc>>,
    pub size: Option<u64>,
    pub para_projects: Option<Vec<String>>,
    pub para_areas: Option<Vec<String>>,
    pub para_resources: Option<Vec<String>>,
    pub para_archive: Option<Vec<String>>,
    pub parents: Option<Vec<NotePath>>,
}

/// Borrowed view of one field's value, shaped by its [`crate::FieldKind`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldRef<'a> {
    List(Vec<&'a str>),
    Text(&'a str),
    Date(DateTime<Utc>),
    Bytes(u64),
}

impl Metadata {
    /// Initial record for a freshly written note.
    pub fn new(path: NotePath, size: u64, now: DateTime<Utc>) -> Self {
        Self {
            folders: path.folders(),
            path,
            tags: Vec::new(),
            collection: String::new(),
            file_type: FileType::Note,
            status: None,
            priority: None,
            created_at: now,
            last_edited: now,
            size,
            para: Para::default(),
            parents: Vec::new(),
            derived: DerivedLinks::default(),
        }
    }

    /// Merges a patch into this record. The path is never rewritten.
    pub fn apply(&mut self, patch: MetadataPatch) {
        let MetadataPatch {
            path: _,
            tags,
            folders,
            collection,
            file_type,
            status,
            priority,
            created_at,
            last_edited,
            size,
            para_projects,
            para_areas,
            para_resources,
            para_archive,
            parents,
        } = patch;

        if let Some(v) = tags {
            self.tags = v;
        }
        if let Some(v) = folders {
            self.folders = v;
        }
        if let Some(v) = collection {
            self.collection = v;
        }
        if let Some(v) = file_type {
            self.file_type = v;
        }
        if let Some(v) = status {
            self.status = Some(v);
        }
        if let Some(v) = priority {
            self.priority = Some(v);
        }
        if let Some(v) = created_at {
            self.created_at = v;
        }
        if let Some(v) = last_edited {
            self.last_edited = v;
        }
        if let Some(v) = size {
            self.size = v;
        }
        if let Some(v) = para_projects {
            self.para.projects = v;
        }
        if let Some(v) = para_areas {
            self.para.areas = v;
        }
        if let Some(v) = para_resources {
            self.para.resources = v;
        }
        if let Some(v) = para_archive {
            self.para.archive = v;
        }
        if let Some(v) = parents {
            self.parents = v;
        }
    }

    pub(crate) fn field(&self, field: Field) -> FieldRef<'_> {
        fn strs(v: &[String]) -> FieldRef<'_> {
            FieldRef::List(v.iter().map(String::as_str).collect())
        }
        fn paths(v: &[NotePath]) -> FieldRef<'_> {
            FieldRef::List(v.iter().map(NotePath::as_str).collect())
        }
        fn opt<'a>(v: Option<&'static str>) -> FieldRef<'a> {
            FieldRef::Text(v.unwrap_or(""))
        }

        match field {
            Field::Path => FieldRef::Text(self.path.as_str()),
            Field::Tags => strs(&self.tags),
            Field::Folders => strs(&self.folders),
            Field::Collection => FieldRef::Text(&self.collection),
            Field::FileType => FieldRef::Text(self.file_type.as_str()),
            Field::Status => opt(self.status.map(Status::as_str)),
            Field::Priority => opt(self.priority.map(Priority::as_str)),
            Field::CreatedAt => FieldRef::Date(self.created_at),
            Field::LastEdited => FieldRef::Date(self.last_edited),
            Field::Size => FieldRef::Bytes(self.size),
            Field::Projects => strs(&self.para.projects),
            Field::Areas => strs(&self.para.areas),
            Field::Resources => strs(&self.para.resources),
            Field::Archive => strs(&self.para.archive),
            Field::Parents => paths(&self.parents),
            Field::Kids => paths(&self.derived.kids),
            Field::Ancestor => paths(&self.derived.ancestor),
            Field::UsedLinks => paths(&self.derived.used_links),
            Field::LinksToHere => paths(&self.derived.links_to_here),
        }
    }
}

impl MetadataPatch {
    pub fn for_path(path: NotePath) -> Self {
        Self {
            path: Some(path),
            ..Default::default()
        }
    }

    /// Sets one user-editable field from its string form; lists are comma separated.
    /// Returns `false` for derived, unknown or unparseable input.
    pub fn set_field(&mut self, field: Field, raw: &str) -> bool {
        fn list(raw: &str) -> Vec<String> {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }

        match field {
            Field::Path | Field::Kids | Field::Ancestor | Field::UsedLinks | Field::LinksToHere => {
                return false;
            }
            Field::Tags => self.tags = Some(list(raw)),
            Field::Folders => self.folders = Some(list(raw)),
            Field::Collection => self.collection = Some(raw.trim().to_string()),
            Field::FileType => match FileType::parse(raw) {
                Some(v) => self.file_type = Some(v),
                None => return false,
            },
            Field::Status => match Status::parse(raw) {
                Some(v) => self.status = Some(v),
                None => return false,
            },
            Field::Priority => match Priority::parse(raw) {
                Some(v) => self.priority = Some(v),
                None => return false,
            },
            Field::CreatedAt | Field::LastEdited => {
                let Some(date) = crate::filter::parse_date(raw) else {
                    return false;
                };
                let Some(ts) = date.and_hms_opt(0, 0, 0).map(|d| d.and_utc()) else {
                    return false;
                };
                if field == Field::CreatedAt {
                    self.created_at = Some(ts);
                } else {
                    self.last_edited = Some(ts);
                }
            }
            Field::Size => match raw.trim().parse::<u64>() {
                Ok(v) => self.size = Some(v),
                Err(_) => return false,
            },
            Field::Projects => self.para_projects = Some(list(raw)),
            Field::Areas => self.para_areas = Some(list(raw)),
            Field::Resources => self.para_resources = Some(list(raw)),
            Field::Archive => self.para_archive = Some(list(raw)),
            Field::Parents => {
                let mut parents = Vec::new();
                for item in list(raw) {
                    match NotePath::try_from(item.as_str()) {
                        Ok(p) => parents.push(p),
                        Err(_) => return false,
                    }
                }
                self.parents = Some(parents);
            }
        }
        true
    }
}
