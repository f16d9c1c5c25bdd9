/// How a field's values are compared by the filter engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Unordered set of strings; greater/less compare the element count.
    List,
    /// Plain string; greater/less are undefined.
    Text,
    /// Timestamp; greater/less parse the criterion value as a date.
    Date,
    /// Byte count; greater/less parse the criterion value as an integer.
    Bytes,
}

/// Every metadata field a criterion can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Path,
    Tags,
    Folders,
    Collection,
    FileType,
    Status,
    Priority,
    CreatedAt,
    LastEdited,
    Size,
    Projects,
    Areas,
    Resources,
    Archive,
    Parents,
    Kids,
    Ancestor,
    UsedLinks,
    LinksToHere,
}

/// Result of resolving a user-facing field token.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub internal: String,
    pub is_array: bool,
    pub display: String,
}

impl Field {
    pub const ALL: [Field; 19] = [
        Field::Path,
        Field::Tags,
        Field::Folders,
        Field::Collection,
        Field::FileType,
        Field::Status,
        Field::Priority,
        Field::CreatedAt,
        Field::LastEdited,
        Field::Size,
        Field::Projects,
        Field::Areas,
        Field::Resources,
        Field::Archive,
        Field::Parents,
        Field::Kids,
        Field::Ancestor,
        Field::UsedLinks,
        Field::LinksToHere,
    ];

    /// Record field name, as stored.
    pub fn internal_name(self) -> &'static str {
        match self {
            Field::Path => "path",
            Field::Tags => "tags",
            Field::Folders => "folders",
            Field::Collection => "collection",
            Field::FileType => "fileType",
            Field::Status => "status",
            Field::Priority => "priority",
            Field::CreatedAt => "createdAt",
            Field::LastEdited => "lastEdited",
            Field::Size => "size",
            Field::Projects => "para_projects",
            Field::Areas => "para_areas",
            Field::Resources => "para_resources",
            Field::Archive => "para_archive",
            Field::Parents => "parents",
            Field::Kids => "kids",
            Field::Ancestor => "ancestor",
            Field::UsedLinks => "usedLinks",
            Field::LinksToHere => "linksToHere",
        }
    }

    /// Friendly, URL-style token shown in the UI.
    pub fn display_name(self) -> &'static str {
        match self {
            Field::Path => "path",
            Field::Tags => "tag",
            Field::Folders => "folder",
            Field::Collection => "collection",
            Field::FileType => "type",
            Field::Status => "status",
            Field::Priority => "priority",
            Field::CreatedAt => "created",
            Field::LastEdited => "edited",
            Field::Size => "size",
            Field::Projects => "projects",
            Field::Areas => "areas",
            Field::Resources => "resources",
            Field::Archive => "archive",
            Field::Parents => "parent",
            Field::Kids => "kid",
            Field::Ancestor => "ancestor",
            Field::UsedLinks => "link",
            Field::LinksToHere => "backlink",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Path
            | Field::Collection
            | Field::FileType
            | Field::Status
            | Field::Priority => FieldKind::Text,
            Field::CreatedAt | Field::LastEdited => FieldKind::Date,
            Field::Size => FieldKind::Bytes,
            Field::Tags
            | Field::Folders
            | Field::Projects
            | Field::Areas
            | Field::Resources
            | Field::Archive
            | Field::Parents
            | Field::Kids
            | Field::Ancestor
            | Field::UsedLinks
            | Field::LinksToHere => FieldKind::List,
        }
    }

    pub fn is_array(self) -> bool {
        self.kind() == FieldKind::List
    }

    /// Fields computed by the link graph rebuild, never edited by users.
    pub fn is_derived(self) -> bool {
        matches!(
            self,
            Field::Kids | Field::Ancestor | Field::UsedLinks | Field::LinksToHere
        )
    }

    /// Looks up a field by its internal record name (exact match).
    pub fn from_internal(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.internal_name() == name)
    }

    /// Resolves any accepted spelling: alias, display name or internal name.
    pub fn from_token(token: &str) -> Option<Field> {
        let t = token.trim();
        if let Some(f) = Field::from_internal(t) {
            return Some(f);
        }
        let lower = t.to_ascii_lowercase();
        let f = match lower.as_str() {
            "path" => Field::Path,
            "tag" | "tags" => Field::Tags,
            "folder" | "folders" => Field::Folders,
            "collection" => Field::Collection,
            "type" | "filetype" | "file_type" => Field::FileType,
            "status" => Field::Status,
            "priority" => Field::Priority,
            "created" | "createdat" | "created_at" => Field::CreatedAt,
            "edited" | "modified" | "lastedited" | "last_edited" => Field::LastEdited,
            "size" => Field::Size,
            "project" | "projects" | "para_projects" => Field::Projects,
            "area" | "areas" | "para_areas" => Field::Areas,
            "resource" | "resources" | "para_resources" => Field::Resources,
            "archive" | "para_archive" => Field::Archive,
            "parent" | "parents" => Field::Parents,
            "kid" | "kids" | "child" | "children" => Field::Kids,
            "ancestor" | "ancestors" => Field::Ancestor,
            "link" | "links" | "usedlinks" | "used_links" => Field::UsedLinks,
            "backlink" | "backlinks" | "linkstohere" | "links_to_here" => Field::LinksToHere,
            _ => return None,
        };
        Some(f)
    }

    pub fn mapping(self) -> FieldMapping {
        FieldMapping {
            internal: self.internal_name().to_string(),
            is_array: self.is_array(),
            display: self.display_name().to_string(),
        }
    }
}

/// Maps a user-facing token to its internal name, array classification and
/// display label. Unknown tokens pass through unchanged as a scalar.
pub fn map_field(token: &str) -> FieldMapping {
    match Field::from_token(token) {
        Some(f) => f.mapping(),
        None => FieldMapping {
            internal: token.to_string(),
            is_array: false,
            display: token.to_string(),
        },
    }
}

/// Internal name to friendly label; identity for names without an alias.
pub fn display_name(internal: &str) -> String {
    match Field::from_internal(internal) {
        Some(f) => f.display_name().to_string(),
        None => internal.to_string(),
    }
}
