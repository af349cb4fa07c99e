use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Name of the category served without a path prefix.
pub const DEFAULT_CATEGORY: &str = "main";

// ============================================================================
// Validation
// ============================================================================

/// Input rejected before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter both name and URL.")]
    MissingNameOrUrl,

    #[error("Category name is required.")]
    MissingCategoryName,

    #[error("Nothing to reorder")]
    NothingToReorder,

    #[error("Load the link's history first.")]
    HistoryNotLoaded,
    /// History entry is the latest detection or matches the saved chapter.
    #[error("History entry {0} is locked and cannot be deleted")]
    LockedHistoryEntry(i64),
}

// ============================================================================
// Categories
// ============================================================================

/// A named, ordered grouping of tracked links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub update_interval_hours: Option<f64>,
    #[serde(default = "default_true")]
    pub include_in_nav: bool,
    #[serde(default)]
    pub unsaved_count: u64,
}

fn default_true() -> bool {
    true
}

impl Category {
    /// Descriptor used when only the slug is known.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: String::new(),
            update_interval_hours: None,
            include_in_nav: true,
            unsaved_count: 0,
        }
    }

    /// Label shown in navigation: display name, else the slug.
    pub fn label(&self) -> &str {
        if self.display_name.trim().is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

/// Older servers list categories as bare slugs.
#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryWire {
    Name(String),
    Full(Category),
}

/// Accept both `["main", ...]` and `[{"name": "main", ...}, ...]`.
pub fn deserialize_categories<'de, D>(deserializer: D) -> Result<Vec<Category>, D::Error>
where
    D: Deserializer<'de>,
{
    let wire: Vec<CategoryWire> = Vec::deserialize(deserializer)?;
    Ok(wire
        .into_iter()
        .map(|c| match c {
            CategoryWire::Name(name) => Category::named(&name),
            CategoryWire::Full(cat) => cat,
        })
        .collect())
}

fn deserialize_optional_categories<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<Category>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_categories")] Vec<Category>);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(v)| v))
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryList(
    #[serde(deserialize_with = "deserialize_categories")] pub Vec<Category>,
);

/// Fields sent on category create/update.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryDraft {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_interval_hours: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_in_nav: Option<bool>,
}

impl CategoryDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingCategoryName);
        }
        Ok(())
    }
}

// ============================================================================
// Responses
// ============================================================================

/// `{status, error?}` envelope returned by every mutating endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ReorderResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "deserialize_categories")]
    pub categories: Vec<Category>,
}

/// One rendered row group.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FragmentGroup {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub html: String,
}

/// Payload of `GET /api/chapters`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChaptersPayload {
    #[serde(default)]
    pub differences: FragmentGroup,
    #[serde(default)]
    pub same_data: FragmentGroup,
    #[serde(default, deserialize_with = "deserialize_optional_categories")]
    pub nav: Option<Vec<Category>>,
    #[serde(default)]
    pub last_full_update: Option<String>,
    /// A server-wide update was already running when the page was rendered.
    #[serde(default)]
    pub update_in_progress: bool,
}

// ============================================================================
// Links
// ============================================================================

/// Body of `/add` and `/edit`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkDraft {
    pub name: String,
    pub url: String,
    pub free_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_frequency: Option<String>,
}

impl LinkDraft {
    /// Trim inputs and reject empty name/url.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        let name = self.name.trim().to_string();
        let url = self.url.trim().to_string();
        if name.is_empty() || url.is_empty() {
            return Err(ValidationError::MissingNameOrUrl);
        }
        let update_frequency = self
            .update_frequency
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty());
        Ok(Self {
            name,
            url,
            free_only: self.free_only,
            update_frequency,
        })
    }
}

// ============================================================================
// History
// ============================================================================

/// One recorded chapter detection for a link.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryEntry {
    pub entry_id: i64,
    #[serde(default)]
    pub last_found: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub retrieved_at: Option<String>,
    #[serde(default)]
    pub is_latest: bool,
}

impl HistoryEntry {
    /// Locked entries cannot be deleted.
    pub fn is_locked(&self, last_saved: Option<&str>) -> bool {
        self.is_latest || last_saved == Some(self.last_found.as_str())
    }
}

/// Payload of `/history` and its mutations.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryPayload {
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_saved: Option<String>,
    #[serde(default)]
    pub last_attempt: Option<String>,
    #[serde(default)]
    pub added_at: Option<String>,
    #[serde(default)]
    pub update_frequency: Option<String>,
    #[serde(default)]
    pub free_only: bool,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl HistoryPayload {
    /// The entry whose chapter equals the saved one.
    pub fn saved_entry(&self) -> Option<&HistoryEntry> {
        let saved = self.last_saved.as_deref()?;
        self.history.iter().find(|e| e.last_found == saved)
    }

    pub fn entry(&self, entry_id: i64) -> Option<&HistoryEntry> {
        self.history.iter().find(|e| e.entry_id == entry_id)
    }

    /// Gate a delete before it reaches the network.
    pub fn check_deletable(&self, entry_id: i64) -> Result<(), ValidationError> {
        match self.entry(entry_id) {
            Some(entry) if entry.is_locked(self.last_saved.as_deref()) => {
                Err(ValidationError::LockedHistoryEntry(entry_id))
            }
            _ => Ok(()),
        }
    }
}
