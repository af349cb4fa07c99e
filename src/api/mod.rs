//! Client for the tracker server's HTTP surface.
mod client;
mod types;

pub use client::{ApiError, TrackerApi};
pub use types::{
    deserialize_categories, Category, CategoryDraft, ChaptersPayload, FragmentGroup,
    HistoryEntry, HistoryPayload, LinkDraft, StatusResponse, ValidationError, DEFAULT_CATEGORY,
};
