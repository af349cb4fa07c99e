//! Process-wide UI state owned by the event loop.
use crate::api::Category;
use crate::preferences::PreferenceManager;

use super::time_format::RelativeTimeMode;

/// Everything the page keeps between events, apart from the document itself.
#[derive(Debug, Clone)]
pub struct UiState {
    pub active_category: String,
    /// Server order, as last reported or optimistically reordered.
    pub categories: Vec<Category>,
    /// Descriptor used for the active category when the list lacks it.
    pub fallback: Category,
    pub relative_time: RelativeTimeMode,
    pub theme: String,
    pub accent: String,
    /// A full update was started and has not reported completion.
    pub update_in_progress: bool,
    pub channel_connected: bool,
}

impl UiState {
    pub fn init(active_category: &str, categories: Vec<Category>, prefs: &PreferenceManager) -> Self {
        let fallback = categories
            .iter()
            .find(|c| c.name == active_category)
            .cloned()
            .unwrap_or_else(|| Category::named(active_category));
        Self {
            active_category: active_category.to_string(),
            categories,
            fallback,
            relative_time: prefs.relative_time(),
            theme: prefs.theme().to_string(),
            accent: prefs.accent().to_string(),
            update_in_progress: false,
            channel_connected: false,
        }
    }

    pub fn is_active(&self, category: &str) -> bool {
        self.active_category == category
    }

    /// Replace the cached list, refreshing the fallback when the active category is in it.
    pub fn set_categories(&mut self, categories: Vec<Category>) {
        if let Some(active) = categories.iter().find(|c| c.name == self.active_category) {
            self.fallback = active.clone();
        }
        self.categories = categories;
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    /// Reorder the cached list to follow `order`. Unlisted names keep their
    /// relative order after the listed ones.
    pub fn reorder_cached(&mut self, order: &[String]) {
        let rank = |c: &Category| {
            order
                .iter()
                .position(|n| *n == c.name)
                .unwrap_or(order.len())
        };
        self.categories.sort_by_key(rank);
    }

    pub fn switch_category(&mut self, category: &str) {
        self.active_category = category.to_string();
        self.fallback = self
            .categories
            .iter()
            .find(|c| c.name == category)
            .cloned()
            .unwrap_or_else(|| Category::named(category));
        self.update_in_progress = false;
    }
}
