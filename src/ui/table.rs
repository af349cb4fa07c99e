//! Table refresher.
//!
//! Fetches both row groups for the active category and swaps them into the
//! page inside a single event handler. Every request carries a generation
//! token; a response older than the latest issued request is dropped
//! without touching the document, and starting a new request aborts the
//! superseded task.
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{ApiError, ChaptersPayload, TrackerApi};
use crate::app::{App, AppEvent};
use crate::dom::parse_fragment;

use super::enhance::render_timestamp;
use super::helpers::spawn_reporting;
use super::nav;
use super::status::{hide_spinner, show_spinner};

pub const DIFFERENCES_BODY_ID: &str = "differences-body";
pub const DIFFERENCES_COUNT_ID: &str = "differences-count";
pub const SAME_BODY_ID: &str = "same-body";
pub const SAME_COUNT_ID: &str = "same-count";
pub const LAST_FULL_UPDATE_ID: &str = "last-full-update";

/// Generation bookkeeping for table fetches.
#[derive(Debug, Default)]
pub struct TableRefresher {
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
    loaded_once: bool,
}

impl TableRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Issue a new generation, aborting the task of the previous one.
    pub fn start(
        &mut self,
        api: &TrackerApi,
        category: &str,
        event_tx: &mpsc::Sender<AppEvent>,
    ) -> u64 {
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
            tracing::debug!(superseded = self.generation, "Aborted previous table fetch");
        }
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        let api = api.clone();
        let category = category.to_string();
        tracing::debug!(category = %category, generation, "Fetching table fragments");
        self.in_flight = Some(spawn_reporting("table_refresh", event_tx, async move {
            let result = api.fetch_chapters(&category).await;
            AppEvent::ChaptersLoaded {
                generation,
                category,
                result,
            }
        }));
        generation
    }

    /// Whether a response with `generation` is still the latest.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    fn finish(&mut self) -> bool {
        self.in_flight = None;
        !std::mem::replace(&mut self.loaded_once, true)
    }
}

/// Start a refresh cycle for the active category.
pub fn refresh(app: &mut App) -> u64 {
    let category = app.ui.active_category.clone();
    let tx = app.event_tx().clone();
    app.table.start(&app.api, &category, &tx)
}

/// Apply a finished fetch. Stale responses are dropped before any mutation.
pub fn apply_chapters(
    app: &mut App,
    generation: u64,
    category: &str,
    result: Result<ChaptersPayload, ApiError>,
) {
    if !app.table.is_current(generation) {
        tracing::debug!(generation, latest = app.table.generation(), "Discarding stale table response");
        return;
    }
    let first_load = app.table.finish();

    let payload = match result {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(category, error = %e, "Table refresh failed");
            hide_spinner(&mut app.doc);
            return;
        }
    };

    swap_groups(app, &payload);

    if let Some(categories) = payload.nav {
        app.ui.set_categories(categories);
        render_nav(app);
    }

    if let Some(node) = app.doc.get_element_by_id(LAST_FULL_UPDATE_ID) {
        match payload.last_full_update.as_deref() {
            Some(stamp) => app.doc.set_attr(node, "data-timestamp", stamp),
            None => app.doc.set_attr(node, "data-timestamp", ""),
        }
        render_timestamp(&mut app.doc, node, app.ui.relative_time, chrono::Local::now());
    }

    if first_load && payload.update_in_progress {
        app.ui.update_in_progress = true;
        show_spinner(&mut app.doc, "Update in progress...");
    } else if !app.ui.update_in_progress {
        hide_spinner(&mut app.doc);
    }
    tracing::info!(
        category,
        differences = payload.differences.count,
        same = payload.same_data.count,
        "Table refreshed"
    );
}

/// Replace both groups and counts, then enhance each container once.
fn swap_groups(app: &mut App, payload: &ChaptersPayload) {
    let groups = [
        (DIFFERENCES_BODY_ID, DIFFERENCES_COUNT_ID, &payload.differences),
        (SAME_BODY_ID, SAME_COUNT_ID, &payload.same_data),
    ];

    let mut swapped = Vec::with_capacity(groups.len());
    for (body_id, count_id, group) in groups {
        let Some(container) = app.doc.get_element_by_id(body_id) else {
            tracing::warn!(container = body_id, "Table container missing, skipping group");
            continue;
        };
        let rows = parse_fragment(&mut app.doc, &group.html);
        app.doc.replace_children(container, rows);
        if let Some(count) = app.doc.get_element_by_id(count_id) {
            app.doc.set_text(count, &group.count.to_string());
        }
        swapped.push(container);
    }

    for container in swapped {
        app.enhance(container);
    }
    app.bindings.prune(&app.doc);
    app.floating.prune_orphans(&mut app.doc);
}

/// Reconcile the navigation list against the cached categories.
pub fn render_nav(app: &mut App) {
    let Some(list) = app.doc.get_element_by_id(nav::NAV_LIST_ID) else {
        return;
    };
    let report = nav::render_nav(
        &mut app.doc,
        list,
        &app.ui.categories,
        &app.ui.active_category,
        &app.ui.fallback,
    );
    if report.created > 0 || report.removed > 0 {
        tracing::debug!(created = report.created, removed = report.removed, "Navigation updated");
    }
}
