use std::borrow::Cow;
use std::collections::VecDeque;

use chrono::Local;
use tokio::sync::mpsc;

use crate::api::{ApiError, Category, ChaptersPayload, HistoryPayload, TrackerApi};
use crate::channel::{ChannelClient, ChannelEvent, ChannelStatus};
use crate::dom::{Document, NodeId, Viewport};
use crate::preferences::PreferenceManager;
use crate::ui::actions::ActionKind;
use crate::ui::bindings::Bindings;
use crate::ui::enhance::{enhance, EnhanceContext, EnhanceReport, DEFAULT_TIME_FALLBACK};
use crate::ui::nav::NAV_LIST_ID;
use crate::ui::overlay::{FloatingLayer, FLOATING_ROOT_ID};
use crate::ui::reorder::ReorderQueue;
use crate::ui::state::UiState;
use crate::ui::status::{OVERLAY_ID, PROGRESS_FILL_ID, STATUS_MESSAGE_ID};
use crate::ui::table::{
    TableRefresher, DIFFERENCES_BODY_ID, DIFFERENCES_COUNT_ID, LAST_FULL_UPDATE_ID, SAME_BODY_ID,
    SAME_COUNT_ID,
};

/// Alerts kept for the host before the oldest are dropped.
const MAX_ALERTS: usize = 32;

// ============================================================================
// Events
// ============================================================================

/// Results reported to the event loop by spawned tasks and the live channel.
#[derive(Debug)]
pub enum AppEvent {
    /// A frame from the live channel, not yet filtered by category.
    Channel(ChannelEvent),
    ChannelStatus(ChannelStatus),
    /// Table fetch finished.
    ///
    /// Fields:
    /// - `generation`: token issued when the fetch was started
    /// - `category`: category the fetch was made for
    /// - `result`: both fragment groups, or the failure
    ChaptersLoaded {
        generation: u64,
        category: String,
        result: Result<ChaptersPayload, ApiError>,
    },
    /// Category list poll finished.
    CategoriesLoaded(Result<Vec<Category>, ApiError>),
    ReorderSaved {
        order: Vec<String>,
        categories: Vec<Category>,
    },
    ReorderFailed {
        order: Vec<String>,
        error: String,
    },
    /// A link or category action finished.
    ActionFinished {
        action: ActionKind,
        result: Result<(), ApiError>,
    },
    /// History fetch or history mutation finished.
    ///
    /// `changed` is set for mutations, whose effect also shows in the table.
    HistoryLoaded {
        url: String,
        changed: bool,
        result: Result<HistoryPayload, ApiError>,
    },
    /// A background task panicked.
    ///
    /// Fields:
    /// - `task`: name of the task (e.g. "table_refresh", "reorder")
    /// - `error`: the panic message extracted from the payload
    TaskPanicked {
        task: &'static str,
        error: String,
    },
}

// ============================================================================
// Confirmation and Edit State
// ============================================================================

/// Pending confirmation for destructive operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    /// Remove a tracked link from the active category.
    RemoveLink { url: String },
    /// Delete a category and all its links.
    DeleteCategory { name: String },
}

impl ConfirmAction {
    pub fn prompt(&self) -> Cow<'static, str> {
        match self {
            ConfirmAction::RemoveLink { .. } => {
                Cow::Borrowed("Are you sure you want to remove this link?")
            }
            ConfirmAction::DeleteCategory { name } => Cow::Owned(format!(
                "Delete category \"{}\" and all of its links?",
                name
            )),
        }
    }
}

/// Work scheduled to run after the current dispatch completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTask {
    /// Let outside clicks close this menu from the next event on.
    ArmMenuOutsideClose(NodeId),
}

/// Link being edited, pre-filled from the row's menu container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditTarget {
    pub original_url: String,
    pub name: String,
    pub url: String,
    pub update_frequency: Option<String>,
    pub free_only: bool,
    pub supports_free: bool,
}

// ============================================================================
// App
// ============================================================================

/// All page state. Owned by the event loop and mutated one event at a time.
pub struct App {
    pub doc: Document,
    pub ui: UiState,
    pub floating: FloatingLayer,
    pub bindings: Bindings,
    pub prefs: PreferenceManager,
    pub api: TrackerApi,
    pub table: TableRefresher,
    pub reorder: ReorderQueue,
    /// Live channel; `None` until [`App::connect_channel`] runs.
    pub channel: Option<ChannelClient>,

    /// Runs after each dispatched DOM event, in push order.
    pub deferred: VecDeque<DeferredTask>,
    pub pending_confirm: Option<ConfirmAction>,
    pub edit_target: Option<EditTarget>,
    /// Last loaded history, for the link it belongs to.
    pub history: Option<HistoryPayload>,
    /// User-facing alerts, oldest first. Drained by the host.
    pub alerts: VecDeque<String>,

    pub should_quit: bool,
    pub needs_redraw: bool,

    event_tx: mpsc::Sender<AppEvent>,
}

impl App {
    /// Build the page skeleton and its state. Must run inside a tokio runtime.
    pub fn new(
        api: TrackerApi,
        prefs: PreferenceManager,
        active_category: &str,
        viewport: Viewport,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        let mut doc = Document::new(viewport);
        build_page(&mut doc, active_category);
        let ui = UiState::init(active_category, Vec::new(), &prefs);
        let reorder = ReorderQueue::spawn(api.clone(), event_tx.clone());

        let mut app = Self {
            doc,
            ui,
            floating: FloatingLayer::new(),
            bindings: Bindings::new(),
            prefs,
            api,
            table: TableRefresher::new(),
            reorder,
            channel: None,
            deferred: VecDeque::new(),
            pending_confirm: None,
            edit_target: None,
            history: None,
            alerts: VecDeque::new(),
            should_quit: false,
            needs_redraw: true,
            event_tx,
        };
        let body = app.doc.body();
        app.enhance(body);
        crate::ui::table::render_nav(&mut app);
        app
    }

    pub fn event_tx(&self) -> &mpsc::Sender<AppEvent> {
        &self.event_tx
    }

    /// Open the live channel for the active category.
    pub fn connect_channel(&mut self, url: url::Url, reconnect_delay: std::time::Duration) {
        let client = ChannelClient::spawn(
            url,
            &self.ui.active_category,
            reconnect_delay,
            self.event_tx.clone(),
        );
        self.channel = Some(client);
    }

    /// Run the enhancement pass over `root` with the current preferences.
    pub fn enhance(&mut self, root: NodeId) -> EnhanceReport {
        let sections = self.prefs.sections(&self.ui.active_category);
        let ctx = EnhanceContext {
            mode: self.ui.relative_time,
            now: Local::now(),
            sections: &sections,
        };
        enhance(&mut self.doc, &mut self.bindings, root, &ctx)
    }

    /// Raise a user-facing alert.
    pub fn alert(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(alert = %msg, "Alert raised");
        if self.alerts.len() >= MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(msg);
        self.needs_redraw = true;
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        self.alerts.drain(..).collect()
    }

    /// Run every deferred task queued during the last dispatch.
    pub fn run_deferred(&mut self) {
        while let Some(task) = self.deferred.pop_front() {
            match task {
                DeferredTask::ArmMenuOutsideClose(menu) => self.floating.arm_outside_close(menu),
            }
        }
    }
}

// ============================================================================
// Page Skeleton
// ============================================================================

/// Append an element with an optional id and classes.
fn element(
    doc: &mut Document,
    parent: NodeId,
    tag: &str,
    id: Option<&str>,
    classes: &[&str],
) -> NodeId {
    let node = doc.create_element(tag);
    if let Some(id) = id {
        doc.set_attr(node, "id", id);
    }
    for class in classes {
        doc.add_class(node, class);
    }
    doc.append_child(parent, node);
    node
}

/// Build the static page shell the server would render around the tables.
pub fn build_page(doc: &mut Document, active_category: &str) {
    let body = doc.body();
    doc.set_attr(body, "data-category", active_category);

    let nav = element(doc, body, "nav", None, &[]);
    element(doc, nav, "ul", Some(NAV_LIST_ID), &[]);

    let overlay = element(doc, body, "div", Some(OVERLAY_ID), &[]);
    element(doc, overlay, "div", Some(STATUS_MESSAGE_ID), &[]);
    let bar = element(doc, overlay, "div", None, &["progress-bar"]);
    element(doc, bar, "div", Some(PROGRESS_FILL_ID), &[]);

    let info = element(doc, body, "p", None, &["last-update"]);
    let stamp = element(doc, info, "span", Some(LAST_FULL_UPDATE_ID), &["relative-time"]);
    doc.set_attr(stamp, "data-timestamp", "");
    doc.set_attr(stamp, "data-fallback", DEFAULT_TIME_FALLBACK);

    let sections = [
        ("differences", "Updates", DIFFERENCES_COUNT_ID, DIFFERENCES_BODY_ID),
        ("same", "Up to date", SAME_COUNT_ID, SAME_BODY_ID),
    ];
    for (section, title, count_id, body_id) in sections {
        let header = element(doc, body, "div", None, &["table-header"]);
        let h2 = element(doc, header, "h2", None, &["toggle"]);
        doc.set_attr(h2, "data-section", section);
        let label = doc.create_text(&format!("{} ", title));
        doc.append_child(h2, label);
        let count = element(doc, h2, "span", Some(count_id), &["count"]);
        doc.set_text(count, "0");

        let content = element(doc, body, "div", None, &["table-content"]);
        let table = element(doc, content, "table", None, &[]);
        element(doc, table, "tbody", Some(body_id), &[]);
    }

    element(doc, body, "div", Some(FLOATING_ROOT_ID), &[]);
}
