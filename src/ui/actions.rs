//! User actions: link and category CRUD, history, preferences, navigation.
//!
//! Every action validates its input before any network call, shows the
//! spinner where the page would, and hands the request to a spawned task.
//! Results come back as `AppEvent`s and are applied by the `handle_*`
//! functions at the bottom of this module.
use chrono::{SecondsFormat, Utc};

use crate::api::{
    ApiError, Category, CategoryDraft, HistoryPayload, LinkDraft, ValidationError,
};
use crate::app::{App, AppEvent, ConfirmAction, EditTarget};
use crate::dom::NodeId;
use crate::preferences::{ACCENT_KEY, THEME_KEY};
use crate::ui::time_format::RelativeTimeMode;

use super::enhance::{apply_section_states, refresh_timestamps, toggle_section};
use super::helpers::spawn_reporting;
use super::overlay::TeardownReason;
use super::reorder::check_order;
use super::status::{hide_spinner, show_spinner};
use super::table;

/// Mutating requests the page can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    UpdateChapter,
    Recheck,
    AddLink,
    EditLink,
    RemoveLink,
    Favorite,
    ForceUpdate,
    CreateCategory,
    UpdateCategory,
    DeleteCategory,
}

impl ActionKind {
    /// Spinner text while the request runs, if the action shows one.
    pub fn spinner_message(&self) -> Option<&'static str> {
        match self {
            ActionKind::UpdateChapter => Some("Updating chapter..."),
            ActionKind::Recheck => Some("Rechecking chapter..."),
            ActionKind::ForceUpdate => Some("Fully updating database..."),
            ActionKind::AddLink => Some("Adding link..."),
            ActionKind::EditLink => Some("Saving link..."),
            ActionKind::RemoveLink => Some("Removing link..."),
            ActionKind::Favorite
            | ActionKind::CreateCategory
            | ActionKind::UpdateCategory
            | ActionKind::DeleteCategory => None,
        }
    }

    /// Alert raised when the server rejects the action.
    pub fn failure_message(&self) -> &'static str {
        match self {
            ActionKind::UpdateChapter => "Failed to update chapter.",
            ActionKind::Recheck => "Failed to recheck chapter.",
            ActionKind::AddLink => "Failed to add link.",
            ActionKind::EditLink => "Failed to edit link.",
            ActionKind::RemoveLink => "Failed to remove link.",
            ActionKind::Favorite => "Failed to update favorite.",
            ActionKind::ForceUpdate => "Failed to start full update.",
            ActionKind::CreateCategory => "Failed to create category.",
            ActionKind::UpdateCategory => "Failed to update category.",
            ActionKind::DeleteCategory => "Failed to delete category.",
        }
    }

    pub fn is_category_admin(&self) -> bool {
        matches!(
            self,
            ActionKind::CreateCategory | ActionKind::UpdateCategory | ActionKind::DeleteCategory
        )
    }
}

/// Show the action's spinner and run `request` in the background.
fn spawn_action<F>(app: &mut App, action: ActionKind, request: F)
where
    F: std::future::Future<Output = Result<(), ApiError>> + Send + 'static,
{
    if let Some(message) = action.spinner_message() {
        show_spinner(&mut app.doc, message);
    }
    tracing::debug!(?action, category = %app.ui.active_category, "Starting action");
    spawn_reporting("action", app.event_tx(), async move {
        AppEvent::ActionFinished {
            action,
            result: request.await,
        }
    });
}

/// Validation failures surface as alerts and never reach the network.
fn reject(app: &mut App, err: ValidationError) -> ValidationError {
    tracing::debug!(error = %err, "Rejected invalid input");
    app.alert(err.to_string());
    err
}

// ============================================================================
// Links
// ============================================================================

/// Mark the newest chapter of `url` as read.
pub fn update_chapter(app: &mut App, url: &str) {
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    let url = url.to_string();
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    spawn_action(app, ActionKind::UpdateChapter, async move {
        api.update_chapter(&category, &url, &timestamp).await
    });
}

pub fn recheck(app: &mut App, url: &str) {
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    let url = url.to_string();
    spawn_action(app, ActionKind::Recheck, async move {
        api.recheck(&category, &url).await
    });
}

pub fn add_link(app: &mut App, draft: LinkDraft) -> Result<(), ValidationError> {
    let draft = draft.normalized().map_err(|e| reject(app, e))?;
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    spawn_action(app, ActionKind::AddLink, async move {
        api.add_link(&category, &draft).await
    });
    Ok(())
}

/// Open the edit target for the row whose menu container carries `url`.
///
/// The name comes from `data-name`, falling back to the row's title link.
/// `free_only` only sticks when the source supports free filtering.
pub fn open_edit<'a>(app: &'a mut App, url: &str) -> Option<&'a EditTarget> {
    let container = app
        .doc
        .query_class(app.doc.body(), "menu-container")
        .into_iter()
        .find(|c| app.doc.attr(*c, "data-url") == Some(url));
    let Some(container) = container else {
        tracing::warn!(url, "No menu container for edit target");
        return None;
    };

    let doc = &app.doc;
    let name = doc
        .attr(container, "data-name")
        .map(str::to_string)
        .or_else(|| {
            let row = doc.closest_tag(container, "tr")?;
            let link = doc.query_tag_class(row, "a", "domain-tooltip")?;
            Some(doc.text_content(link))
        })
        .unwrap_or_default()
        .trim()
        .to_string();
    let supports_free = doc.attr(container, "data-supports-free") == Some("true");
    let free_only = supports_free && doc.attr(container, "data-free-only") == Some("true");
    let update_frequency = doc
        .attr(container, "data-update-frequency")
        .filter(|f| !f.trim().is_empty())
        .map(str::to_string);

    app.edit_target = Some(EditTarget {
        original_url: url.to_string(),
        name,
        url: url.to_string(),
        update_frequency,
        free_only,
        supports_free,
    });
    app.needs_redraw = true;
    app.edit_target.as_ref()
}

/// Submit the open edit target with the user's changes applied.
pub fn submit_edit(app: &mut App, changes: EditTarget) -> Result<(), ValidationError> {
    let Some(target) = app.edit_target.take() else {
        return Ok(());
    };
    let draft = LinkDraft {
        name: changes.name,
        url: changes.url,
        free_only: changes.free_only && target.supports_free,
        update_frequency: changes.update_frequency,
    };
    let draft = match draft.normalized() {
        Ok(draft) => draft,
        Err(e) => {
            app.edit_target = Some(target);
            return Err(reject(app, e));
        }
    };
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    spawn_action(app, ActionKind::EditLink, async move {
        api.edit_link(&category, &target.original_url, &draft).await
    });
    Ok(())
}

pub fn cancel_edit(app: &mut App) {
    app.edit_target = None;
    app.needs_redraw = true;
}

/// Ask for confirmation before removing `url`.
pub fn request_remove(app: &mut App, url: &str) {
    app.pending_confirm = Some(ConfirmAction::RemoveLink {
        url: url.to_string(),
    });
    app.needs_redraw = true;
}

/// Answer the pending confirmation. Declining just drops it.
pub fn confirm(app: &mut App, accepted: bool) {
    let Some(action) = app.pending_confirm.take() else {
        return;
    };
    app.needs_redraw = true;
    if !accepted {
        tracing::debug!(?action, "Confirmation declined");
        return;
    }
    match action {
        ConfirmAction::RemoveLink { url } => {
            let api = app.api.clone();
            let category = app.ui.active_category.clone();
            spawn_action(app, ActionKind::RemoveLink, async move {
                api.remove_link(&category, &url).await
            });
        }
        ConfirmAction::DeleteCategory { name } => {
            let api = app.api.clone();
            spawn_action(app, ActionKind::DeleteCategory, async move {
                api.delete_category(&name).await
            });
        }
    }
}

pub fn set_favorite(app: &mut App, url: &str, favorite: bool) {
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    let url = url.to_string();
    spawn_action(app, ActionKind::Favorite, async move {
        api.set_favorite(&category, &url, favorite).await
    });
}

/// Start a full update. The spinner stays up until the channel reports completion.
pub fn force_update(app: &mut App) {
    app.ui.update_in_progress = true;
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    spawn_action(app, ActionKind::ForceUpdate, async move {
        api.force_update(&category).await
    });
}

// ============================================================================
// History
// ============================================================================

fn spawn_history<F>(app: &mut App, url: String, changed: bool, request: F)
where
    F: std::future::Future<Output = Result<HistoryPayload, ApiError>> + Send + 'static,
{
    spawn_reporting("history", app.event_tx(), async move {
        AppEvent::HistoryLoaded {
            url,
            changed,
            result: request.await,
        }
    });
}

pub fn load_history(app: &mut App, url: &str) {
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    let url = url.to_string();
    let request_url = url.clone();
    spawn_history(app, url, false, async move {
        api.history(&category, &request_url).await
    });
}

fn loaded_history_url(app: &mut App) -> Result<String, ValidationError> {
    if let Some(history) = &app.history {
        return Ok(history.url.clone());
    }
    Err(reject(app, ValidationError::HistoryNotLoaded))
}

/// Make `entry_id` the saved chapter of the loaded history's link.
pub fn set_saved_entry(app: &mut App, entry_id: i64) -> Result<(), ValidationError> {
    let url = loaded_history_url(app)?;
    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    let request_url = url.clone();
    spawn_history(app, url, true, async move {
        api.set_saved_entry(&category, &request_url, entry_id).await
    });
    Ok(())
}

/// Delete a history entry. Locked entries are refused without a request.
pub fn delete_history_entry(app: &mut App, entry_id: i64) -> Result<(), ValidationError> {
    let url = loaded_history_url(app)?;
    let gate = app
        .history
        .as_ref()
        .map_or(Ok(()), |h| h.check_deletable(entry_id));
    gate.map_err(|e| reject(app, e))?;

    let api = app.api.clone();
    let category = app.ui.active_category.clone();
    let request_url = url.clone();
    spawn_history(app, url, true, async move {
        api.delete_history_entry(&category, &request_url, entry_id)
            .await
    });
    Ok(())
}

pub fn close_history(app: &mut App) {
    app.history = None;
    app.needs_redraw = true;
}

// ============================================================================
// Categories
// ============================================================================

/// Poll the category list. The result feeds the navigation reconciler.
pub fn refresh_categories(app: &mut App) {
    let api = app.api.clone();
    spawn_reporting("categories", app.event_tx(), async move {
        AppEvent::CategoriesLoaded(api.list_categories().await)
    });
}

pub fn create_category(app: &mut App, draft: CategoryDraft) -> Result<(), ValidationError> {
    draft.validate().map_err(|e| reject(app, e))?;
    let api = app.api.clone();
    spawn_action(app, ActionKind::CreateCategory, async move {
        api.create_category(&draft).await
    });
    Ok(())
}

pub fn update_category(app: &mut App, draft: CategoryDraft) -> Result<(), ValidationError> {
    draft.validate().map_err(|e| reject(app, e))?;
    let api = app.api.clone();
    spawn_action(app, ActionKind::UpdateCategory, async move {
        api.update_category(&draft.name, &draft).await
    });
    Ok(())
}

/// Ask for confirmation before deleting category `name`.
pub fn request_delete_category(app: &mut App, name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(reject(app, ValidationError::MissingCategoryName));
    }
    app.pending_confirm = Some(ConfirmAction::DeleteCategory {
        name: name.to_string(),
    });
    app.needs_redraw = true;
    Ok(())
}

/// Reorder navigation optimistically and queue the write.
///
/// Orders with fewer than two names change nothing.
pub fn enqueue_reorder(app: &mut App, order: Vec<String>) -> Result<(), ValidationError> {
    if let Err(e) = check_order(&order) {
        tracing::debug!(?order, "Ignoring reorder with fewer than two categories");
        return Err(e);
    }
    app.ui.reorder_cached(&order);
    table::render_nav(app);
    app.reorder.enqueue(order)
}

/// Make `category` the active one and load its table.
pub fn switch_category(app: &mut App, category: &str) {
    let category = category.trim();
    if category.is_empty() || app.ui.is_active(category) {
        return;
    }
    tracing::info!(from = %app.ui.active_category, to = category, "Switching category");
    app.ui.switch_category(category);
    app.floating.teardown(&mut app.doc, TeardownReason::PageHide);
    app.edit_target = None;
    app.history = None;
    app.pending_confirm = None;

    let body = app.doc.body();
    app.doc.set_attr(body, "data-category", category);
    let saved = app.prefs.sections(category);
    apply_section_states(&mut app.doc, body, &saved);
    hide_spinner(&mut app.doc);

    if let Some(channel) = &app.channel {
        channel.set_category(category);
    }
    table::render_nav(app);
    table::refresh(app);
}

// ============================================================================
// Preferences
// ============================================================================

pub fn set_relative_time(app: &mut App, mode: RelativeTimeMode) {
    app.prefs.set_relative_time(mode);
    app.ui.relative_time = mode;
    let body = app.doc.body();
    let count = refresh_timestamps(&mut app.doc, body, mode, chrono::Local::now());
    tracing::debug!(%mode, count, "Re-rendered timestamps");
}

pub fn set_theme(app: &mut App, theme: &str) {
    let theme = theme.trim();
    if theme.is_empty() {
        return;
    }
    app.prefs.set(THEME_KEY, theme);
    app.ui.theme = theme.to_string();
    let body = app.doc.body();
    app.doc.set_attr(body, "data-theme", theme);
}

pub fn set_accent(app: &mut App, accent: &str) {
    let accent = accent.trim();
    if accent.is_empty() {
        return;
    }
    app.prefs.set(ACCENT_KEY, accent);
    app.ui.accent = accent.to_string();
    let body = app.doc.body();
    app.doc.set_attr(body, "data-accent", accent);
}

/// Flip a section and persist the new state for the active category.
pub fn toggle_section_header(app: &mut App, header: NodeId) {
    if let Some((section, collapsed)) = toggle_section(&mut app.doc, header) {
        let category = app.ui.active_category.clone();
        app.prefs
            .set_section_collapsed(&category, &section, collapsed);
    }
}

// ============================================================================
// Results
// ============================================================================

pub fn handle_action_finished(app: &mut App, action: ActionKind, result: Result<(), ApiError>) {
    match result {
        // Completion of a full update arrives over the live channel.
        Ok(()) if action == ActionKind::ForceUpdate => {
            tracing::info!("Full update started");
        }
        Ok(()) => {
            tracing::info!(?action, "Action succeeded");
            if action.is_category_admin() {
                refresh_categories(app);
            } else {
                table::refresh(app);
            }
        }
        Err(e) if e.is_transport() => {
            tracing::warn!(?action, error = %e, "Action request failed");
            if action == ActionKind::ForceUpdate {
                app.ui.update_in_progress = false;
            }
            hide_spinner(&mut app.doc);
        }
        Err(e) => {
            tracing::error!(?action, error = %e, "Server rejected action");
            if action == ActionKind::ForceUpdate {
                app.ui.update_in_progress = false;
            }
            hide_spinner(&mut app.doc);
            app.alert(action.failure_message());
        }
    }
}

pub fn handle_history_loaded(
    app: &mut App,
    url: String,
    changed: bool,
    result: Result<HistoryPayload, ApiError>,
) {
    match result {
        Ok(history) => {
            tracing::debug!(url = %url, entries = history.history.len(), "History loaded");
            app.history = Some(history);
            if changed {
                table::refresh(app);
            }
        }
        Err(e) if e.is_transport() => {
            tracing::warn!(url = %url, error = %e, "History request failed");
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Server rejected history request");
            app.alert(if changed {
                "Failed to update history."
            } else {
                "Failed to load history."
            });
        }
    }
}

pub fn handle_categories_loaded(app: &mut App, result: Result<Vec<Category>, ApiError>) {
    match result {
        Ok(categories) => {
            tracing::debug!(count = categories.len(), "Category list refreshed");
            app.ui.set_categories(categories);
            table::render_nav(app);
        }
        Err(e) => tracing::warn!(error = %e, "Category poll failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TrackerApi;
    use crate::config::Config;
    use crate::dom::{parse_fragment, Viewport};
    use crate::preferences::PreferenceManager;
    use crate::ui::status::{spinner_message, spinner_visible};
    use crate::ui::table::DIFFERENCES_BODY_ID;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn app_for(server: &str) -> (App, mpsc::Receiver<AppEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let api = TrackerApi::new(server, Duration::from_secs(2)).unwrap();
        let prefs = PreferenceManager::from_config(&Config::default());
        let app = App::new(api, prefs, "manga", Viewport::new(1280.0, 800.0), tx);
        (app, rx)
    }

    fn mount_rows(app: &mut App, markup: &str) {
        let tbody = app.doc.get_element_by_id(DIFFERENCES_BODY_ID).unwrap();
        let rows = parse_fragment(&mut app.doc, markup);
        app.doc.replace_children(tbody, rows);
        app.enhance(tbody);
    }

    const ROW: &str = r#"<tr><td><span><a class="domain-tooltip" href="https://example.com/s/1"> Tower Climber </a><span class="tooltiptext"></span></span></td>
        <td><div class="menu-container" data-url="https://example.com/s/1" data-update-frequency="12" data-free-only="true" data-supports-free="true">
        <button class="menu-toggle">...</button><div class="menu-actions"><button class="edit">Edit</button></div></div></td></tr>"#;

    #[tokio::test]
    async fn test_open_edit_reads_container_attributes() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        mount_rows(&mut app, ROW);

        let target = open_edit(&mut app, "https://example.com/s/1").cloned().unwrap();
        assert_eq!(
            target,
            EditTarget {
                original_url: "https://example.com/s/1".into(),
                name: "Tower Climber".into(),
                url: "https://example.com/s/1".into(),
                update_frequency: Some("12".into()),
                free_only: true,
                supports_free: true,
            }
        );
    }

    #[tokio::test]
    async fn test_free_only_requires_support() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        mount_rows(&mut app, &ROW.replace(r#"data-supports-free="true""#, ""));
        let target = open_edit(&mut app, "https://example.com/s/1").unwrap();
        assert!(!target.free_only);
        assert!(!target.supports_free);
    }

    #[tokio::test]
    async fn test_open_edit_unknown_url() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        assert!(open_edit(&mut app, "https://nope").is_none());
        assert!(app.edit_target.is_none());
    }

    #[tokio::test]
    async fn test_add_link_rejects_blank_input_before_network() {
        let (mut app, mut rx) = app_for("http://127.0.0.1:9");
        let draft = LinkDraft {
            name: "  ".into(),
            url: "https://example.com".into(),
            ..Default::default()
        };
        assert_eq!(add_link(&mut app, draft), Err(ValidationError::MissingNameOrUrl));
        assert_eq!(app.take_alerts(), vec!["Please enter both name and URL."]);
        assert!(!spinner_visible(&app.doc));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_waits_for_confirmation() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        request_remove(&mut app, "https://example.com/s/1");
        assert!(!spinner_visible(&app.doc));
        assert_eq!(
            app.pending_confirm.as_ref().map(|c| c.prompt().into_owned()),
            Some("Are you sure you want to remove this link?".to_string())
        );

        confirm(&mut app, false);
        assert!(app.pending_confirm.is_none());
        assert!(!spinner_visible(&app.doc));
    }

    #[tokio::test]
    async fn test_history_mutation_requires_loaded_history() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        assert_eq!(
            delete_history_entry(&mut app, 1),
            Err(ValidationError::HistoryNotLoaded)
        );
        assert_eq!(set_saved_entry(&mut app, 1), Err(ValidationError::HistoryNotLoaded));
    }

    #[tokio::test]
    async fn test_category_admin_validates_and_confirms() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        let blank = CategoryDraft {
            name: "  ".into(),
            ..Default::default()
        };
        assert_eq!(
            create_category(&mut app, blank),
            Err(ValidationError::MissingCategoryName)
        );
        assert_eq!(app.take_alerts().len(), 1);

        request_delete_category(&mut app, " novels ").unwrap();
        assert_eq!(
            app.pending_confirm,
            Some(ConfirmAction::DeleteCategory {
                name: "novels".into()
            })
        );
        confirm(&mut app, false);
        assert!(app.pending_confirm.is_none());
        assert!(!spinner_visible(&app.doc));
    }

    #[tokio::test]
    async fn test_short_reorder_changes_nothing() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        app.ui.set_categories(vec![Category::named("main"), Category::named("manga")]);
        let before = app.ui.category_names();
        let rev = app.doc.revision();
        assert_eq!(
            enqueue_reorder(&mut app, vec!["manga".into()]),
            Err(ValidationError::NothingToReorder)
        );
        assert_eq!(app.ui.category_names(), before);
        assert_eq!(app.doc.revision(), rev);
    }

    #[tokio::test]
    async fn test_server_rejection_alerts_and_clears_spinner() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        show_spinner(&mut app.doc, "Removing link...");
        handle_action_finished(
            &mut app,
            ActionKind::RemoveLink,
            Err(ApiError::Rejected {
                action: "remove",
                message: None,
            }),
        );
        assert!(!spinner_visible(&app.doc));
        assert_eq!(app.take_alerts(), vec!["Failed to remove link."]);
    }

    #[tokio::test]
    async fn test_force_update_keeps_spinner_on_success() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        show_spinner(&mut app.doc, "Fully updating database...");
        app.ui.update_in_progress = true;
        handle_action_finished(&mut app, ActionKind::ForceUpdate, Ok(()));
        assert!(spinner_visible(&app.doc));
        assert_eq!(
            spinner_message(&app.doc).as_deref(),
            Some("Fully updating database...")
        );
        assert!(app.ui.update_in_progress);
    }

    #[tokio::test]
    async fn test_relative_time_change_rerenders() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        let stamp = app
            .doc
            .get_element_by_id(table::LAST_FULL_UPDATE_ID)
            .unwrap();
        app.doc.set_attr(stamp, "data-timestamp", "2020-01-02T03:04:00");
        set_relative_time(&mut app, RelativeTimeMode::Off);
        assert_eq!(app.doc.text_content(stamp), "2020-01-02 03:04");
        assert_eq!(app.prefs.relative_time(), RelativeTimeMode::Off);
    }

    #[tokio::test]
    async fn test_switch_category_resets_page_state() {
        let (mut app, _rx) = app_for("http://127.0.0.1:9");
        request_remove(&mut app, "u");
        let generation = app.table.generation();
        switch_category(&mut app, "novels");
        assert_eq!(app.ui.active_category, "novels");
        assert_eq!(app.doc.attr(app.doc.body(), "data-category"), Some("novels"));
        assert!(app.pending_confirm.is_none());
        assert_eq!(app.table.generation(), generation + 1);

        // Same category again is a no-op.
        switch_category(&mut app, "novels");
        assert_eq!(app.table.generation(), generation + 1);
    }
}
