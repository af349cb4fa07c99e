//! Application event handling.
//!
//! Applies results reported by background tasks and frames from the live
//! channel. Every handler runs to completion on the loop before the next
//! event is taken, so each one sees and leaves a consistent page.

use crate::app::{App, AppEvent};
use crate::channel::{ChannelEvent, ChannelStatus};

use super::actions;
use super::status::{hide_spinner, show_progress};
use super::table;

/// Handle one event from the loop's channel.
pub fn handle_app_event(app: &mut App, event: AppEvent) {
    match event {
        AppEvent::Channel(event) => handle_channel_event(app, event),

        AppEvent::ChannelStatus(status) => {
            app.ui.channel_connected = status == ChannelStatus::Connected;
            tracing::debug!(?status, "Live channel status changed");
        }

        AppEvent::ChaptersLoaded {
            generation,
            category,
            result,
        } => table::apply_chapters(app, generation, &category, result),

        AppEvent::CategoriesLoaded(result) => actions::handle_categories_loaded(app, result),

        AppEvent::ReorderSaved { order, categories } => {
            tracing::debug!(?order, "Applying server category order");
            app.ui.set_categories(categories);
            table::render_nav(app);
        }

        AppEvent::ReorderFailed { order, error } => {
            // The optimistic order stays in place.
            tracing::warn!(?order, error = %error, "Keeping optimistic category order");
            app.alert("Failed to save category order.");
        }

        AppEvent::ActionFinished { action, result } => {
            actions::handle_action_finished(app, action, result)
        }

        AppEvent::HistoryLoaded {
            url,
            changed,
            result,
        } => actions::handle_history_loaded(app, url, changed, result),

        AppEvent::TaskPanicked { task, error } => {
            tracing::error!(task, error = %error, "Background task panicked");
            hide_spinner(&mut app.doc);
            app.alert(format!("Internal error in {}", task));
        }
    }
}

/// Progress and completion frames. Frames for another category are dropped
/// before anything is touched.
fn handle_channel_event(app: &mut App, event: ChannelEvent) {
    if !app.ui.is_active(event.category()) {
        tracing::debug!(
            category = event.category(),
            active = %app.ui.active_category,
            "Ignoring live event for another category"
        );
        return;
    }
    match event {
        ChannelEvent::Progress(progress) => {
            app.ui.update_in_progress = true;
            show_progress(&mut app.doc, &progress);
        }
        ChannelEvent::Complete { category } => {
            tracing::info!(category = %category, "Update complete, refreshing table");
            app.ui.update_in_progress = false;
            hide_spinner(&mut app.doc);
            table::refresh(app);
        }
    }
}
