//! Plain-text view of the page for the terminal host.
//!
//! Everything shown comes from the document, except for the confirmation,
//! edit target and history panes which live on `App`. Server text is
//! stripped of control characters before it is printed.

use std::fmt::Write;

use crate::app::App;
use crate::dom::{Document, NodeId};
use crate::util::{strip_control_chars, truncate_chars};

use super::nav::NAV_LIST_ID;
use super::status::{spinner_message, spinner_visible};
use super::table::{DIFFERENCES_BODY_ID, LAST_FULL_UPDATE_ID, SAME_BODY_ID};
use super::time_format::{format_timestamp, RelativeTimeMode};

/// Longest row line printed.
const MAX_ROW_WIDTH: usize = 110;

/// Collapse whitespace runs and sanitise.
fn clean(text: &str) -> String {
    let stripped = strip_control_chars(text);
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn nav_line(doc: &Document) -> String {
    let Some(list) = doc.get_element_by_id(NAV_LIST_ID) else {
        return String::new();
    };
    doc.element_children(list)
        .into_iter()
        .map(|li| {
            let label = doc
                .query_class_first(li, "nav-label")
                .map(|n| clean(&doc.text_content(n)))
                .unwrap_or_default();
            let count = doc
                .query_class_first(li, "nav-count")
                .filter(|n| doc.attr(*n, "hidden").is_none())
                .map(|n| format!(" ({})", doc.text_content(n)))
                .unwrap_or_default();
            if doc.has_class(li, "active") {
                format!("[{}{}]", label, count)
            } else {
                format!("{}{}", label, count)
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn section(doc: &Document, out: &mut String, body_id: &str) {
    let Some(tbody) = doc.get_element_by_id(body_id) else {
        return;
    };
    let table = doc.parent(tbody).unwrap_or(tbody);
    let content = doc.parent(table).unwrap_or(table);
    // The header wrapper is the element right before the content block.
    let header = doc
        .parent(content)
        .and_then(|parent| {
            doc.element_children(parent)
                .into_iter()
                .take_while(|n| *n != content)
                .last()
        })
        .and_then(|wrapper| doc.query_tag_class(wrapper, "h2", "toggle"));

    let title = header
        .map(|h| clean(&doc.text_content(h)))
        .unwrap_or_else(|| body_id.to_string());
    let collapsed = doc.has_class(content, "collapsed");
    let _ = writeln!(out, "== {}{} ==", title, if collapsed { " (collapsed)" } else { "" });
    if collapsed {
        return;
    }
    let rows: Vec<NodeId> = doc.element_children(tbody);
    if rows.is_empty() {
        let _ = writeln!(out, "   (none)");
    }
    for row in rows {
        let line = clean(&row_text(doc, row));
        let _ = writeln!(out, "   {}", truncate_chars(&line, MAX_ROW_WIDTH));
    }
}

/// Row text without the hidden tooltip and menu contents.
fn row_text(doc: &Document, node: NodeId) -> String {
    if doc.has_class(node, "tooltiptext") || doc.has_class(node, "menu-actions") {
        return String::new();
    }
    if !doc.is_element(node) {
        return doc.text_content(node);
    }
    doc.children(node)
        .iter()
        .map(|child| row_text(doc, *child))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Render the whole page. Drains pending alerts.
pub fn render(app: &mut App) -> String {
    let mut out = String::new();
    let doc = &app.doc;

    let live = if app.ui.channel_connected { "live" } else { "offline" };
    let _ = writeln!(
        out,
        "chapterwatch - {} [{}] theme {}/{} time {}",
        app.ui.active_category, live, app.ui.theme, app.ui.accent, app.ui.relative_time
    );
    let _ = writeln!(out, "{}", nav_line(doc));
    if let Some(stamp) = doc.get_element_by_id(LAST_FULL_UPDATE_ID) {
        let _ = writeln!(out, "Last full update: {}", clean(&doc.text_content(stamp)));
    }
    if spinner_visible(doc) {
        let _ = writeln!(
            out,
            ">> {}",
            spinner_message(doc).map(|m| clean(&m)).unwrap_or_default()
        );
    }

    section(doc, &mut out, DIFFERENCES_BODY_ID);
    section(doc, &mut out, SAME_BODY_ID);

    for tooltip in app.floating.tooltips() {
        let _ = writeln!(out, "(tooltip) {}", clean(&doc.text_content(tooltip.node)));
    }
    if let Some(menu) = app.floating.menu() {
        let labels: Vec<String> = doc
            .element_children(menu.node)
            .into_iter()
            .map(|b| clean(&doc.text_content(b)))
            .collect();
        let _ = writeln!(out, "(menu) {}", labels.join(" | "));
    }

    if let Some(target) = &app.edit_target {
        let _ = writeln!(
            out,
            "Editing {}: name=\"{}\" url={} freq={} free={}{}",
            target.original_url,
            clean(&target.name),
            target.url,
            target.update_frequency.as_deref().unwrap_or("-"),
            target.free_only,
            if target.supports_free { "" } else { " (unsupported)" }
        );
    }
    if let Some(history) = &app.history {
        let _ = writeln!(out, "History of {} ({}):", clean(&history.name), history.url);
        for entry in &history.history {
            let when = format_timestamp(
                entry.timestamp.as_deref(),
                "unknown",
                RelativeTimeMode::Off,
                chrono::Local::now(),
            );
            let mut flags = Vec::new();
            if entry.is_latest {
                flags.push("latest");
            }
            if history.last_saved.as_deref() == Some(entry.last_found.as_str()) {
                flags.push("saved");
            }
            let _ = writeln!(
                out,
                "   #{} {} {} {}",
                entry.entry_id,
                clean(&entry.last_found),
                when.text,
                flags.join(",")
            );
        }
    }
    if let Some(confirm) = &app.pending_confirm {
        let _ = writeln!(out, "? {} (yes/no)", confirm.prompt());
    }

    for alert in app.take_alerts() {
        let _ = writeln!(out, "! {}", alert);
    }
    out
}
