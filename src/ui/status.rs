//! Spinner overlay: `#overlay`, `#statusMessage` and `#progressFill`.
use crate::channel::ProgressEvent;
use crate::dom::Document;

pub const OVERLAY_ID: &str = "overlay";
pub const STATUS_MESSAGE_ID: &str = "statusMessage";
pub const PROGRESS_FILL_ID: &str = "progressFill";

/// Show the overlay with `message`. Missing elements are skipped.
pub fn show_spinner(doc: &mut Document, message: &str) {
    if let Some(text) = doc.get_element_by_id(STATUS_MESSAGE_ID) {
        doc.set_text(text, message);
    }
    if let Some(overlay) = doc.get_element_by_id(OVERLAY_ID) {
        doc.add_class(overlay, "show");
    }
}

/// Show `Updating... current/total` and set the fill width.
pub fn show_progress(doc: &mut Document, progress: &ProgressEvent) {
    show_spinner(
        doc,
        &format!("Updating... {}/{}", progress.current, progress.total),
    );
    if let Some(fill) = doc.get_element_by_id(PROGRESS_FILL_ID) {
        let width = format!("{}%", (progress.percent() * 100.0).round() / 100.0);
        doc.set_style(fill, "width", &width);
    }
}

pub fn hide_spinner(doc: &mut Document) {
    if let Some(overlay) = doc.get_element_by_id(OVERLAY_ID) {
        doc.remove_class(overlay, "show");
    }
}

pub fn spinner_visible(doc: &Document) -> bool {
    doc.get_element_by_id(OVERLAY_ID)
        .is_some_and(|overlay| doc.has_class(overlay, "show"))
}

pub fn spinner_message(doc: &Document) -> Option<String> {
    doc.get_element_by_id(STATUS_MESSAGE_ID)
        .map(|text| doc.text_content(text))
}
