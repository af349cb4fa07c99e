//! Enhancement pass: attach behaviours to server-rendered markup.
//!
//! `enhance` is idempotent. Each step marks the elements it handled with a
//! `data-cw-*` attribute and skips marked elements on later passes, so a
//! container can be enhanced any number of times without stacking listeners.
use chrono::{DateTime, Local};

use crate::dom::{Document, NodeId};
use crate::preferences::SectionStates;
use crate::util::hostname_label;

use super::bindings::{Behavior, Bindings, DomEvent};
use super::time_format::{format_timestamp, RelativeTimeMode};

pub const HOST_MARKER: &str = "data-cw-host";
pub const TOOLTIP_MARKER: &str = "data-cw-tooltip";
pub const ERROR_TOOLTIP_MARKER: &str = "data-cw-error-tooltip";
pub const TIME_MARKER: &str = "data-cw-time";
pub const MENU_MARKER: &str = "data-cw-menu";
pub const SECTION_MARKER: &str = "data-cw-section";

/// Label shown by a bound timestamp without a usable `data-timestamp`.
pub const DEFAULT_TIME_FALLBACK: &str = "Never";

/// Inputs the pass needs besides the document.
pub struct EnhanceContext<'a> {
    pub mode: RelativeTimeMode,
    pub now: DateTime<Local>,
    pub sections: &'a SectionStates,
}

/// Number of elements newly handled by each step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnhanceReport {
    pub hostnames: usize,
    pub tooltips: usize,
    pub error_tooltips: usize,
    pub timestamps: usize,
    pub menus: usize,
    pub sections: usize,
}

impl EnhanceReport {
    pub fn total(&self) -> usize {
        self.hostnames
            + self.tooltips
            + self.error_tooltips
            + self.timestamps
            + self.menus
            + self.sections
    }
}

/// Run every step over `root` and its descendants, in order.
pub fn enhance(
    doc: &mut Document,
    bindings: &mut Bindings,
    root: NodeId,
    ctx: &EnhanceContext<'_>,
) -> EnhanceReport {
    if !doc.contains(root) {
        return EnhanceReport::default();
    }
    let report = EnhanceReport {
        hostnames: bind_hostnames(doc, root),
        tooltips: bind_floating_tooltips(doc, bindings, root, "table-tooltip", TOOLTIP_MARKER),
        error_tooltips: bind_floating_tooltips(
            doc,
            bindings,
            root,
            "error-tooltip",
            ERROR_TOOLTIP_MARKER,
        ),
        timestamps: bind_timestamps(doc, root, ctx.mode, ctx.now),
        menus: bind_menus(doc, bindings, root),
        sections: bind_sections(doc, bindings, root, ctx.sections),
    };
    tracing::debug!(?root, ?report, "Enhanced subtree");
    report
}

/// Elements of `root` (inclusive) carrying `class` and lacking `marker`.
fn unmarked(doc: &Document, root: NodeId, class: &str, marker: &str) -> Vec<NodeId> {
    std::iter::once(root)
        .chain(doc.descendants(root))
        .filter(|n| doc.has_class(*n, class) && doc.attr(*n, marker).is_none())
        .collect()
}

// ============================================================================
// Steps
// ============================================================================

fn bind_hostnames(doc: &mut Document, root: NodeId) -> usize {
    let links = unmarked(doc, root, "domain-tooltip", HOST_MARKER);
    for link in &links {
        doc.set_attr(*link, HOST_MARKER, "");
        let Some(parent) = doc.parent(*link) else {
            continue;
        };
        let Some(tip) = doc.query_class_first(parent, "tooltiptext") else {
            continue;
        };
        let label = hostname_label(doc.attr(*link, "href"));
        doc.set_text(tip, &label);
    }
    links.len()
}

fn bind_floating_tooltips(
    doc: &mut Document,
    bindings: &mut Bindings,
    root: NodeId,
    class: &str,
    marker: &str,
) -> usize {
    let triggers = unmarked(doc, root, class, marker);
    let mut bound = 0;
    for trigger in triggers {
        doc.set_attr(trigger, marker, "");
        if doc.query_class_first(trigger, "tooltiptext").is_none() {
            continue;
        }
        bindings.add(trigger, DomEvent::MouseEnter, Behavior::ShowTooltip);
        bindings.add(trigger, DomEvent::FocusIn, Behavior::ShowTooltip);
        bindings.add(trigger, DomEvent::MouseLeave, Behavior::HideTooltip);
        bindings.add(trigger, DomEvent::FocusOut, Behavior::HideTooltip);
        bound += 1;
    }
    bound
}

fn bind_timestamps(
    doc: &mut Document,
    root: NodeId,
    mode: RelativeTimeMode,
    now: DateTime<Local>,
) -> usize {
    let nodes: Vec<NodeId> = unmarked(doc, root, "relative-time", TIME_MARKER)
        .into_iter()
        .filter(|n| doc.attr(*n, "data-timestamp").is_some())
        .collect();
    for node in &nodes {
        doc.set_attr(*node, TIME_MARKER, "");
        render_timestamp(doc, *node, mode, now);
    }
    nodes.len()
}

fn bind_menus(doc: &mut Document, bindings: &mut Bindings, root: NodeId) -> usize {
    let toggles = unmarked(doc, root, "menu-toggle", MENU_MARKER);
    for toggle in &toggles {
        doc.set_attr(*toggle, MENU_MARKER, "");
        bindings.add(*toggle, DomEvent::Click, Behavior::OpenMenu);
    }
    toggles.len()
}

fn bind_sections(
    doc: &mut Document,
    bindings: &mut Bindings,
    root: NodeId,
    saved: &SectionStates,
) -> usize {
    let headers: Vec<NodeId> = unmarked(doc, root, "toggle", SECTION_MARKER)
        .into_iter()
        .filter(|n| doc.tag(*n) == Some("h2"))
        .collect();
    let mut bound = 0;
    for header in headers {
        doc.set_attr(header, SECTION_MARKER, "");
        let Some(section) = doc.attr(header, "data-section").map(str::to_string) else {
            continue;
        };
        let Some(content) = section_content(doc, header) else {
            continue;
        };
        if let Some(collapsed) = saved.get(&section) {
            doc.toggle_class(header, "collapsed", Some(*collapsed));
            doc.toggle_class(content, "collapsed", Some(*collapsed));
        }
        bindings.add(header, DomEvent::Click, Behavior::ToggleSection);
        bound += 1;
    }
    bound
}

/// The element following the header's `.table-header` wrapper.
fn section_content(doc: &Document, header: NodeId) -> Option<NodeId> {
    let wrapper = doc.closest_class(header, "table-header")?;
    doc.next_element_sibling(wrapper)
}

// ============================================================================
// Re-rendering
// ============================================================================

/// Write the label of one bound timestamp and its tooltip reference.
pub fn render_timestamp(
    doc: &mut Document,
    node: NodeId,
    mode: RelativeTimeMode,
    now: DateTime<Local>,
) {
    let raw = doc.attr(node, "data-timestamp").map(str::to_string);
    let fallback = doc
        .attr(node, "data-fallback")
        .unwrap_or(DEFAULT_TIME_FALLBACK)
        .to_string();
    let label = format_timestamp(raw.as_deref(), &fallback, mode, now);
    doc.set_text(node, &label.text);
    match label.tooltip() {
        Some(reference) => doc.set_attr(node, "title", reference),
        None => doc.remove_attr(node, "title"),
    }
    doc.toggle_class(node, "is-relative", Some(label.is_relative));
}

/// Re-render every bound timestamp under `root`. Returns how many were visited.
pub fn refresh_timestamps(
    doc: &mut Document,
    root: NodeId,
    mode: RelativeTimeMode,
    now: DateTime<Local>,
) -> usize {
    let nodes: Vec<NodeId> = std::iter::once(root)
        .chain(doc.descendants(root))
        .filter(|n| doc.attr(*n, TIME_MARKER).is_some())
        .collect();
    for node in &nodes {
        render_timestamp(doc, *node, mode, now);
    }
    nodes.len()
}

/// Re-apply a category's saved collapse states to already-bound headers.
///
/// Sections without a saved state are expanded.
pub fn apply_section_states(doc: &mut Document, root: NodeId, saved: &SectionStates) -> usize {
    let headers: Vec<NodeId> = std::iter::once(root)
        .chain(doc.descendants(root))
        .filter(|n| doc.attr(*n, SECTION_MARKER).is_some())
        .collect();
    let mut applied = 0;
    for header in headers {
        let Some(section) = doc.attr(header, "data-section").map(str::to_string) else {
            continue;
        };
        let Some(content) = section_content(doc, header) else {
            continue;
        };
        let collapsed = saved.get(&section).copied().unwrap_or(false);
        doc.toggle_class(header, "collapsed", Some(collapsed));
        doc.toggle_class(content, "collapsed", Some(collapsed));
        applied += 1;
    }
    applied
}

/// Flip a section header and its content. Returns the section id and new state.
pub fn toggle_section(doc: &mut Document, header: NodeId) -> Option<(String, bool)> {
    let section = doc.attr(header, "data-section")?.to_string();
    let content = section_content(doc, header)?;
    doc.toggle_class(header, "collapsed", None);
    let collapsed = doc.toggle_class(content, "collapsed", None);
    Some((section, collapsed))
}
