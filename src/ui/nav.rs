//! Category navigation reconciler.
//!
//! Keyed on the category name: existing `li[data-category]` nodes are updated
//! in place and repositioned with structural moves, so a pure reorder keeps
//! every node (and anything hanging off it) intact.
use std::collections::{HashMap, HashSet};

use crate::api::{Category, DEFAULT_CATEGORY};
use crate::dom::{Document, NodeId};

pub const NAV_LIST_ID: &str = "category-nav";

/// What a render pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NavReport {
    pub created: usize,
    pub removed: usize,
}

pub fn category_href(name: &str) -> String {
    if name == DEFAULT_CATEGORY {
        "/".to_string()
    } else {
        format!("/{}", name)
    }
}

/// Categories to show: those included in navigation, plus the active one.
///
/// The active category keeps its list position even when hidden from
/// navigation. If the list does not know it at all, `fallback` is appended.
pub fn visible_categories<'a>(
    categories: &'a [Category],
    active: &str,
    fallback: &'a Category,
) -> Vec<&'a Category> {
    let mut out: Vec<&Category> = categories
        .iter()
        .filter(|c| c.include_in_nav || c.name == active)
        .collect();
    if !out.iter().any(|c| c.name == active) {
        out.push(fallback);
    }
    out
}

/// Reconcile the children of `list` with `categories`.
pub fn render_nav(
    doc: &mut Document,
    list: NodeId,
    categories: &[Category],
    active: &str,
    fallback: &Category,
) -> NavReport {
    let desired = visible_categories(categories, active, fallback);
    let mut report = NavReport::default();

    let current: Vec<(String, NodeId)> = doc
        .element_children(list)
        .into_iter()
        .filter(|n| doc.tag(*n) == Some("li"))
        .filter_map(|n| doc.attr(n, "data-category").map(|name| (name.to_string(), n)))
        .collect();
    // First item per key is reusable; later duplicates are dropped below.
    let mut existing: HashMap<String, NodeId> = HashMap::new();
    for (name, node) in &current {
        existing.entry(name.clone()).or_insert(*node);
    }

    let mut ordered = Vec::with_capacity(desired.len());
    for category in &desired {
        let node = match existing.remove(&category.name) {
            Some(node) => node,
            None => {
                report.created += 1;
                create_item(doc, &category.name)
            }
        };
        update_item(doc, node, category, active);
        ordered.push(node);
    }

    let claimed: HashSet<NodeId> = ordered.iter().copied().collect();

    // Walk the desired order, moving only nodes that are out of place.
    let mut cursor = doc.children(list).first().copied();
    for node in ordered {
        if cursor == Some(node) {
            cursor = doc.next_element_sibling(node);
        } else {
            doc.insert_before(list, node, cursor);
        }
    }

    for (name, node) in current {
        if claimed.contains(&node) {
            continue;
        }
        tracing::debug!(category = %name, "Removing category from navigation");
        doc.remove(node);
        report.removed += 1;
    }
    report
}

fn create_item(doc: &mut Document, name: &str) -> NodeId {
    let li = doc.create_element("li");
    doc.set_attr(li, "data-category", name);
    doc.add_class(li, "nav-item");
    let link = doc.create_element("a");
    doc.add_class(link, "nav-link");
    let label = doc.create_element("span");
    doc.add_class(label, "nav-label");
    let count = doc.create_element("span");
    doc.add_class(count, "nav-count");
    doc.append_child(link, label);
    doc.append_child(link, count);
    doc.append_child(li, link);
    li
}

/// Find a descendant part, creating it under `parent` when server markup lacks it.
fn ensure_part(doc: &mut Document, parent: NodeId, tag: &str, class: &str) -> NodeId {
    if let Some(found) = doc.query_tag_class(parent, tag, class) {
        return found;
    }
    let part = doc.create_element(tag);
    doc.add_class(part, class);
    doc.append_child(parent, part);
    part
}

fn update_item(doc: &mut Document, li: NodeId, category: &Category, active: &str) {
    let link = ensure_part(doc, li, "a", "nav-link");
    doc.set_attr(link, "href", &category_href(&category.name));

    let label = ensure_part(doc, link, "span", "nav-label");
    doc.set_text(label, category.label());

    let count = ensure_part(doc, link, "span", "nav-count");
    doc.set_text(count, &category.unsaved_count.to_string());
    if category.unsaved_count == 0 {
        doc.set_attr(count, "hidden", "");
    } else {
        doc.remove_attr(count, "hidden");
    }

    doc.toggle_class(li, "active", Some(category.name == active));
}
