//! Import server-rendered HTML fragments into a [`Document`].
use scraper::{ElementRef, Html, Node as HtmlNode};

use super::{Document, NodeId};

/// Parse `markup` and build detached nodes for its top-level children.
///
/// Fragments made only of table rows are parsed inside a `<table><tbody>`
/// context, because the HTML parser drops bare `<tr>` elements in body
/// context. The returned nodes are the rows themselves.
pub fn parse_fragment(doc: &mut Document, markup: &str) -> Vec<NodeId> {
    let trimmed = markup.trim_start();
    let row_fragment = trimmed
        .get(..3)
        .is_some_and(|head| head.eq_ignore_ascii_case("<tr"));

    if row_fragment {
        let wrapped = format!("<table><tbody>{}</tbody></table>", markup);
        let html = Html::parse_fragment(&wrapped);
        let tbody = html
            .root_element()
            .descendants()
            .filter_map(ElementRef::wrap)
            .find(|el| el.value().name() == "tbody");
        return match tbody {
            Some(tbody) => import_children(doc, tbody),
            None => Vec::new(),
        };
    }

    let html = Html::parse_fragment(markup);
    import_children(doc, html.root_element())
}

fn import_children(doc: &mut Document, parent: ElementRef<'_>) -> Vec<NodeId> {
    let mut out = Vec::new();
    for child in parent.children() {
        match child.value() {
            HtmlNode::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    out.push(import_element(doc, el));
                }
            }
            HtmlNode::Text(text) => {
                let text: &str = text;
                out.push(doc.create_text(text));
            }
            _ => {}
        }
    }
    out
}

fn import_element(doc: &mut Document, el: ElementRef<'_>) -> NodeId {
    let id = doc.create_element(el.value().name());
    for (name, value) in el.value().attrs() {
        doc.set_attr(id, name, value);
    }
    for child in import_children(doc, el) {
        doc.append_child(id, child);
    }
    id
}
