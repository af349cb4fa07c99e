//! Headless document model.
//!
//! An arena of element and text nodes with stable [`NodeId`]s. Freed slots
//! are recycled, but each reuse bumps the slot's generation, so an id held
//! across a reconciliation pass either still points at the same node or
//! reports as gone via [`Document::contains`].
//!
//! Every structural or attribute change to the connected tree bumps
//! [`Document::revision`], which makes "no DOM mutation happened" an
//! observable property. Layout rectangles, focus and the viewport are
//! host-provided and do not count as mutations.
mod html;

pub use html::parse_fragment;

use std::collections::BTreeMap;

// ============================================================================
// Geometry
// ============================================================================

/// Stable handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// Viewport-relative layout box, the equivalent of `getBoundingClientRect()`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Scroll offsets and client size of the visible area.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub client_width: f64,
    pub client_height: f64,
}

impl Viewport {
    pub fn new(client_width: f64, client_height: f64) -> Self {
        Self {
            scroll_x: 0.0,
            scroll_y: 0.0,
            client_width,
            client_height,
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone)]
struct ElementData {
    tag: String,
    attrs: BTreeMap<String, String>,
    classes: Vec<String>,
    style: BTreeMap<String, String>,
    rect: Rect,
}

#[derive(Debug, Clone)]
enum NodeData {
    Element(ElementData),
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena slot. `generation` moves on every free so stale ids stop matching.
#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

// ============================================================================
// Document
// ============================================================================

/// The page the engine reconciles against.
pub struct Document {
    nodes: Vec<Slot>,
    free_slots: Vec<usize>,
    body: NodeId,
    revision: u64,
    viewport: Viewport,
    focused: Option<NodeId>,
    visible: bool,
}

impl Document {
    pub fn new(viewport: Viewport) -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            free_slots: Vec::new(),
            body: NodeId {
                index: 0,
                generation: 0,
            },
            revision: 0,
            viewport,
            focused: None,
            visible: true,
        };
        doc.body = doc.create_element("body");
        doc
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Monotonic counter of mutations to the connected tree.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused.filter(|id| self.contains(*id))
    }

    pub fn set_focus(&mut self, node: Option<NodeId>) {
        self.focused = node;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Number of live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.node.is_some()).count()
    }

    /// Arena capacity in slots, live or free.
    pub fn slot_count(&self) -> usize {
        self.nodes.len()
    }

    /// Count a mutation when it lands in the connected tree. Building a
    /// detached subtree is free.
    fn touch(&mut self, at: NodeId) {
        if self.is_connected(at) {
            self.revision = self.revision.wrapping_add(1);
        }
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn element(&self, id: NodeId) -> Option<&ElementData> {
        match &self.node(id)?.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.node_mut(id)?.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let node = Node {
            data,
            parent: None,
            children: Vec::new(),
        };
        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.nodes[index];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.nodes.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: self.nodes.len() - 1,
            generation: 0,
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element(ElementData {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            classes: Vec::new(),
            style: BTreeMap::new(),
            rect: Rect::default(),
        }))
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    /// Deep-copy a subtree. The copy is detached and carries over layout rects.
    pub fn clone_subtree(&mut self, source: NodeId) -> Option<NodeId> {
        let node = self.node(source)?.clone();
        let children = node.children.clone();
        let copy = self.push(node.data);
        for child in children {
            if let Some(child_copy) = self.clone_subtree(child) {
                self.link(copy, child_copy, None);
            }
        }
        Some(copy)
    }

    // ========================================================================
    // Tree Structure
    // ========================================================================

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// True when the node is reachable from `<body>`.
    pub fn is_connected(&self, id: NodeId) -> bool {
        self.is_inclusive_ancestor(self.body, id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    /// Element children only, skipping text nodes.
    pub fn element_children(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == id)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|c| self.is_element(*c))
    }

    /// True when `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    fn unlink(&mut self, child: NodeId) {
        if let Some(parent) = self.parent(child) {
            if let Some(p) = self.node_mut(parent) {
                p.children.retain(|c| *c != child);
            }
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }

    fn link(&mut self, parent: NodeId, child: NodeId, before: Option<NodeId>) {
        self.unlink(child);
        let Some(p) = self.node_mut(parent) else {
            return;
        };
        let index = before
            .and_then(|r| p.children.iter().position(|c| *c == r))
            .unwrap_or(p.children.len());
        p.children.insert(index, child);
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
    }

    /// Append `child` to `parent`, moving it if it is already attached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` before `reference` (or at the end when `None`).
    ///
    /// This is a structural move: the node keeps its id, attributes and
    /// children. Moving a node to the slot it already occupies is not a
    /// mutation.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if parent == child || self.is_inclusive_ancestor(child, parent) {
            tracing::warn!(?parent, ?child, "Refusing to insert a node into its own subtree");
            return;
        }
        if !self.contains(parent) || !self.contains(child) {
            return;
        }
        let reference = reference.filter(|r| *r != child && self.parent(*r) == Some(parent));
        if self.parent(child) == Some(parent) {
            let siblings = self.children(parent);
            let pos = siblings.iter().position(|c| *c == child);
            let next = pos.and_then(|p| siblings.get(p + 1)).copied();
            if next == reference {
                return;
            }
        }
        let was_connected = self.is_connected(child);
        self.link(parent, child, reference);
        if was_connected {
            self.revision = self.revision.wrapping_add(1);
        } else {
            self.touch(parent);
        }
    }

    /// Detach and free a node and its whole subtree.
    pub fn remove(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        let was_connected = self.is_connected(id);
        self.unlink(id);
        self.free(id);
        if was_connected {
            self.revision = self.revision.wrapping_add(1);
        }
    }

    fn free(&mut self, id: NodeId) {
        let children = self.children(id).to_vec();
        for child in children {
            self.free(child);
        }
        if self.focused == Some(id) {
            self.focused = None;
        }
        if let Some(slot) = self.nodes.get_mut(id.index) {
            if slot.generation == id.generation && slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_slots.push(id.index);
            }
        }
    }

    /// Replace all children of `parent` in one mutation.
    pub fn replace_children(&mut self, parent: NodeId, new_children: Vec<NodeId>) {
        if !self.contains(parent) {
            return;
        }
        for old in self.children(parent).to_vec() {
            self.unlink(old);
            self.free(old);
        }
        for child in new_children {
            self.link(parent, child, None);
        }
        self.touch(parent);
    }

    // ========================================================================
    // Element Data
    // ========================================================================

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)?.attrs.get(name).map(String::as_str)
    }

    /// Set an attribute. `class` is routed into the class list.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if name == "class" {
            let classes: Vec<String> = value.split_whitespace().map(str::to_string).collect();
            let Some(el) = self.element_mut(id) else {
                return;
            };
            if el.classes != classes {
                el.classes = classes;
                self.touch(id);
            }
            return;
        }
        let Some(el) = self.element_mut(id) else {
            return;
        };
        if el.attrs.get(name).map(String::as_str) != Some(value) {
            el.attrs.insert(name.to_string(), value.to_string());
            self.touch(id);
        }
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) {
        if let Some(el) = self.element_mut(id) {
            if el.attrs.remove(name).is_some() {
                self.touch(id);
            }
        }
    }

    pub fn classes(&self, id: NodeId) -> &[String] {
        self.element(id).map(|el| el.classes.as_slice()).unwrap_or(&[])
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.classes(id).iter().any(|c| c == class)
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) {
        self.toggle_class(id, class, Some(true));
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) {
        self.toggle_class(id, class, Some(false));
    }

    /// `classList.toggle(class, force)`. Returns whether the class is present afterwards.
    pub fn toggle_class(&mut self, id: NodeId, class: &str, force: Option<bool>) -> bool {
        let Some(el) = self.element_mut(id) else {
            return false;
        };
        let present = el.classes.iter().any(|c| c == class);
        let want = force.unwrap_or(!present);
        if want == present {
            return present;
        }
        if want {
            el.classes.push(class.to_string());
        } else {
            el.classes.retain(|c| c != class);
        }
        self.touch(id);
        want
    }

    pub fn style(&self, id: NodeId, property: &str) -> Option<&str> {
        self.element(id)?.style.get(property).map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, property: &str, value: &str) {
        let Some(el) = self.element_mut(id) else {
            return;
        };
        if el.style.get(property).map(String::as_str) != Some(value) {
            el.style.insert(property.to_string(), value.to_string());
            self.touch(id);
        }
    }

    pub fn rect(&self, id: NodeId) -> Rect {
        self.element(id).map(|el| el.rect).unwrap_or_default()
    }

    /// Host-provided layout. Not a DOM mutation.
    pub fn set_rect(&mut self, id: NodeId, rect: Rect) {
        if let Some(el) = self.element_mut(id) {
            el.rect = rect;
        }
    }

    // ========================================================================
    // Text
    // ========================================================================

    /// Concatenated text of the subtree.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(t) => out.push_str(t),
            NodeData::Element(_) => {
                for child in &node.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Replace the subtree with a single text node. No-op when the text is unchanged.
    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if !self.is_element(id) {
            if let Some(Node {
                data: NodeData::Text(t),
                ..
            }) = self.node_mut(id)
            {
                if t.as_str() != text {
                    *t = text.to_string();
                    self.touch(id);
                }
            }
            return;
        }
        let children = self.children(id);
        if let [only] = children {
            if let Some(Node {
                data: NodeData::Text(t),
                ..
            }) = self.node(*only)
            {
                if t == text {
                    return;
                }
            }
        }
        let text_node = self.create_text(text);
        self.replace_children(id, vec![text_node]);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Element descendants of `root` in document order, excluding `root`.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(root).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if self.is_element(id) {
                out.push(id);
            }
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// `querySelectorAll(".class")` equivalent.
    pub fn query_class(&self, root: NodeId, class: &str) -> Vec<NodeId> {
        self.descendants(root)
            .into_iter()
            .filter(|id| self.has_class(*id, class))
            .collect()
    }

    /// First descendant with the class.
    pub fn query_class_first(&self, root: NodeId, class: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.has_class(*id, class))
    }

    /// First descendant with the given tag and class.
    pub fn query_tag_class(&self, root: NodeId, tag: &str, class: &str) -> Option<NodeId> {
        self.descendants(root)
            .into_iter()
            .find(|id| self.tag(*id) == Some(tag) && self.has_class(*id, class))
    }

    /// Nearest inclusive ancestor carrying the class.
    pub fn closest_class(&self, id: NodeId, class: &str) -> Option<NodeId> {
        self.closest(id, |doc, n| doc.has_class(n, class))
    }

    /// Nearest inclusive ancestor with the tag.
    pub fn closest_tag(&self, id: NodeId, tag: &str) -> Option<NodeId> {
        self.closest(id, |doc, n| doc.tag(n) == Some(tag))
    }

    fn closest(&self, id: NodeId, pred: impl Fn(&Self, NodeId) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(n) = current {
            if self.is_element(n) && pred(self, n) {
                return Some(n);
            }
            current = self.parent(n);
        }
        None
    }

    /// Connected element with the given `id` attribute.
    pub fn get_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        if self.attr(self.body, "id") == Some(element_id) {
            return Some(self.body);
        }
        self.descendants(self.body)
            .into_iter()
            .find(|n| self.attr(*n, "id") == Some(element_id))
    }
}
