//! Floating tooltips and menus.
//!
//! Floating elements are clones appended to the shared `#floating-root`
//! container so they escape table overflow clipping. Coordinates are
//! document-absolute and recomputed on every show.
use crate::dom::{Document, NodeId, Rect, Viewport};

/// Space between trigger and floating element.
pub const GAP: f64 = 6.0;
/// Minimum distance from the viewport edges.
pub const EDGE_PADDING: f64 = 8.0;

pub const FLOATING_ROOT_ID: &str = "floating-root";

// ============================================================================
// Positioning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatingPosition {
    pub left: f64,
    pub top: f64,
    pub placement: Placement,
}

/// Place a floating element of `size` next to `trigger`.
///
/// `trigger` is viewport-relative. The result is in document coordinates:
/// centred above the trigger, flipped below when it would start above the
/// top padding, and clamped horizontally into the padded viewport.
pub fn position(trigger: Rect, size: Size, viewport: Viewport) -> FloatingPosition {
    let mut top = viewport.scroll_y + trigger.top() - size.height - GAP;
    let mut placement = Placement::Above;
    if top < viewport.scroll_y + EDGE_PADDING {
        top = viewport.scroll_y + trigger.bottom() + GAP;
        placement = Placement::Below;
    }

    let centred = viewport.scroll_x + trigger.left() + trigger.width / 2.0 - size.width / 2.0;
    let min_left = viewport.scroll_x + EDGE_PADDING;
    let max_left = viewport.scroll_x + viewport.client_width - size.width - EDGE_PADDING;
    // Wider than the viewport: pin to the left edge.
    let left = centred.min(max_left).max(min_left);

    FloatingPosition {
        left,
        top,
        placement,
    }
}

// ============================================================================
// Floating Layer
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatingKind {
    Tooltip,
    Menu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Floating {
    pub node: NodeId,
    pub trigger: NodeId,
    pub kind: FloatingKind,
}

/// Why floating elements were torn down. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    Scroll,
    Resize,
    PointerOutside,
    VisibilityLost,
    PageHide,
    WindowBlur,
    TriggerRemoved,
}

/// Registry of live floating elements. At most one menu exists at a time.
#[derive(Debug, Default)]
pub struct FloatingLayer {
    tooltips: Vec<Floating>,
    menu: Option<Floating>,
    outside_close_armed: bool,
}

impl FloatingLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared container, created under `<body>` if the page lacks one.
    pub fn root(&self, doc: &mut Document) -> NodeId {
        if let Some(root) = doc.get_element_by_id(FLOATING_ROOT_ID) {
            return root;
        }
        let root = doc.create_element("div");
        doc.set_attr(root, "id", FLOATING_ROOT_ID);
        let body = doc.body();
        doc.append_child(body, root);
        root
    }

    pub fn menu(&self) -> Option<Floating> {
        self.menu
    }

    pub fn tooltips(&self) -> &[Floating] {
        &self.tooltips
    }

    pub fn is_empty(&self) -> bool {
        self.tooltips.is_empty() && self.menu.is_none()
    }

    /// Clone `source` into the floating root and position it against `trigger`.
    ///
    /// Showing a tooltip replaces any tooltip already shown for the same
    /// trigger. Opening a menu removes the existing menu first.
    pub fn show(
        &mut self,
        doc: &mut Document,
        trigger: NodeId,
        source: NodeId,
        kind: FloatingKind,
    ) -> Option<NodeId> {
        match kind {
            FloatingKind::Menu => self.close_menu(doc),
            FloatingKind::Tooltip => self.hide_for_trigger(doc, trigger),
        }

        let source_rect = doc.rect(source);
        let clone = doc.clone_subtree(source)?;
        doc.remove_attr(clone, "id");
        match kind {
            FloatingKind::Tooltip => {
                doc.add_class(clone, "floating");
                // Suppresses the in-table tooltip while the clone is shown.
                doc.add_class(trigger, "has-floating");
            }
            FloatingKind::Menu => doc.add_class(clone, "active"),
        }

        let pos = position(
            doc.rect(trigger),
            Size::new(source_rect.width, source_rect.height),
            doc.viewport(),
        );
        doc.set_style(clone, "position", "absolute");
        doc.set_style(clone, "left", &format!("{}px", pos.left.round()));
        doc.set_style(clone, "top", &format!("{}px", pos.top.round()));
        if pos.placement == Placement::Below {
            doc.add_class(clone, "below");
        }

        let root = self.root(doc);
        doc.append_child(root, clone);

        let floating = Floating {
            node: clone,
            trigger,
            kind,
        };
        match kind {
            FloatingKind::Menu => {
                self.menu = Some(floating);
                self.outside_close_armed = false;
            }
            FloatingKind::Tooltip => self.tooltips.push(floating),
        }
        tracing::debug!(?trigger, ?kind, left = pos.left, top = pos.top, "Showing floating element");
        Some(clone)
    }

    pub fn hide_for_trigger(&mut self, doc: &mut Document, trigger: NodeId) {
        self.tooltips.retain(|f| {
            if f.trigger == trigger {
                discard(doc, f);
                false
            } else {
                true
            }
        });
    }

    pub fn close_menu(&mut self, doc: &mut Document) {
        if let Some(menu) = self.menu.take() {
            discard(doc, &menu);
        }
        self.outside_close_armed = false;
    }

    fn clear_tooltips(&mut self, doc: &mut Document) {
        for f in std::mem::take(&mut self.tooltips) {
            discard(doc, &f);
        }
    }

    /// Arm the outside-click close for the current menu.
    pub fn arm_outside_close(&mut self, menu: NodeId) {
        if self.menu.map(|m| m.node) == Some(menu) {
            self.outside_close_armed = true;
        }
    }

    pub fn outside_close_armed(&self) -> bool {
        self.outside_close_armed
    }

    pub fn is_inside_menu(&self, doc: &Document, target: NodeId) -> bool {
        self.menu.is_some_and(|m| {
            doc.is_inclusive_ancestor(m.node, target) || doc.is_inclusive_ancestor(m.trigger, target)
        })
    }

    /// Remove every floating element.
    pub fn teardown(&mut self, doc: &mut Document, reason: TeardownReason) {
        if self.is_empty() {
            return;
        }
        tracing::debug!(?reason, tooltips = self.tooltips.len(), menu = self.menu.is_some(), "Tearing down floating elements");
        self.clear_tooltips(doc);
        self.close_menu(doc);
    }

    /// Outside pointerdown/click: tooltips always go, the menu only once armed.
    pub fn handle_outside_pointer(&mut self, doc: &mut Document, target: NodeId) {
        self.clear_tooltips(doc);
        if self.outside_close_armed && !self.is_inside_menu(doc, target) {
            tracing::debug!("Closing menu on outside click");
            self.close_menu(doc);
        }
    }

    /// Remove floating elements whose trigger is gone. Returns how many were removed.
    pub fn prune_orphans(&mut self, doc: &mut Document) -> usize {
        let mut removed = 0;
        self.tooltips.retain(|f| {
            if doc.is_connected(f.trigger) {
                true
            } else {
                discard(doc, f);
                removed += 1;
                false
            }
        });
        if self.menu.is_some_and(|m| !doc.is_connected(m.trigger)) {
            self.close_menu(doc);
            removed += 1;
        }
        if removed > 0 {
            tracing::debug!(removed, reason = ?TeardownReason::TriggerRemoved, "Pruned orphaned floating elements");
        }
        removed
    }
}

fn discard(doc: &mut Document, floating: &Floating) {
    doc.remove(floating.node);
    if floating.kind == FloatingKind::Tooltip {
        doc.remove_class(floating.trigger, "has-floating");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn viewport() -> Viewport {
        Viewport::new(1000.0, 800.0)
    }

    #[test]
    fn test_centred_above_trigger() {
        let pos = position(
            Rect::new(400.0, 300.0, 100.0, 20.0),
            Size::new(60.0, 30.0),
            viewport(),
        );
        assert_eq!(pos.placement, Placement::Above);
        assert_eq!(pos.left, 420.0);
        assert_eq!(pos.top, 300.0 - 30.0 - GAP);
    }

    #[test]
    fn test_flips_below_near_top() {
        let pos = position(
            Rect::new(400.0, 10.0, 100.0, 20.0),
            Size::new(60.0, 30.0),
            viewport(),
        );
        assert_eq!(pos.placement, Placement::Below);
        assert_eq!(pos.top, 30.0 + GAP);
    }

    #[test]
    fn test_clamped_to_right_edge() {
        let pos = position(
            Rect::new(980.0, 300.0, 20.0, 20.0),
            Size::new(200.0, 30.0),
            viewport(),
        );
        assert_eq!(pos.left, 1000.0 - 200.0 - EDGE_PADDING);
    }

    #[test]
    fn test_scroll_offsets_apply() {
        let vp = Viewport {
            scroll_x: 50.0,
            scroll_y: 500.0,
            ..viewport()
        };
        let pos = position(Rect::new(0.0, 100.0, 20.0, 20.0), Size::new(100.0, 30.0), vp);
        assert_eq!(pos.left, 50.0 + EDGE_PADDING);
        assert_eq!(pos.top, 500.0 + 100.0 - 30.0 - GAP);
    }

    proptest! {
        #[test]
        fn prop_position_stays_in_padded_viewport(
            x in 0.0f64..1000.0,
            y in 0.0f64..800.0,
            tw in 1.0f64..300.0,
            th in 1.0f64..60.0,
            w in 1.0f64..900.0,
            h in 1.0f64..200.0,
            sx in 0.0f64..2000.0,
            sy in 0.0f64..5000.0,
        ) {
            let vp = Viewport { scroll_x: sx, scroll_y: sy, client_width: 1000.0, client_height: 800.0 };
            let pos = position(Rect::new(x, y, tw, th), Size::new(w, h), vp);
            prop_assert!(pos.left >= sx + EDGE_PADDING - 1e-9);
            prop_assert!(pos.left + w <= sx + 1000.0 - EDGE_PADDING + 1e-9);
            match pos.placement {
                Placement::Above => {
                    prop_assert!(pos.top >= sy + EDGE_PADDING - 1e-9);
                    prop_assert!((pos.top + h + GAP - (sy + y)).abs() < 1e-6);
                }
                Placement::Below => {
                    prop_assert!((pos.top - (sy + y + th + GAP)).abs() < 1e-6);
                }
            }
        }
    }

    fn doc_with_trigger() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new(viewport());
        let body = doc.body();
        let trigger = doc.create_element("span");
        doc.set_rect(trigger, Rect::new(100.0, 300.0, 40.0, 20.0));
        let source = doc.create_element("div");
        doc.add_class(source, "table-tooltip-content");
        doc.set_rect(source, Rect::new(0.0, 0.0, 80.0, 24.0));
        doc.append_child(trigger, source);
        doc.append_child(body, trigger);
        (doc, trigger, source)
    }

    #[test]
    fn test_show_appends_clone_to_floating_root() {
        let (mut doc, trigger, source) = doc_with_trigger();
        let mut layer = FloatingLayer::new();
        let clone = layer
            .show(&mut doc, trigger, source, FloatingKind::Tooltip)
            .unwrap();

        let root = doc.get_element_by_id(FLOATING_ROOT_ID).unwrap();
        assert_eq!(doc.parent(clone), Some(root));
        assert!(doc.has_class(clone, "floating"));
        assert!(doc.has_class(trigger, "has-floating"));
        assert_eq!(doc.style(clone, "left"), Some("80px"));
        assert_eq!(doc.style(clone, "top"), Some("270px"));
    }

    #[test]
    fn test_reshow_replaces_tooltip_for_trigger() {
        let (mut doc, trigger, source) = doc_with_trigger();
        let mut layer = FloatingLayer::new();
        let first = layer.show(&mut doc, trigger, source, FloatingKind::Tooltip).unwrap();
        let second = layer.show(&mut doc, trigger, source, FloatingKind::Tooltip).unwrap();
        assert!(!doc.contains(first));
        assert!(doc.contains(second));
        assert_eq!(layer.tooltips().len(), 1);
    }

    #[test]
    fn test_single_menu_at_a_time() {
        let (mut doc, trigger, source) = doc_with_trigger();
        let mut layer = FloatingLayer::new();
        let first = layer.show(&mut doc, trigger, source, FloatingKind::Menu).unwrap();
        let second = layer.show(&mut doc, trigger, source, FloatingKind::Menu).unwrap();
        assert!(!doc.contains(first));
        assert_eq!(layer.menu().map(|m| m.node), Some(second));
    }

    #[test]
    fn test_outside_click_needs_arming() {
        let (mut doc, trigger, source) = doc_with_trigger();
        let mut layer = FloatingLayer::new();
        let menu = layer.show(&mut doc, trigger, source, FloatingKind::Menu).unwrap();
        let body = doc.body();

        layer.handle_outside_pointer(&mut doc, body);
        assert!(doc.contains(menu), "unarmed menu survives the opening click");

        layer.arm_outside_close(menu);
        layer.handle_outside_pointer(&mut doc, menu);
        assert!(doc.contains(menu), "clicks inside the menu keep it open");

        layer.handle_outside_pointer(&mut doc, body);
        assert!(!doc.contains(menu));
        assert!(layer.menu().is_none());
    }

    #[test]
    fn test_prune_removes_floats_of_detached_triggers() {
        let (mut doc, trigger, source) = doc_with_trigger();
        let mut layer = FloatingLayer::new();
        let clone = layer.show(&mut doc, trigger, source, FloatingKind::Tooltip).unwrap();
        doc.remove(trigger);
        assert_eq!(layer.prune_orphans(&mut doc), 1);
        assert!(!doc.contains(clone));
        assert!(layer.is_empty());
    }

    #[test]
    fn test_teardown_removes_everything() {
        let (mut doc, trigger, source) = doc_with_trigger();
        let mut layer = FloatingLayer::new();
        layer.show(&mut doc, trigger, source, FloatingKind::Tooltip);
        layer.show(&mut doc, trigger, source, FloatingKind::Menu);
        layer.teardown(&mut doc, TeardownReason::Scroll);
        assert!(layer.is_empty());
        assert!(!doc.has_class(trigger, "has-floating"));
        let root = doc.get_element_by_id(FLOATING_ROOT_ID).unwrap();
        assert!(doc.children(root).is_empty());
    }
}
