//! Event listener registry for the headless document.
//!
//! Listeners are data, not closures: each entry pairs a [`DomEvent`] with a
//! [`Behavior`] that the dispatcher interprets against the app state.
use std::collections::HashMap;

use crate::dom::{Document, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomEvent {
    MouseEnter,
    MouseLeave,
    FocusIn,
    FocusOut,
    PointerDown,
    Click,
}

impl DomEvent {
    /// Pointer events also close floating elements at document level.
    pub fn is_pointer(&self) -> bool {
        matches!(self, DomEvent::PointerDown | DomEvent::Click)
    }
}

/// Commands offered by a row's hover menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Edit,
    Recheck,
    Delete,
    History,
}

impl MenuCommand {
    /// Button class inside `.menu-actions` that triggers the command.
    pub fn button_class(&self) -> &'static str {
        match self {
            MenuCommand::Edit => "edit",
            MenuCommand::Recheck => "recheck",
            MenuCommand::Delete => "danger",
            MenuCommand::History => "history",
        }
    }

    pub const ALL: [MenuCommand; 4] = [
        MenuCommand::Edit,
        MenuCommand::Recheck,
        MenuCommand::Delete,
        MenuCommand::History,
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Clone the trigger's `.tooltiptext` into the floating layer.
    ShowTooltip,
    HideTooltip,
    /// Open the floating clone of the container's `.menu-actions`.
    OpenMenu,
    /// Run a menu command for the link with this URL and close the menu.
    Menu { command: MenuCommand, url: String },
    CloseMenu,
    /// Collapse or expand a table section and persist the state.
    ToggleSection,
}

/// Listeners keyed by the node they are attached to.
#[derive(Debug, Default)]
pub struct Bindings {
    listeners: HashMap<NodeId, Vec<(DomEvent, Behavior)>>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a listener. Returns false when the same pair is already attached.
    pub fn add(&mut self, node: NodeId, event: DomEvent, behavior: Behavior) -> bool {
        let entry = self.listeners.entry(node).or_default();
        if entry.iter().any(|(e, b)| *e == event && *b == behavior) {
            return false;
        }
        entry.push((event, behavior));
        true
    }

    pub fn listeners(&self, node: NodeId, event: DomEvent) -> Vec<Behavior> {
        self.listeners
            .get(&node)
            .map(|list| {
                list.iter()
                    .filter(|(e, _)| *e == event)
                    .map(|(_, b)| b.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn count(&self, node: NodeId, event: DomEvent) -> usize {
        self.listeners
            .get(&node)
            .map_or(0, |list| list.iter().filter(|(e, _)| *e == event).count())
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop listeners of nodes that no longer exist.
    pub fn prune(&mut self, doc: &Document) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|node, _| doc.contains(*node));
        before - self.listeners.len()
    }
}
