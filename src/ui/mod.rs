//! Page engine and terminal host.
//!
//! Everything here runs against the headless document owned by `App`:
//! - Main event loop (`run`)
//! - Live-channel and task result handling
//! - Table refresh, navigation reconciliation and enhancement
//! - Floating tooltips and menus
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop
//! - `events` - Background task and channel event processing
//! - `input` - DOM event dispatch and stdin commands
//! - `actions` - Link, category, history and preference actions
//! - `table` - Table refresher with generation tokens
//! - `nav` - Keyed navigation reconciler
//! - `enhance` - Idempotent enhancement pass
//! - `overlay` - Floating element positioner and registry
//! - `reorder` - Serialised category-order writes
//! - `time_format` - Relative timestamp formatting
//! - `render` - Plain-text page view

pub mod actions;
pub mod bindings;
pub mod enhance;
mod events;
mod helpers;
pub mod input;
mod loop_runner;
pub mod nav;
pub mod overlay;
mod render;
pub mod reorder;
pub mod state;
pub mod status;
pub mod table;
pub mod time_format;

// Re-export the public API
pub use events::handle_app_event;
pub use loop_runner::{run, Action};
pub use render::render;
