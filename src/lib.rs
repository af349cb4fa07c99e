//! chapterwatch: live-sync and page reconciliation engine for a self-hosted
//! chapter tracker.
//!
//! The page is a headless document ([`dom::Document`]) owned by
//! [`app::App`]. A single event loop ([`ui::run`]) applies live channel
//! events, table fetches and user actions to it one at a time.

pub mod api;
pub mod app;
pub mod channel;
pub mod config;
pub mod dom;
pub mod preferences;
pub mod storage;
pub mod ui;
pub mod util;
