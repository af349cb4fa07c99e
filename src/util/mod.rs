//! Small helpers shared by the UI and the terminal host.
//!
//! - **Hostnames**: the display hostname shown in domain tooltips
//! - **Text**: sanitising server-provided text before it reaches the terminal

mod hostname;
mod text;

pub use hostname::{display_hostname, hostname_label, INVALID_URL_LABEL};
pub use text::{strip_control_chars, truncate_chars};
