//! Input handling.
//!
//! Two kinds of input reach the page. DOM events from the host are
//! dispatched through the listener registry with bubbling. Line commands
//! typed on stdin drive the same actions a user would trigger by clicking.

use std::str::FromStr;

use thiserror::Error;

use crate::api::{CategoryDraft, LinkDraft};
use crate::app::{App, DeferredTask, EditTarget};
use crate::dom::{NodeId, Viewport};
use crate::ui::time_format::RelativeTimeMode;

use super::actions;
use super::bindings::{Behavior, DomEvent, MenuCommand};
use super::overlay::{FloatingKind, TeardownReason};
use super::table;
use super::Action;

// ============================================================================
// DOM Events
// ============================================================================

/// Window-level events that invalidate floating element positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WindowEvent {
    Scroll,
    Resize { width: f64, height: f64 },
    VisibilityChange { visible: bool },
    PageHide,
    Blur,
}

/// mouseenter/mouseleave fire on the target only; the rest bubble.
fn bubbles(event: DomEvent) -> bool {
    !matches!(event, DomEvent::MouseEnter | DomEvent::MouseLeave)
}

/// Dispatch `event` at `target`, then run the deferred queue.
///
/// Listeners run from the target outwards. A listener that stops
/// propagation also keeps the document-level pointer handler from running.
pub fn dispatch(app: &mut App, target: NodeId, event: DomEvent) {
    if !app.doc.is_connected(target) {
        tracing::debug!(?target, ?event, "Ignoring event for detached node");
        return;
    }
    match event {
        DomEvent::FocusIn => app.doc.set_focus(Some(target)),
        DomEvent::FocusOut if app.doc.focused() == Some(target) => app.doc.set_focus(None),
        _ => {}
    }

    let mut path = vec![target];
    if bubbles(event) {
        let mut node = target;
        while let Some(parent) = app.doc.parent(node) {
            path.push(parent);
            node = parent;
        }
    }

    let mut stopped = false;
    for node in path {
        if !app.doc.contains(node) {
            break;
        }
        for behavior in app.bindings.listeners(node, event) {
            stopped |= run_behavior(app, node, behavior);
        }
        if stopped {
            break;
        }
    }

    if event.is_pointer() && !stopped {
        app.floating.handle_outside_pointer(&mut app.doc, target);
    }
    app.run_deferred();
    app.bindings.prune(&app.doc);
    app.needs_redraw = true;
}

/// Run one listener. Returns true when it stops propagation.
fn run_behavior(app: &mut App, current: NodeId, behavior: Behavior) -> bool {
    match behavior {
        Behavior::ShowTooltip => {
            if let Some(source) = app.doc.query_class_first(current, "tooltiptext") {
                app.floating
                    .show(&mut app.doc, current, source, FloatingKind::Tooltip);
            }
            false
        }
        Behavior::HideTooltip => {
            app.floating.hide_for_trigger(&mut app.doc, current);
            false
        }
        Behavior::OpenMenu => {
            open_menu(app, current);
            true
        }
        Behavior::Menu { command, url } => {
            app.floating.close_menu(&mut app.doc);
            run_menu_command(app, command, &url);
            true
        }
        Behavior::CloseMenu => {
            app.floating.close_menu(&mut app.doc);
            false
        }
        Behavior::ToggleSection => {
            actions::toggle_section_header(app, current);
            false
        }
    }
}

/// Clone the row's `.menu-actions` next to `toggle` and wire its buttons.
fn open_menu(app: &mut App, toggle: NodeId) {
    let Some(container) = app.doc.closest_class(toggle, "menu-container") else {
        return;
    };
    let Some(url) = app.doc.attr(container, "data-url").map(str::to_string) else {
        tracing::warn!(?container, "Menu container without data-url");
        return;
    };
    let Some(source) = app.doc.query_class_first(container, "menu-actions") else {
        return;
    };
    let Some(menu) = app
        .floating
        .show(&mut app.doc, toggle, source, FloatingKind::Menu)
    else {
        return;
    };

    for command in MenuCommand::ALL {
        if let Some(button) = app
            .doc
            .query_tag_class(menu, "button", command.button_class())
        {
            app.bindings.add(
                button,
                DomEvent::Click,
                Behavior::Menu {
                    command,
                    url: url.clone(),
                },
            );
        }
    }
    app.bindings.add(menu, DomEvent::MouseLeave, Behavior::CloseMenu);
    // The click that opened the menu must not close it.
    app.deferred
        .push_back(DeferredTask::ArmMenuOutsideClose(menu));
}

fn run_menu_command(app: &mut App, command: MenuCommand, url: &str) {
    tracing::debug!(?command, url, "Menu command");
    match command {
        MenuCommand::Edit => {
            actions::open_edit(app, url);
        }
        MenuCommand::Recheck => actions::recheck(app, url),
        MenuCommand::Delete => actions::request_remove(app, url),
        MenuCommand::History => actions::load_history(app, url),
    }
}

pub fn handle_window_event(app: &mut App, event: WindowEvent) {
    let reason = match event {
        WindowEvent::Scroll => TeardownReason::Scroll,
        WindowEvent::Resize { width, height } => {
            app.doc.set_viewport(Viewport::new(width, height));
            TeardownReason::Resize
        }
        WindowEvent::VisibilityChange { visible } => {
            app.doc.set_visible(visible);
            if visible {
                return;
            }
            TeardownReason::VisibilityLost
        }
        WindowEvent::PageHide => TeardownReason::PageHide,
        WindowEvent::Blur => TeardownReason::WindowBlur,
    };
    app.floating.teardown(&mut app.doc, reason);
    app.needs_redraw = true;
}

// ============================================================================
// Line Commands
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("Unknown command: {0} (try \"help\")")]
    Unknown(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// A parsed stdin command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Quit,
    Refresh,
    Category(String),
    Reorder(Vec<String>),
    Add(LinkDraft),
    /// Open the edit target for a link.
    Edit(String),
    /// Apply `key=value` changes to the edit target and submit it.
    Save(Vec<(String, String)>),
    Cancel,
    Remove(String),
    Confirm(bool),
    Update(String),
    Recheck(String),
    Favorite { url: String, favorite: bool },
    ForceUpdate,
    History(String),
    SetSaved(i64),
    Forget(i64),
    CategoryAdd(CategoryDraft),
    CategoryEdit(CategoryDraft),
    CategoryDelete(String),
    Time(RelativeTimeMode),
    Theme(String),
    Accent(String),
    /// Click the row menu toggle of a link.
    Menu(String),
    /// Pointer down outside every floating element.
    Dismiss,
}

pub const HELP: &str = "\
refresh                      reload the table
category <name>              switch category
reorder <a> <b> ...          save a new category order
add <url> <name...>          track a link
edit <url> / save k=v ...    edit a link (keys: name, url, freq, free)
remove <url>                 remove a link (asks first)
yes / no                     answer the pending question
update <url> / recheck <url> mark chapter read / recheck now
favorite <url> on|off        toggle favorite
force                        full update of the category
history <url>                show detection history
saved <id> / forget <id>     set saved entry / delete entry
cat-add <name> [label...]    create a category
cat-edit <name> k=v ...      update a category (keys: label, hours, nav)
cat-del <name>               delete a category (asks first)
time off|today|week|month|always
theme <name> / accent <name>
menu <url> / dismiss         open a row menu / click outside
cancel                       close the edit target or history
quit";

/// Group `key=value` tokens; tokens without `=` extend the previous value.
fn parse_pairs(tokens: &[&str]) -> Result<Vec<(String, String)>, CommandError> {
    let mut pairs: Vec<(String, String)> = Vec::new();
    for token in tokens {
        match token.split_once('=') {
            Some((key, value)) => pairs.push((key.to_lowercase(), value.to_string())),
            None => match pairs.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(token);
                }
                None => return Err(CommandError::Usage("<key>=<value> ...")),
            },
        }
    }
    Ok(pairs)
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, CommandError> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(CommandError::InvalidValue {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_id(value: Option<&&str>, usage: &'static str) -> Result<i64, CommandError> {
    let value = value.ok_or(CommandError::Usage(usage))?;
    value.parse().map_err(|_| CommandError::InvalidValue {
        field: "entry id",
        value: value.to_string(),
    })
}

fn one_arg(args: &[&str], usage: &'static str) -> Result<String, CommandError> {
    match args {
        [arg] => Ok(arg.to_string()),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn category_draft(name: &str, pairs: Vec<(String, String)>) -> Result<CategoryDraft, CommandError> {
    let mut draft = CategoryDraft {
        name: name.to_string(),
        ..Default::default()
    };
    for (key, value) in pairs {
        match key.as_str() {
            "label" => draft.display_name = Some(value),
            "hours" => {
                let hours = value.parse::<f64>().map_err(|_| CommandError::InvalidValue {
                    field: "hours",
                    value: value.clone(),
                })?;
                draft.update_interval_hours = Some(hours);
            }
            "nav" => draft.include_in_nav = Some(parse_bool("nav", &value)?),
            _ => {
                return Err(CommandError::InvalidValue {
                    field: "category key",
                    value: key,
                })
            }
        }
    }
    Ok(draft)
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((head, args)) = tokens.split_first() else {
            return Err(CommandError::Usage("help"));
        };
        let command = match head.to_ascii_lowercase().as_str() {
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            "refresh" | "r" => Command::Refresh,
            "category" | "c" => Command::Category(one_arg(args, "category <name>")?),
            "reorder" => Command::Reorder(args.iter().map(|a| a.to_string()).collect()),
            "add" => match args {
                [url, name @ ..] => Command::Add(LinkDraft {
                    name: name.join(" "),
                    url: url.to_string(),
                    ..Default::default()
                }),
                [] => return Err(CommandError::Usage("add <url> <name...>")),
            },
            "edit" => Command::Edit(one_arg(args, "edit <url>")?),
            "save" => Command::Save(parse_pairs(args)?),
            "cancel" => Command::Cancel,
            "remove" | "rm" => Command::Remove(one_arg(args, "remove <url>")?),
            "yes" | "y" => Command::Confirm(true),
            "no" | "n" => Command::Confirm(false),
            "update" => Command::Update(one_arg(args, "update <url>")?),
            "recheck" => Command::Recheck(one_arg(args, "recheck <url>")?),
            "favorite" | "fav" => match args {
                [url, flag] => Command::Favorite {
                    url: url.to_string(),
                    favorite: parse_bool("favorite", flag)?,
                },
                _ => return Err(CommandError::Usage("favorite <url> on|off")),
            },
            "force" => Command::ForceUpdate,
            "history" => Command::History(one_arg(args, "history <url>")?),
            "saved" => Command::SetSaved(parse_id(args.first(), "saved <entry id>")?),
            "forget" => Command::Forget(parse_id(args.first(), "forget <entry id>")?),
            "cat-add" => match args {
                [name, label @ ..] => Command::CategoryAdd(CategoryDraft {
                    name: name.to_string(),
                    display_name: (!label.is_empty()).then(|| label.join(" ")),
                    ..Default::default()
                }),
                [] => return Err(CommandError::Usage("cat-add <name> [label...]")),
            },
            "cat-edit" => match args {
                [name, rest @ ..] => Command::CategoryEdit(category_draft(name, parse_pairs(rest)?)?),
                [] => return Err(CommandError::Usage("cat-edit <name> key=value ...")),
            },
            "cat-del" => Command::CategoryDelete(one_arg(args, "cat-del <name>")?),
            "time" => {
                let mode = one_arg(args, "time off|today|week|month|always")?;
                Command::Time(mode.parse().map_err(|_| CommandError::InvalidValue {
                    field: "relative time",
                    value: mode,
                })?)
            }
            "theme" => Command::Theme(one_arg(args, "theme <name>")?),
            "accent" => Command::Accent(one_arg(args, "accent <name>")?),
            "menu" => Command::Menu(one_arg(args, "menu <url>")?),
            "dismiss" => Command::Dismiss,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

/// Apply `save` pairs on top of the open edit target.
fn apply_edit_changes(
    target: &EditTarget,
    pairs: Vec<(String, String)>,
) -> Result<EditTarget, CommandError> {
    let mut changes = target.clone();
    for (key, value) in pairs {
        match key.as_str() {
            "name" => changes.name = value,
            "url" => changes.url = value,
            "freq" | "frequency" => {
                changes.update_frequency = Some(value).filter(|v| !v.trim().is_empty())
            }
            "free" => changes.free_only = parse_bool("free", &value)?,
            _ => {
                return Err(CommandError::InvalidValue {
                    field: "edit key",
                    value: key,
                })
            }
        }
    }
    Ok(changes)
}

fn menu_toggle_for(app: &App, url: &str) -> Option<NodeId> {
    app.doc
        .query_class(app.doc.body(), "menu-container")
        .into_iter()
        .find(|c| app.doc.attr(*c, "data-url") == Some(url))
        .and_then(|c| app.doc.query_class_first(c, "menu-toggle"))
}

/// Run one command. Validation failures were already raised as alerts.
pub(super) fn handle_command(app: &mut App, command: Command) -> Action {
    app.needs_redraw = true;
    match command {
        Command::Help => app.alert(HELP),
        Command::Quit => return Action::Quit,
        Command::Refresh => {
            table::refresh(app);
        }
        Command::Category(name) => actions::switch_category(app, &name),
        Command::Reorder(order) => {
            let _ = actions::enqueue_reorder(app, order);
        }
        Command::Add(draft) => {
            let _ = actions::add_link(app, draft);
        }
        Command::Edit(url) => {
            if actions::open_edit(app, &url).is_none() {
                app.alert(format!("No link with URL {}", url));
            }
        }
        Command::Save(pairs) => {
            let Some(target) = app.edit_target.as_ref() else {
                app.alert("Nothing is being edited.");
                return Action::Continue;
            };
            match apply_edit_changes(target, pairs) {
                Ok(changes) => {
                    let _ = actions::submit_edit(app, changes);
                }
                Err(e) => app.alert(e.to_string()),
            }
        }
        Command::Cancel => {
            actions::cancel_edit(app);
            actions::close_history(app);
        }
        Command::Remove(url) => actions::request_remove(app, &url),
        Command::Confirm(accepted) => actions::confirm(app, accepted),
        Command::Update(url) => actions::update_chapter(app, &url),
        Command::Recheck(url) => actions::recheck(app, &url),
        Command::Favorite { url, favorite } => actions::set_favorite(app, &url, favorite),
        Command::ForceUpdate => actions::force_update(app),
        Command::History(url) => actions::load_history(app, &url),
        Command::SetSaved(entry_id) => {
            let _ = actions::set_saved_entry(app, entry_id);
        }
        Command::Forget(entry_id) => {
            let _ = actions::delete_history_entry(app, entry_id);
        }
        Command::CategoryAdd(draft) => {
            let _ = actions::create_category(app, draft);
        }
        Command::CategoryEdit(draft) => {
            let _ = actions::update_category(app, draft);
        }
        Command::CategoryDelete(name) => {
            let _ = actions::request_delete_category(app, &name);
        }
        Command::Time(mode) => actions::set_relative_time(app, mode),
        Command::Theme(theme) => actions::set_theme(app, &theme),
        Command::Accent(accent) => actions::set_accent(app, &accent),
        Command::Menu(url) => match menu_toggle_for(app, &url) {
            Some(toggle) => dispatch(app, toggle, DomEvent::Click),
            None => app.alert(format!("No link with URL {}", url)),
        },
        Command::Dismiss => {
            let body = app.doc.body();
            dispatch(app, body, DomEvent::PointerDown);
        }
    }
    Action::Continue
}

/// Parse and run one stdin line.
pub(super) fn handle_line(app: &mut App, line: &str) -> Action {
    if line.trim().is_empty() {
        return Action::Continue;
    }
    match line.parse::<Command>() {
        Ok(command) => handle_command(app, command),
        Err(e) => {
            app.alert(e.to_string());
            Action::Continue
        }
    }
}
