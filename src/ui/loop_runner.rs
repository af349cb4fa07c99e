//! Main event loop.
//!
//! Multiplexes stdin commands, background task events and two periodic
//! ticks: re-rendering bound timestamps and polling the category list.
//! Every state mutation happens here, one event at a time.

use crate::app::{App, AppEvent};
use anyhow::Result;
use chrono::Local;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use super::actions::refresh_categories;
use super::enhance::refresh_timestamps;
use super::events::handle_app_event;
use super::input::handle_line;
use super::render::render;

/// Result of handling a command.
///
/// Returned by input handlers to signal whether the loop should continue
/// or terminate gracefully.
pub enum Action {
    /// Continue the event loop and process more events.
    Continue,
    /// Flush preferences and exit.
    Quit,
}

/// An interval, or a future that never fires when `period` is `None`.
fn optional_interval(period: Option<Duration>) -> Option<Interval> {
    period.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    })
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Runs the page event loop until a quit command or a signal.
///
/// EOF on stdin only stops reading commands; live updates and ticks keep
/// running until SIGTERM/SIGINT.
///
/// Uses `tokio::select!` to multiplex:
/// - **Signals**: SIGTERM/SIGINT end the loop
/// - **Stdin**: one command per line, until EOF
/// - **Background tasks**: table fetches, actions, reorder and channel events
/// - **Time tick**: re-renders relative timestamps so they track the clock
/// - **Nav poll**: refreshes navigation counts when enabled
pub async fn run(
    app: &mut App,
    mut event_rx: mpsc::Receiver<AppEvent>,
    time_refresh: Option<Duration>,
    nav_poll: Option<Duration>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut time_tick = optional_interval(time_refresh);
    let mut nav_tick = optional_interval(nav_poll);

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        // Only print when state has changed
        if app.needs_redraw {
            draw(app)?;
            app.needs_redraw = false;
        }

        // Drain pending task results before reading more input so results
        // are not starved by a fast stream of commands.
        while let Ok(event) = event_rx.try_recv() {
            app.needs_redraw = true;
            handle_app_event(app, event);
        }
        if app.needs_redraw {
            continue;
        }

        #[cfg(unix)]
        let sigterm_fut = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_fut = std::future::pending::<Option<()>>();

        #[cfg(unix)]
        let sigint_fut = sigint.recv();
        #[cfg(not(unix))]
        let sigint_fut = std::future::pending::<Option<()>>();

        tokio::select! {
            biased;

            _ = sigterm_fut => {
                tracing::info!("Received SIGTERM, shutting down gracefully");
                break;
            }

            _ = sigint_fut => {
                tracing::info!("Received SIGINT, shutting down gracefully");
                break;
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if let Action::Quit = handle_line(app, &line) {
                            break;
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Stdin closed, running until interrupted");
                        stdin_open = false;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read stdin");
                        stdin_open = false;
                    }
                }
            }

            Some(event) = event_rx.recv() => {
                app.needs_redraw = true;
                handle_app_event(app, event);
            }

            _ = tick(&mut time_tick) => {
                let body = app.doc.body();
                let rev = app.doc.revision();
                refresh_timestamps(&mut app.doc, body, app.ui.relative_time, Local::now());
                app.needs_redraw = app.doc.revision() != rev;
            }

            _ = tick(&mut nav_tick) => {
                refresh_categories(app);
            }
        }
    }

    app.prefs.flush().await;
    Ok(())
}

fn draw(app: &mut App) -> Result<()> {
    let frame = render(app);
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", frame)?;
    stdout.flush()?;
    Ok(())
}
