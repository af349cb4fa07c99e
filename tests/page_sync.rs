//! Integration tests for the page engine against a mocked tracker server.
//!
//! Each test builds a real `App` on a headless document, points its client
//! at a wiremock server and drives it the way the event loop does: start
//! work, receive the task's `AppEvent`, hand it to `handle_app_event`.

use std::time::Duration;

use chapterwatch::api::{ChaptersPayload, FragmentGroup, HistoryEntry, HistoryPayload, TrackerApi};
use chapterwatch::app::{App, AppEvent};
use chapterwatch::channel::{ChannelEvent, ProgressEvent};
use chapterwatch::config::Config;
use chapterwatch::dom::Viewport;
use chapterwatch::preferences::PreferenceManager;
use chapterwatch::ui::bindings::DomEvent;
use chapterwatch::ui::table::{
    DIFFERENCES_BODY_ID, DIFFERENCES_COUNT_ID, LAST_FULL_UPDATE_ID, SAME_BODY_ID, SAME_COUNT_ID,
};
use chapterwatch::ui::{actions, handle_app_event, table};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Test Helpers
// ============================================================================

fn test_app(server: &MockServer, category: &str) -> (App, mpsc::Receiver<AppEvent>) {
    let (tx, rx) = mpsc::channel(32);
    let api = TrackerApi::new(&server.uri(), Duration::from_secs(5)).unwrap();
    let prefs = PreferenceManager::from_config(&Config::default());
    let app = App::new(api, prefs, category, Viewport::new(1280.0, 800.0), tx);
    (app, rx)
}

async fn next_event(rx: &mut mpsc::Receiver<AppEvent>) -> AppEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an app event")
        .expect("event channel closed")
}

/// Receive events until one matches, applying everything on the way.
async fn pump_until(
    app: &mut App,
    rx: &mut mpsc::Receiver<AppEvent>,
    wanted: impl Fn(&AppEvent) -> bool,
) {
    loop {
        let event = next_event(rx).await;
        let done = wanted(&event);
        handle_app_event(app, event);
        if done {
            return;
        }
    }
}

fn row(name: &str, href: &str) -> String {
    format!(
        r#"<tr>
            <td><div class="table-tooltip"><a class="domain-tooltip" href="{href}">{name}</a><span class="tooltiptext"></span></div></td>
            <td><span class="relative-time" data-timestamp="2024-03-01T10:00:00Z">2024-03-01</span></td>
            <td><div class="menu-container" data-url="{href}" data-name="{name}">
                <button class="menu-toggle">...</button>
                <div class="menu-actions">
                    <button class="edit">Edit</button>
                    <button class="recheck">Recheck</button>
                    <button class="history">History</button>
                    <button class="danger">Delete</button>
                </div>
            </div></td>
        </tr>"#
    )
}

fn chapters_body(differences: &[String], same: &[String]) -> serde_json::Value {
    json!({
        "differences": {"count": differences.len(), "html": differences.concat()},
        "same_data": {"count": same.len(), "html": same.concat()},
        "nav": [
            {"name": "main", "display_name": "Main", "unsaved_count": differences.len()},
            {"name": "novels", "display_name": "Novels", "unsaved_count": 0}
        ],
        "last_full_update": "2024-03-01T12:00:00Z"
    })
}

async fn mount_chapters(server: &MockServer, category: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/chapters"))
        .and(query_param("category", category))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn text_of(app: &App, id: &str) -> String {
    let node = app.doc.get_element_by_id(id).unwrap();
    app.doc.text_content(node)
}

fn row_count(app: &App, id: &str) -> usize {
    let node = app.doc.get_element_by_id(id).unwrap();
    app.doc.element_children(node).len()
}

// ============================================================================
// Table Refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_swaps_both_groups_and_enhances_rows() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        chapters_body(
            &[
                row("Tower Climber", "https://www.royalroad.com/fiction/1"),
                row("Sky Forge", "https://scribblehub.example/series/2"),
            ],
            &[row("Old Tales", "https://archive.example/3")],
        ),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    let generation = table::refresh(&mut app);
    assert_eq!(generation, 1);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;

    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 2);
    assert_eq!(row_count(&app, SAME_BODY_ID), 1);
    assert_eq!(text_of(&app, DIFFERENCES_COUNT_ID), "2");
    assert_eq!(text_of(&app, SAME_COUNT_ID), "1");

    let tbody = app.doc.get_element_by_id(DIFFERENCES_BODY_ID).unwrap();
    let tips: Vec<String> = app
        .doc
        .query_class(tbody, "tooltiptext")
        .into_iter()
        .map(|n| app.doc.text_content(n))
        .collect();
    assert_eq!(tips, vec!["royalroad.com", "scribblehub.example"]);

    let stamp = app.doc.get_element_by_id(LAST_FULL_UPDATE_ID).unwrap();
    assert_eq!(
        app.doc.attr(stamp, "data-timestamp"),
        Some("2024-03-01T12:00:00Z")
    );
    assert_ne!(app.doc.text_content(stamp), "Never");
    assert!(!app.table.is_loading());
}

#[tokio::test]
async fn test_refresh_reconciles_navigation() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        chapters_body(&[row("Tower Climber", "https://a.example/1")], &[]),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    table::refresh(&mut app);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;

    let names: Vec<&str> = app.ui.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["main", "novels"]);
    let nav = app
        .doc
        .get_element_by_id(chapterwatch::ui::nav::NAV_LIST_ID)
        .unwrap();
    assert_eq!(app.doc.element_children(nav).len(), 2);
}

#[tokio::test]
async fn test_stale_response_is_discarded() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        chapters_body(&[row("Fresh", "https://a.example/fresh")], &[]),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    let first = table::refresh(&mut app);
    let second = table::refresh(&mut app);
    assert!(second > first);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { generation, .. } if *generation == second)
    })
    .await;
    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 1);

    // A late answer for the superseded request changes nothing.
    let revision = app.doc.revision();
    let late = ChaptersPayload {
        differences: FragmentGroup {
            count: 3,
            html: row("Stale", "https://a.example/stale").repeat(3),
        },
        ..ChaptersPayload::default()
    };
    handle_app_event(
        &mut app,
        AppEvent::ChaptersLoaded {
            generation: first,
            category: "main".into(),
            result: Ok(late),
        },
    );
    assert_eq!(app.doc.revision(), revision);
    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 1);
    assert_eq!(text_of(&app, DIFFERENCES_COUNT_ID), "1");
}

#[tokio::test]
async fn test_repeated_refresh_keeps_single_menu_listener() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        chapters_body(&[row("Tower Climber", "https://a.example/1")], &[]),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    for _ in 0..2 {
        table::refresh(&mut app);
        pump_until(&mut app, &mut rx, |e| {
            matches!(e, AppEvent::ChaptersLoaded { .. })
        })
        .await;
    }
    let tbody = app.doc.get_element_by_id(DIFFERENCES_BODY_ID).unwrap();
    let toggle = app.doc.query_class_first(tbody, "menu-toggle").unwrap();
    assert_eq!(app.bindings.count(toggle, DomEvent::Click), 1);

    // A second pass over the same rows binds nothing new.
    let report = app.enhance(tbody);
    assert_eq!(report.total(), 0);
    assert_eq!(app.bindings.count(toggle, DomEvent::Click), 1);
}

#[tokio::test]
async fn test_invalid_href_gets_placeholder_tooltip() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        chapters_body(&[row("Broken", "not a url")], &[]),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    table::refresh(&mut app);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;

    let tbody = app.doc.get_element_by_id(DIFFERENCES_BODY_ID).unwrap();
    let tip = app.doc.query_class_first(tbody, "tooltiptext").unwrap();
    assert_eq!(app.doc.text_content(tip), "Invalid URL");
}

#[tokio::test]
async fn test_non_ascii_fragment_is_applied() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        json!({
            "differences": {"count": 0, "html": "éé aucune mise à jour"},
            "same_data": {"count": 0, "html": ""}
        }),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    table::refresh(&mut app);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;

    assert_eq!(text_of(&app, DIFFERENCES_BODY_ID), "éé aucune mise à jour");
    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 0);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chapters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chapters_body(
            &[row("Tower Climber", "https://a.example/1")],
            &[],
        )))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/chapters"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let (mut app, mut rx) = test_app(&server, "main");

    table::refresh(&mut app);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;
    table::refresh(&mut app);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;

    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 1);
    assert!(!chapterwatch::ui::status::spinner_visible(&app.doc));
}

// ============================================================================
// Live Channel
// ============================================================================

#[tokio::test]
async fn test_progress_for_other_category_is_ignored() {
    let server = MockServer::start().await;
    let (mut app, _rx) = test_app(&server, "main");

    let revision = app.doc.revision();
    handle_app_event(
        &mut app,
        AppEvent::Channel(ChannelEvent::Progress(ProgressEvent {
            category: "novels".into(),
            current: 2,
            total: 5,
        })),
    );
    handle_app_event(
        &mut app,
        AppEvent::Channel(ChannelEvent::Complete {
            category: "novels".into(),
        }),
    );

    assert_eq!(app.doc.revision(), revision);
    assert_eq!(app.table.generation(), 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_complete_refreshes_table() {
    let server = MockServer::start().await;
    mount_chapters(
        &server,
        "main",
        chapters_body(&[row("Tower Climber", "https://a.example/1")], &[]),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    handle_app_event(
        &mut app,
        AppEvent::Channel(ChannelEvent::Progress(ProgressEvent {
            category: "main".into(),
            current: 1,
            total: 2,
        })),
    );
    assert!(chapterwatch::ui::status::spinner_visible(&app.doc));

    handle_app_event(
        &mut app,
        AppEvent::Channel(ChannelEvent::Complete {
            category: "main".into(),
        }),
    );
    assert!(!app.ui.update_in_progress);
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;
    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 1);
}

// ============================================================================
// Actions
// ============================================================================

fn history(entries: &[(i64, &str, bool)], last_saved: Option<&str>) -> HistoryPayload {
    HistoryPayload {
        url: "https://a.example/1".into(),
        name: "Tower Climber".into(),
        last_saved: last_saved.map(str::to_string),
        last_attempt: None,
        added_at: None,
        update_frequency: None,
        free_only: false,
        history: entries
            .iter()
            .map(|(id, found, latest)| HistoryEntry {
                entry_id: *id,
                last_found: found.to_string(),
                timestamp: None,
                retrieved_at: None,
                is_latest: *latest,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_locked_history_entry_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/history/delete"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let (mut app, _rx) = test_app(&server, "main");
    app.history = Some(history(
        &[(1, "Ch. 10", false), (2, "Ch. 11", true)],
        Some("Ch. 10"),
    ));

    // Saved entry and latest entry are both locked.
    assert!(actions::delete_history_entry(&mut app, 1).is_err());
    assert!(actions::delete_history_entry(&mut app, 2).is_err());
    assert_eq!(app.take_alerts().len(), 2);
}

#[tokio::test]
async fn test_history_delete_refreshes_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/history/delete"))
        .and(body_json(json!({"url": "https://a.example/1", "entry_id": 1})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": "https://a.example/1",
            "name": "Tower Climber",
            "last_saved": "Ch. 11",
            "history": [{"entry_id": 2, "last_found": "Ch. 11", "is_latest": true}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_chapters(&server, "main", chapters_body(&[], &[])).await;
    let (mut app, mut rx) = test_app(&server, "main");
    app.history = Some(history(
        &[(1, "Ch. 10", false), (2, "Ch. 11", true)],
        Some("Ch. 11"),
    ));

    actions::delete_history_entry(&mut app, 1).unwrap();
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::HistoryLoaded { .. })
    })
    .await;
    assert_eq!(app.history.as_ref().unwrap().history.len(), 1);
    assert_eq!(app.table.generation(), 1);
}

#[tokio::test]
async fn test_rejected_action_alerts_and_clears_spinner() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/novels/recheck"))
        .and(body_json(json!({"url": "https://a.example/1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "error", "error": "scraper offline"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let (mut app, mut rx) = test_app(&server, "novels");

    actions::recheck(&mut app, "https://a.example/1");
    assert!(chapterwatch::ui::status::spinner_visible(&app.doc));
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ActionFinished { .. })
    })
    .await;

    assert!(!chapterwatch::ui::status::spinner_visible(&app.doc));
    assert_eq!(app.take_alerts(), vec!["Failed to recheck chapter.".to_string()]);
    assert_eq!(app.table.generation(), 0);
}

#[tokio::test]
async fn test_successful_add_refreshes_table() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/add"))
        .and(body_json(json!({
            "name": "Tower Climber",
            "url": "https://a.example/1",
            "free_only": false
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_chapters(
        &server,
        "main",
        chapters_body(&[row("Tower Climber", "https://a.example/1")], &[]),
    )
    .await;
    let (mut app, mut rx) = test_app(&server, "main");

    actions::add_link(
        &mut app,
        chapterwatch::api::LinkDraft {
            name: "  Tower Climber ".into(),
            url: "https://a.example/1".into(),
            free_only: false,
            update_frequency: None,
        },
    )
    .unwrap();
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ChaptersLoaded { .. })
    })
    .await;

    assert_eq!(row_count(&app, DIFFERENCES_BODY_ID), 1);
    assert!(app.take_alerts().is_empty());
}

// ============================================================================
// Category Reorder
// ============================================================================

#[tokio::test]
async fn test_reorders_are_written_in_submission_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/categories/reorder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "categories": ["main", "novels", "manga"]
        })))
        .expect(2)
        .mount(&server)
        .await;
    let (mut app, mut rx) = test_app(&server, "main");
    app.ui.set_categories(
        ["main", "manga", "novels"]
            .iter()
            .map(|n| chapterwatch::api::Category::named(n))
            .collect(),
    );

    let first = vec!["manga".to_string(), "main".into(), "novels".into()];
    let second = vec!["main".to_string(), "novels".into(), "manga".into()];
    actions::enqueue_reorder(&mut app, first.clone()).unwrap();
    actions::enqueue_reorder(&mut app, second.clone()).unwrap();

    for _ in 0..2 {
        pump_until(&mut app, &mut rx, |e| {
            matches!(e, AppEvent::ReorderSaved { .. })
        })
        .await;
    }

    let bodies: Vec<serde_json::Value> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(
        bodies,
        vec![json!({"order": first}), json!({"order": second})]
    );
    let names: Vec<&str> = app.ui.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["main", "novels", "manga"]);
}

#[tokio::test]
async fn test_failed_reorder_keeps_worker_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/categories/reorder"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/categories/reorder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "categories": ["novels", "main"]
        })))
        .mount(&server)
        .await;
    let (mut app, mut rx) = test_app(&server, "main");
    app.ui.set_categories(vec![
        chapterwatch::api::Category::named("main"),
        chapterwatch::api::Category::named("novels"),
    ]);

    actions::enqueue_reorder(&mut app, vec!["novels".into(), "main".into()]).unwrap();
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ReorderFailed { .. })
    })
    .await;
    assert_eq!(
        app.take_alerts(),
        vec!["Failed to save category order.".to_string()]
    );

    actions::enqueue_reorder(&mut app, vec!["novels".into(), "main".into()]).unwrap();
    pump_until(&mut app, &mut rx, |e| {
        matches!(e, AppEvent::ReorderSaved { .. })
    })
    .await;
    assert_eq!(app.ui.categories[0].name, "novels");
}
