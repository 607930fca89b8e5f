use std::collections::HashSet;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use taskdeck_core::app::{App, AppOptions};
use taskdeck_core::clock::ManualClock;
use taskdeck_core::config::Config;
use taskdeck_core::repository::{TaskRepository, load};
use taskdeck_core::store::{FileStore, KeyValueStore, MemoryStore, TASKS_KEY};
use taskdeck_core::undo::DeletionState;
use taskdeck_core::view::{Filter, Theme};
use tempfile::tempdir;

fn clock() -> ManualClock {
    ManualClock::new(
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0)
            .single()
            .expect("valid now"),
    )
}

#[test]
fn file_store_roundtrip_across_sessions() {
    let temp = tempdir().expect("tempdir");
    let clock = clock();

    let created = {
        let store = FileStore::open(temp.path()).expect("open store");
        let mut app = App::new(store, &clock);
        let task = app
            .add_task("Persist me", "across restarts", NaiveDate::from_ymd_opt(2026, 3, 1))
            .expect("created");
        app.toggle_task(&task.id);
        app.toggle_theme();
        task
    };

    let store = FileStore::open(temp.path()).expect("reopen store");
    let app = App::new(store, &clock);
    let task = &app.tasks()[0];
    assert_eq!(task.id, created.id);
    assert_eq!(task.title, "Persist me");
    assert_eq!(task.description, "across restarts");
    assert!(task.completed);
    assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2026, 3, 1));
    assert_eq!(app.theme(), Theme::Dark);
}

#[test]
fn undo_before_grace_keeps_task() {
    let clock = clock();
    let mut app = App::new(MemoryStore::new(), &clock);
    let task = app.add_task("T", "", None).expect("created");

    app.request_delete(&task.id);
    assert_eq!(
        app.deletion_state(),
        DeletionState::PendingRemoval {
            task_id: task.id.clone()
        }
    );
    clock.advance_ms(100);
    assert!(app.undo());
    assert!(app.toast().is_none());

    clock.advance(Duration::seconds(5));
    app.tick();
    assert_eq!(app.tasks().len(), 1);
    assert_eq!(app.tasks()[0].id, task.id);
    assert_eq!(app.deletion_state(), DeletionState::Idle);
}

#[test]
fn delete_without_undo_removes_after_grace() {
    let clock = clock();
    let mut app = App::new(MemoryStore::new(), &clock);
    let task = app.add_task("T", "", None).expect("created");

    app.request_delete(&task.id);
    clock.advance_ms(259);
    app.tick();
    assert!(app.visible_tasks().iter().any(|t| t.id == task.id));

    clock.advance_ms(1);
    app.tick();
    assert!(app.tasks().is_empty());
    assert_eq!(app.toast().map(|t| t.title.as_str()), Some("T"));

    clock.advance_ms(4000);
    app.tick();
    assert!(app.toast().is_none());
}

#[test]
fn malformed_storage_loads_empty() {
    let store = MemoryStore::with_entry(TASKS_KEY, "not json");
    let repo = TaskRepository::open(&store);
    assert!(repo.is_empty());

    let clock = clock();
    let mut app = App::new(&store, &clock);
    app.add_task("fresh", "", None).expect("created");
    assert_eq!(load(&store).len(), 1);
    assert!(store.get(TASKS_KEY).expect("get").is_some_and(|raw| raw.starts_with('[')));
}

#[test]
fn far_future_banner_clears_itself() {
    let clock = clock();
    let mut app = App::new(MemoryStore::new(), &clock);
    let due = app.today() + Duration::days(400);
    app.add_task("Mars trip", "", Some(due)).expect("created");
    assert!(app.banner().is_some());

    clock.advance_ms(4199);
    app.tick();
    assert!(app.banner().is_some());

    clock.advance_ms(1);
    app.tick();
    assert!(app.banner().is_none());
}

#[test]
fn ids_stay_unique_through_mixed_operations() {
    let clock = clock();
    let mut app = App::new(MemoryStore::new(), &clock);

    for round in 0..20 {
        let task = app
            .add_task(&format!("task {round}"), "", None)
            .expect("created");
        if round % 3 == 0 {
            app.toggle_task(&task.id);
        }
        if round % 4 == 0 {
            app.request_delete(&task.id);
            if round % 8 == 0 {
                app.undo();
            }
        }
        clock.advance_ms(100);
    }
    clock.advance(Duration::seconds(1));
    app.tick();

    let ids: HashSet<&str> = app.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids.len(), app.tasks().len());
}

#[test]
fn overdue_then_upcoming_then_undated() {
    let clock = clock();
    let mut app = App::new(MemoryStore::new(), &clock);
    let today = app.today();
    app.add_task("Z", "", None).expect("created");
    app.add_task("Y", "", Some(today + Duration::days(1))).expect("created");
    app.add_task("X", "", Some(today - Duration::days(1))).expect("created");

    let order: Vec<&str> = app.visible_tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(order, vec!["X", "Y", "Z"]);

    let first = app.visible_tasks()[0].id.clone();
    app.toggle_task(&first);
    app.set_filter(Filter::Active);
    let order: Vec<&str> = app.visible_tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(order, vec!["Y", "Z"]);
}

#[test]
fn huge_configured_timings_do_not_crash_a_session() {
    let mut cfg = Config::default();
    cfg.apply_overrides(vec![
        ("rc.delete.grace_ms".to_string(), "9223372036854775807".to_string()),
        ("rc.banner.ms".to_string(), "9223372036854775807".to_string()),
    ]);
    let clock = clock();
    let options = AppOptions {
        timings: cfg.timings(),
        ..AppOptions::default()
    };
    let mut app = App::with_options(MemoryStore::new(), &clock, options);

    let task = app
        .add_task("T", "", NaiveDate::from_ymd_opt(2030, 1, 1))
        .expect("created");
    app.request_delete(&task.id);
    clock.advance_ms(260);
    app.tick();
    assert!(app.tasks().is_empty());

    clock.advance_ms(4200);
    app.tick();
    assert!(app.banner().is_none());
}
