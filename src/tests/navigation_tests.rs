//! Navigation tests - goto semantics, interception, scroll persistence

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::navigation::{
    HistoryDriver, MemoryHistory, NavigationController, ScrollPosition, ScrollStore,
    SessionStorage, StorageArea, tokio_spawner,
};
use crate::reactive::Scheduler;
use crate::tests::support::inline_spawner;

// =============================================================================
// Test Helpers
// =============================================================================

fn controller() -> (NavigationController, Arc<MemoryHistory>) {
    controller_with_spawner(inline_spawner())
}

fn controller_with_spawner(
    spawner: crate::navigation::Spawner,
) -> (NavigationController, Arc<MemoryHistory>) {
    let scheduler = Scheduler::new();
    let driver = Arc::new(MemoryHistory::new("http://localhost", "/"));
    let nav = NavigationController::new(
        scheduler,
        driver.clone(),
        Arc::new(SessionStorage::new()),
        spawner,
    );
    (nav, driver)
}

// =============================================================================
// goto
// =============================================================================

#[test]
fn goto_same_path_pushes_no_entry() {
    let (nav, driver) = controller();
    let before = driver.entry_count();
    nav.goto("/", false);
    assert_eq!(driver.entry_count(), before);
    assert_eq!(nav.history_index(), 0);
}

#[test]
fn goto_external_url_triggers_full_page_navigation() {
    let (nav, driver) = controller();
    nav.goto("http://external.example", false);
    assert_eq!(
        driver.external_assignments(),
        vec!["http://external.example".to_owned()]
    );
    assert_eq!(driver.entry_count(), 1, "no history entry for external targets");
    assert_eq!(nav.current_path(), "/");
}

#[test]
fn goto_same_origin_absolute_url_is_internal() {
    let (nav, driver) = controller();
    nav.goto("http://localhost/about", false);
    assert!(driver.external_assignments().is_empty());
    assert_eq!(driver.entry_count(), 2);
}

#[test]
fn goto_pushes_fresh_monotonic_indices() {
    let (nav, driver) = controller();
    nav.goto("/a", false);
    let first = nav.history_index();
    nav.goto("/b", false);
    let second = nav.history_index();
    assert!(second > first);
    assert_eq!(driver.entry_count(), 3);
    assert_eq!(nav.current_path(), "/b");
}

#[test]
fn goto_replace_swaps_the_top_entry() {
    let (nav, driver) = controller();
    nav.goto("/a", false);
    nav.goto("/b", true);
    assert_eq!(driver.entry_count(), 2);
    assert_eq!(nav.current_path(), "/b");
}

// =============================================================================
// Interception
// =============================================================================

#[test]
fn interceptors_run_before_commit() {
    let (nav, _driver) = controller();
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_in_cb = seen.clone();
    let guard = nav.before_goto(move |path, _replace| {
        let seen = seen_in_cb.clone();
        let path = path.to_owned();
        Box::pin(async move {
            assert_eq!(path, "/next");
            seen.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    });

    nav.goto("/next", false);
    assert_eq!(seen.load(Ordering::Acquire), 1);
    assert_eq!(nav.current_path(), "/next");
    drop(guard);
}

#[test]
fn rejecting_interceptor_vetoes_the_navigation() {
    let (nav, driver) = controller();
    let guard = nav.before_goto(|_path, _replace| {
        Box::pin(async { Err(crate::error::RouterError::veto("unsaved changes")) })
    });

    nav.goto("/away", false);
    assert_eq!(nav.current_path(), "/", "vetoed goto leaves the path alone");
    assert_eq!(driver.entry_count(), 1);
    drop(guard);
}

#[test]
fn rejecting_interceptor_vetoes_back_navigation() {
    let (nav, driver) = controller();
    nav.goto("/a", false);
    driver.scroll_to(ScrollPosition::new(3.0, 40.0));
    let index_before = nav.history_index();

    let guard = nav.before_goto(|_path, _replace| {
        Box::pin(async { Err(crate::error::RouterError::veto("stay")) })
    });

    nav.handle_pop(0, "/");
    assert_eq!(nav.current_path(), "/a", "vetoed pop leaves the path alone");
    assert_eq!(nav.history_index(), index_before);
    assert_eq!(
        driver.scroll_position(),
        ScrollPosition::new(3.0, 40.0),
        "vetoed pop leaves scroll alone"
    );
    drop(guard);
}

#[test]
fn dropped_guard_unregisters_the_interceptor() {
    let (nav, _driver) = controller();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_cb = calls.clone();
    let guard = nav.before_goto(move |_path, _replace| {
        let calls = calls_in_cb.clone();
        Box::pin(async move {
            calls.fetch_add(1, Ordering::AcqRel);
            Ok(())
        })
    });
    drop(guard);

    nav.goto("/a", false);
    assert_eq!(calls.load(Ordering::Acquire), 0);
    assert_eq!(nav.current_path(), "/a");
}

#[tokio::test(flavor = "multi_thread")]
async fn superseded_goto_is_skipped() {
    let (nav, driver) = controller_with_spawner(tokio_spawner());
    let release = Arc::new(tokio::sync::Notify::new());
    let release_in_cb = release.clone();
    let _guard = nav.before_goto(move |_path, _replace| {
        let release = release_in_cb.clone();
        Box::pin(async move {
            release.notified().await;
            Ok(())
        })
    });

    nav.goto("/first", false);
    nav.goto("/second", false);

    // Both interceptor joins resolve; only the newest attempt commits.
    tokio::time::timeout(std::time::Duration::from_secs(1), async {
        loop {
            release.notify_waiters();
            if nav.current_path() == "/second" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second navigation commits");

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(nav.current_path(), "/second");
    let paths: Vec<String> = driver.entries().into_iter().map(|(_, path)| path).collect();
    assert!(!paths.contains(&"/first".to_owned()), "superseded goto never lands");
}

// =============================================================================
// Scroll persistence
// =============================================================================

#[test]
fn scroll_is_captured_by_outgoing_index_and_restored_by_incoming() {
    let (nav, driver) = controller();

    driver.scroll_to(ScrollPosition::new(0.0, 500.0));
    nav.goto("/a", false);
    let index_a = nav.history_index();

    // Fresh entry: default position.
    assert_eq!(driver.scroll_position(), ScrollPosition::default());

    driver.scroll_to(ScrollPosition::new(0.0, 120.0));
    nav.handle_pop(0, "/");
    assert_eq!(
        driver.scroll_position(),
        ScrollPosition::new(0.0, 500.0),
        "back restores the captured offset"
    );

    nav.handle_pop(index_a, "/a");
    assert_eq!(
        driver.scroll_position(),
        ScrollPosition::new(0.0, 120.0),
        "forward restores the offset captured on the way out"
    );
}

#[test]
fn scroll_store_persists_flat_json_under_one_key() {
    let storage: Arc<dyn StorageArea> = Arc::new(SessionStorage::new());
    {
        let store = ScrollStore::new(storage.clone());
        store.set(3, ScrollPosition::new(1.0, 2.0));
    }
    let raw = storage
        .load(crate::navigation::SCROLL_STORAGE_KEY)
        .expect("persisted");
    let parsed: HashMap<String, ScrollPosition> = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed.get("3"), Some(&ScrollPosition::new(1.0, 2.0)));
}

proptest! {
    /// The table round-trips through its JSON layout.
    #[test]
    fn scroll_table_round_trips(
        entries in proptest::collection::hash_map(0u64..64, (-1000.0f64..1000.0, -1000.0f64..1000.0), 0..16)
    ) {
        let storage: Arc<dyn StorageArea> = Arc::new(SessionStorage::new());
        {
            let store = ScrollStore::new(storage.clone());
            for (index, (x, y)) in &entries {
                store.set(*index, ScrollPosition::new(*x, *y));
            }
        }
        let reloaded = ScrollStore::new(storage);
        for (index, (x, y)) in &entries {
            prop_assert_eq!(reloaded.get(*index), Some(ScrollPosition::new(*x, *y)));
        }
    }
}
