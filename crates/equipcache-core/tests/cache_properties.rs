//! End-to-end behaviour of `ReferenceCache` against an in-memory store.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use equipcache_core::{
    CacheConfig, EntityKind, InMemorySource, LoadState, OverallState, ReferenceCache,
    ReferenceSource, SourceRow,
};
use tokio::runtime::Runtime;

const ROOMS_PER_LOCATION: i64 = 25;
const LOCATIONS: i64 = 4;

fn config(max_attempts: u32) -> CacheConfig {
    CacheConfig {
        max_attempts,
        initial_backoff_ms: 1,
        max_backoff_ms: 4,
        wait_timeout_ms: 10_000,
    }
}

/// Rooms named `<tag>-<id>`, spread over `LOCATIONS` locations
fn tagged_rooms(tag: &str) -> Vec<SourceRow> {
    (1..=ROOMS_PER_LOCATION * LOCATIONS)
        .map(|id| SourceRow::new(id, &format!("{}-{}", tag, id)).at_location(id % LOCATIONS))
        .collect()
}

fn populated_source(tag: &str) -> InMemorySource {
    InMemorySource::new()
        .with_rows(EntityKind::Room, tagged_rooms(tag))
        .with_rows(
            EntityKind::Line,
            vec![
                SourceRow::new(1, "Line 1").at_location(1),
                SourceRow::new(2, "Line 2").at_location(1),
                SourceRow::new(3, "Line 3").at_location(2),
                SourceRow::new(4, "Line 4"),
            ],
        )
        .with_rows(
            EntityKind::Manufacturer,
            vec![SourceRow::new(1, "Acme"), SourceRow::new(2, "Globex")],
        )
        .with_rows(EntityKind::Type, vec![SourceRow::new(1, "Press")])
}

fn build_cache(runtime: &Runtime, source: &InMemorySource, max_attempts: u32) -> Arc<ReferenceCache> {
    let shared: Arc<dyn ReferenceSource> = Arc::new(source.clone());
    Arc::new(ReferenceCache::with_handle(shared, config(max_attempts), runtime.handle().clone()).unwrap())
}

#[test]
fn unknown_ids_resolve_to_sentinel_before_and_after_load() {
    let runtime = Runtime::new().unwrap();
    let cache = build_cache(&runtime, &populated_source("r"), 3);

    for kind in EntityKind::ALL {
        assert_eq!(cache.name(kind, 9_999), None);
    }
    cache.initialize();
    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));
    for kind in EntityKind::ALL {
        assert_eq!(cache.name(kind, 9_999), None);
    }
}

#[test]
fn concurrent_initialize_starts_exactly_one_pass() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("r");
    source.set_delay(Duration::from_millis(100));
    let cache = build_cache(&runtime, &source, 3);

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || (0..10).filter(|_| cache.initialize()).count())
        })
        .collect();
    let started: usize = callers.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(started, 1);
    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));
    for kind in EntityKind::ALL {
        assert_eq!(source.fetch_count(kind), 1, "{} fetched more than once", kind);
    }
    assert_eq!(cache.status().pass_count, 1);
}

#[test]
fn ready_cache_answers_every_lookup_exactly() {
    let runtime = Runtime::new().unwrap();
    let cache = build_cache(&runtime, &populated_source("r"), 3);
    cache.initialize();
    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));

    for id in 1..=ROOMS_PER_LOCATION * LOCATIONS {
        assert_eq!(cache.room_name(id), Some(format!("r-{}", id)));
    }

    let mut seen = HashSet::new();
    for location in 0..LOCATIONS {
        let ids = cache.rooms_at_location(location);
        assert_eq!(ids.len() as i64, ROOMS_PER_LOCATION);
        for id in ids.iter() {
            assert_eq!(id % LOCATIONS, location);
            assert!(cache.room_name(*id).is_some(), "dangling id {}", id);
            assert!(seen.insert(*id), "duplicate id {}", id);
        }
    }

    assert_eq!(cache.lines_at_location(1).as_slice(), &[1, 2]);
    assert_eq!(cache.lines_at_location(2).as_slice(), &[3]);
    assert_eq!(cache.line_name(4).as_deref(), Some("Line 4"));
    assert_eq!(cache.manufacturer_name(2).as_deref(), Some("Globex"));
    assert_eq!(cache.type_name(1).as_deref(), Some("Press"));
}

#[test]
fn exhausted_kind_fails_without_touching_others() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("r");
    let max_attempts = 3;
    source.fail_next(EntityKind::Manufacturer, max_attempts);
    let cache = build_cache(&runtime, &source, max_attempts);

    cache.initialize();
    assert!(!cache.wait_until_ready(Some(Duration::from_secs(10))));

    assert!(cache.has_failed());
    assert_eq!(cache.overall_state(), OverallState::Failed);
    assert!(!cache.last_error().unwrap_or_default().is_empty());
    assert_eq!(source.fetch_count(EntityKind::Manufacturer), max_attempts);
    assert_eq!(cache.load_state(EntityKind::Manufacturer), LoadState::Failed);

    assert_eq!(cache.manufacturer_name(1), None);
    assert_eq!(cache.room_name(1).as_deref(), Some("r-1"));
    assert_eq!(cache.lines_at_location(1).as_slice(), &[1, 2]);
    assert_eq!(cache.type_name(1).as_deref(), Some("Press"));
    for kind in [EntityKind::Room, EntityKind::Line, EntityKind::Type] {
        assert_eq!(cache.load_state(kind), LoadState::Succeeded);
    }
}

#[test]
fn transient_failures_are_retried_to_success() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("r");
    source.fail_next(EntityKind::Room, 2);
    let cache = build_cache(&runtime, &source, 3);

    cache.initialize();
    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));

    assert!(!cache.has_failed());
    assert!(cache.last_error().is_none());
    assert_eq!(source.fetch_count(EntityKind::Room), 3);
    assert_eq!(cache.room_name(7).as_deref(), Some("r-7"));
}

#[test]
fn readers_during_slow_load_only_see_committed_snapshots() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("r");
    source.set_delay(Duration::from_millis(150));
    let cache = build_cache(&runtime, &source, 3);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed_loaded = false;
                while !done.load(Ordering::Acquire) {
                    // Each view is all-or-nothing for its location
                    for location in 0..LOCATIONS {
                        let len = cache.rooms_at_location(location).len() as i64;
                        assert!(len == 0 || len == ROOMS_PER_LOCATION, "partial index: {}", len);
                    }
                    // A whole snapshot handle is either empty or complete
                    let rooms = cache.rooms();
                    let count = rooms.len() as i64;
                    assert!(count == 0 || count == ROOMS_PER_LOCATION * LOCATIONS);
                    if count > 0 {
                        observed_loaded = true;
                        assert_eq!(rooms.name_of(42), Some("r-42"));
                    }
                    match cache.room_name(5) {
                        None => {}
                        Some(name) => assert_eq!(name, "r-5"),
                    }
                }
                observed_loaded
            })
        })
        .collect();

    cache.initialize();
    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));
    thread::sleep(Duration::from_millis(20));
    done.store(true, Ordering::Release);

    let saw_loaded = readers.into_iter().map(|r| r.join().unwrap()).any(|loaded| loaded);
    assert!(saw_loaded);
}

#[test]
fn reload_swaps_names_cleanly() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("old");
    let cache = build_cache(&runtime, &source, 3);

    cache.initialize();
    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));
    assert_eq!(cache.room_name(3).as_deref(), Some("old-3"));

    source.set_rows(EntityKind::Room, tagged_rooms("new"));
    source.set_delay(Duration::from_millis(50));
    let old_view = cache.rooms_at_location(1);

    assert!(cache.reload());
    // Stale but available while the reload runs
    assert_eq!(cache.room_name(3).as_deref(), Some("old-3"));
    assert!(!cache.is_ready());

    let done = Arc::new(AtomicBool::new(false));
    let watcher = {
        let cache = Arc::clone(&cache);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut switched = false;
            while !done.load(Ordering::Acquire) {
                let snapshot = cache.rooms();
                let tag = if snapshot.name_of(1) == Some("new-1") { "new" } else { "old" };
                if tag == "new" {
                    switched = true;
                } else {
                    assert!(!switched, "went back to old data after seeing new");
                }
                for id in 1..=ROOMS_PER_LOCATION * LOCATIONS {
                    assert_eq!(snapshot.name_of(id), Some(format!("{}-{}", tag, id).as_str()));
                }
            }
        })
    };

    assert!(cache.wait_until_ready(Some(Duration::from_secs(10))));
    done.store(true, Ordering::Release);
    watcher.join().unwrap();

    assert_eq!(cache.room_name(3).as_deref(), Some("new-3"));
    assert_eq!(cache.status().pass_count, 2);
    // Views taken before the reload still describe the old generation
    assert_eq!(old_view.len() as i64, ROOMS_PER_LOCATION);
    assert_eq!(old_view.as_slice(), cache.rooms_at_location(1).as_slice());
}

#[test]
fn timeout_does_not_cancel_loads() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("r");
    source.set_delay(Duration::from_millis(200));
    let cache = build_cache(&runtime, &source, 3);

    cache.initialize();
    assert!(!cache.wait_until_ready(Some(Duration::from_millis(10))));
    assert_eq!(cache.overall_state(), OverallState::Loading);
    assert!(cache.wait_until_ready(None));
    assert_eq!(cache.room_name(1).as_deref(), Some("r-1"));
}

#[test]
fn shutdown_releases_blocked_waiters() {
    let runtime = Runtime::new().unwrap();
    let source = populated_source("r");
    source.set_delay(Duration::from_millis(500));
    let cache = build_cache(&runtime, &source, 3);
    cache.initialize();

    let waiter = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.wait_until_ready(Some(Duration::from_secs(5))))
    };
    thread::sleep(Duration::from_millis(50));
    cache.shutdown();

    assert!(!waiter.join().unwrap());
    assert_eq!(cache.room_name(1), None);
}
