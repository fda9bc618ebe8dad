//! Staging tests - readiness, deprecation, disposal discipline

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::node::UiNode;
use crate::route::{RouteDescriptor, end_route, RouterChild};
use crate::staging::StagingEngine;
use crate::tests::support::client_fixture;

// =============================================================================
// Test Helpers
// =============================================================================

fn descriptor_with_cleanup(counter: Arc<AtomicUsize>) -> RouteDescriptor {
    let child = end_route(
        || true,
        move |cx| {
            let counter = counter.clone();
            cx.on_cleanup(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            });
            Ok(UiNode::raw("<main/>"))
        },
    );
    match child {
        RouterChild::Route(route) => route,
        RouterChild::Node(_) => unreachable!("end_route returns a route"),
    }
}

fn plain_descriptor(markup: &'static str) -> RouteDescriptor {
    match end_route(|| true, move |_cx| Ok(UiNode::raw(markup))) {
        RouterChild::Route(route) => route,
        RouterChild::Node(_) => unreachable!("end_route returns a route"),
    }
}

// =============================================================================
// Identity memoization
// =============================================================================

#[test]
fn unchanged_identity_reuses_the_root() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let descriptor = plain_descriptor("<a/>");

    let first = engine.update(Some(&descriptor), &fixture.env).unwrap();
    let second = engine.update(Some(&descriptor), &fixture.env).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn changed_identity_builds_and_deprecates() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let a = plain_descriptor("<a/>");
    let b = plain_descriptor("<b/>");

    let root_a = engine.update(Some(&a), &fixture.env).unwrap();
    let root_b = engine.update(Some(&b), &fixture.env).unwrap();
    assert!(!Arc::ptr_eq(&root_a, &root_b));
    assert!(root_a.is_deprecated());
    assert!(!root_b.is_deprecated());
}

// =============================================================================
// Readiness
// =============================================================================

#[test]
fn readiness_flips_on_a_later_tick() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let descriptor = plain_descriptor("<a/>");

    let root = engine.update(Some(&descriptor), &fixture.env).unwrap();
    assert!(!root.is_ready(), "synchronous subtree must not be ready in-pass");

    fixture.scheduler.tick();
    assert!(root.is_ready());
}

#[test]
fn readiness_is_monotonic_while_live() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let descriptor = plain_descriptor("<a/>");

    let root = engine.update(Some(&descriptor), &fixture.env).unwrap();
    fixture.scheduler.tick();
    assert!(root.is_ready());

    // More passes and ticks never revert readiness.
    engine.update(Some(&descriptor), &fixture.env);
    fixture.scheduler.tick();
    fixture.scheduler.tick();
    assert!(root.is_ready());
}

#[test]
fn readiness_reads_false_after_teardown() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let descriptor = plain_descriptor("<a/>");

    let root = engine.update(Some(&descriptor), &fixture.env).unwrap();
    fixture.scheduler.tick();
    assert!(root.is_ready());

    root.dispose();
    assert!(!root.is_ready());
}

#[test]
fn async_slot_defers_readiness_until_filled() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();

    let writer_cell = Arc::new(std::sync::Mutex::new(None));
    let writer_slot = writer_cell.clone();
    let child = end_route(
        || true,
        move |cx| {
            let (node, writer) = cx.async_slot();
            *writer_slot.lock().unwrap() = Some(writer);
            Ok(UiNode::Fragment(vec![UiNode::raw("<shell>"), node]))
        },
    );
    let descriptor = match child {
        RouterChild::Route(route) => route,
        RouterChild::Node(_) => unreachable!(),
    };

    let root = engine.update(Some(&descriptor), &fixture.env).unwrap();
    fixture.scheduler.tick();
    assert!(!root.is_ready(), "unfilled slot holds the boundary open");

    let writer = writer_cell.lock().unwrap().take().unwrap();
    writer.fill(UiNode::raw("<data/>"));
    assert!(root.is_ready());
    assert!(root.node().to_html().contains("<data/>"));
}

// =============================================================================
// Deprecation and disposal
// =============================================================================

#[test]
fn deprecated_root_disposes_on_a_future_tick() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let a = descriptor_with_cleanup(counter.clone());
    let b = plain_descriptor("<b/>");

    let root_a = engine.update(Some(&a), &fixture.env).unwrap();
    // Superseded before its instant dependency resolved.
    engine.update(Some(&b), &fixture.env);
    assert!(root_a.is_deprecated());
    assert_eq!(counter.load(Ordering::Acquire), 0);

    // Tick 1: the boundary settles, sees the deprecation, and re-queues
    // disposal instead of running it inside the settle.
    fixture.scheduler.tick();
    assert!(!root_a.is_ready());
    assert_eq!(counter.load(Ordering::Acquire), 0);

    // Tick 2: the deferred disposal runs.
    fixture.scheduler.tick();
    assert!(root_a.arena().is_disposed());
    assert_eq!(counter.load(Ordering::Acquire), 1);
}

#[test]
fn double_disposal_releases_resources_once() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let a = descriptor_with_cleanup(counter.clone());
    let b = plain_descriptor("<b/>");

    let root_a = engine.update(Some(&a), &fixture.env).unwrap();
    engine.update(Some(&b), &fixture.env);

    // Both retirement paths fire: the deprecation timeout and an explicit
    // swap-style disposal.
    fixture.scheduler.tick();
    root_a.dispose();
    fixture.scheduler.tick();

    assert_eq!(counter.load(Ordering::Acquire), 1);
}

#[test]
fn clearing_selection_deprecates_the_staged_root() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let descriptor = plain_descriptor("<a/>");

    let root = engine.update(Some(&descriptor), &fixture.env).unwrap();
    assert!(engine.update(None, &fixture.env).is_none());
    assert!(root.is_deprecated());
}

// =============================================================================
// Failure containment
// =============================================================================

#[test]
fn failing_producer_renders_fallback_and_still_settles() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let child = end_route(
        || true,
        |_cx| Err(crate::error::RouterError::subtree_render("boom")),
    );
    let descriptor = match child {
        RouterChild::Route(route) => route,
        RouterChild::Node(_) => unreachable!(),
    };

    let root = engine.update(Some(&descriptor), &fixture.env).unwrap();
    assert!(root.node().is_empty());

    fixture.scheduler.tick();
    assert!(root.is_ready(), "fallback subtrees still become ready");
}
