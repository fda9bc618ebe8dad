//! Adoption tests - keep-or-swap decisions on both render paths

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::adoption::{AdoptionGate, RenderMode};
use crate::node::UiNode;
use crate::route::{RouteDescriptor, RouterChild, end_route};
use crate::staging::{StagedRoot, StagingEngine};
use crate::tests::support::{ClientFixture, client_fixture, server_fixture};

// =============================================================================
// Test Helpers
// =============================================================================

fn descriptor(markup: &'static str) -> RouteDescriptor {
    match end_route(|| true, move |_cx| Ok(UiNode::raw(markup))) {
        RouterChild::Route(route) => route,
        RouterChild::Node(_) => unreachable!("end_route returns a route"),
    }
}

fn descriptor_counting(counter: Arc<AtomicUsize>) -> RouteDescriptor {
    let child = end_route(
        || true,
        move |cx| {
            let counter = counter.clone();
            cx.on_cleanup(move || {
                counter.fetch_add(1, Ordering::AcqRel);
            });
            Ok(UiNode::Empty)
        },
    );
    match child {
        RouterChild::Route(route) => route,
        RouterChild::Node(_) => unreachable!(),
    }
}

fn stage(fixture: &ClientFixture, engine: &StagingEngine, d: &RouteDescriptor) -> Arc<StagedRoot> {
    engine.update(Some(d), &fixture.env).expect("a candidate")
}

// =============================================================================
// Server path
// =============================================================================

#[test]
fn server_adopts_immediately() {
    let fixture = server_fixture("/");
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Server);
    let d = descriptor("<a/>");

    let staged = engine.update(Some(&d), &fixture.env).unwrap();
    assert!(!staged.is_ready());

    let adopted = gate.adopt(Some(staged.clone())).unwrap();
    assert!(Arc::ptr_eq(&adopted, &staged), "adopted == staged on first evaluation");
}

// =============================================================================
// Client path
// =============================================================================

#[test]
fn client_adopts_unready_candidate_when_nothing_is_shown() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Client);
    let d = descriptor("<a/>");

    let staged = stage(&fixture, &engine, &d);
    let adopted = gate.adopt(Some(staged.clone())).unwrap();
    assert!(Arc::ptr_eq(&adopted, &staged));
}

#[test]
fn client_holds_current_until_candidate_is_ready() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Client);
    let a = descriptor("<a/>");
    let b = descriptor("<b/>");

    let root_a = stage(&fixture, &engine, &a);
    fixture.scheduler.tick();
    assert!(root_a.is_ready());
    gate.adopt(Some(root_a.clone()));

    // B staged but not ready: A stays on screen.
    let root_b = stage(&fixture, &engine, &b);
    let held = gate.adopt(Some(root_b.clone())).unwrap();
    assert!(Arc::ptr_eq(&held, &root_a));
    assert!(!root_a.arena().is_disposed());

    // B becomes ready: the gate swaps and retires A.
    fixture.scheduler.tick();
    let swapped = gate.adopt(Some(root_b.clone())).unwrap();
    assert!(Arc::ptr_eq(&swapped, &root_b));
    assert!(root_a.arena().is_disposed());
}

#[test]
fn no_candidate_disposes_current_and_shows_nothing() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Client);
    let d = descriptor("<a/>");

    let root = stage(&fixture, &engine, &d);
    fixture.scheduler.tick();
    gate.adopt(Some(root.clone()));

    assert!(gate.adopt(None).is_none());
    assert!(root.arena().is_disposed());
}

#[test]
fn gate_never_disposes_the_root_it_returns() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Client);
    let d = descriptor("<a/>");

    let root = stage(&fixture, &engine, &d);
    fixture.scheduler.tick();

    // The same instance adopted twice survives both calls.
    let first = gate.adopt(Some(root.clone())).unwrap();
    let second = gate.adopt(Some(root.clone())).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!first.arena().is_disposed());
}

#[test]
fn deprecated_candidate_is_never_adopted() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Client);
    let a = descriptor("<a/>");
    let b = descriptor("<b/>");

    let root_a = stage(&fixture, &engine, &a);
    fixture.scheduler.tick();
    gate.adopt(Some(root_a.clone()));

    let root_b = stage(&fixture, &engine, &b);
    fixture.scheduler.tick();
    assert!(root_b.is_ready());
    root_b.deprecate();

    let held = gate.adopt(Some(root_b.clone())).unwrap();
    assert!(Arc::ptr_eq(&held, &root_a), "deprecated root must not land on screen");
}

#[test]
fn abandoned_ready_candidate_is_retired() {
    let fixture = client_fixture();
    let engine = StagingEngine::new();
    let gate = AdoptionGate::new(RenderMode::Client);
    let counter = Arc::new(AtomicUsize::new(0));
    let a = descriptor("<a/>");
    let b = descriptor_counting(counter.clone());
    let c = descriptor("<c/>");

    let root_a = stage(&fixture, &engine, &a);
    fixture.scheduler.tick();
    gate.adopt(Some(root_a.clone()));

    // B is staged behind A, becomes ready, and selection moves on to C
    // before the gate ever saw B ready: B was neither adopted nor caught
    // by the never-ready deprecation path.
    let root_b = stage(&fixture, &engine, &b);
    let held = gate.adopt(Some(root_b.clone())).unwrap();
    assert!(Arc::ptr_eq(&held, &root_a));
    fixture.scheduler.tick();
    assert!(root_b.is_ready());

    let root_c = stage(&fixture, &engine, &c);
    let still_held = gate.adopt(Some(root_c)).unwrap();
    assert!(Arc::ptr_eq(&still_held, &root_a));

    assert_eq!(counter.load(Ordering::Acquire), 1, "abandoned candidate released");
}
