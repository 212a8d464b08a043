mod support;

use proptest::prelude::*;
use yard_core::clock::{EventKind, EventPayload};
use yard_core::config::SimConfig;
use yard_core::entities::Device;
use yard_core::error::DeadLoopError;
use yard_core::spatial::Point;
use yard_core::telemetry::EventOutcome;

use support::schedule::{dispatched_ids, logged};
use support::yard::TestYardBuilder;

fn request_at(engine: &yard_core::runner::Engine, time: u64) -> yard_core::clock::Event {
    engine.schedule_event(None, time, EventKind::DispatchRequest, EventPayload::None)
}

#[test]
fn events_dispatch_in_trigger_time_order() {
    let engine = TestYardBuilder::new().without_tick().build();
    let late = request_at(&engine, 300);
    let early = request_at(&engine, 100);
    let middle = request_at(&engine, 200);

    assert_eq!(engine.run_until(300), Ok(3));
    assert_eq!(
        dispatched_ids(&engine, EventKind::DispatchRequest),
        vec![early.id, middle.id, late.id]
    );
    assert_eq!(engine.now(), 300);
    assert_eq!(engine.pending_events(), 0);
}

#[test]
fn equal_trigger_times_dispatch_in_creation_order() {
    let engine = TestYardBuilder::new().without_tick().build();
    let a = request_at(&engine, 100);
    let b = request_at(&engine, 100);

    engine.run_until(100).expect("no dead loop");
    assert_eq!(dispatched_ids(&engine, EventKind::DispatchRequest), vec![a.id, b.id]);
}

#[test]
fn step_next_event_advances_to_each_event() {
    let engine = TestYardBuilder::new().without_tick().build();
    request_at(&engine, 40);
    request_at(&engine, 90);

    let first = engine.step_next_event().expect("no dead loop").expect("event");
    assert_eq!(first.trigger_time, 40);
    assert_eq!(engine.now(), 40);
    let second = engine.step_next_event().expect("no dead loop").expect("event");
    assert_eq!(second.trigger_time, 90);
    assert!(engine.step_next_event().expect("no dead loop").is_none());
}

#[test]
fn cancelled_events_are_never_delivered() {
    let engine = TestYardBuilder::new().without_tick().build();
    let cancelled = request_at(&engine, 100);
    let kept = request_at(&engine, 100);

    assert!(engine.cancel_event(cancelled.id));
    assert!(!engine.cancel_event(cancelled.id), "second cancel is a no-op");
    assert_eq!(engine.run_until(100), Ok(1));

    assert_eq!(dispatched_ids(&engine, EventKind::DispatchRequest), vec![kept.id]);
    let skipped = logged(&engine, EventKind::DispatchRequest, EventOutcome::Cancelled);
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].event_id, cancelled.id);
    assert!(!engine.cancel_event(kept.id), "dispatched events cannot be cancelled");
}

#[test]
fn cancelled_events_do_not_count_toward_dead_loop() {
    let config = SimConfig::default()
        .with_physics_tick_ms(0)
        .with_max_events_per_timestamp(2);
    let engine = TestYardBuilder::new().with_config(config).build();
    let events: Vec<_> = (0..3).map(|_| request_at(&engine, 100)).collect();
    assert!(engine.cancel_event(events[1].id));

    assert_eq!(engine.run_until(100), Ok(2));
    assert!(engine.dead_loop_diagnostics().is_empty());
}

#[test]
fn run_until_twice_is_idempotent() {
    let engine = TestYardBuilder::new()
        .with_device(Device::truck("T01", Point::ORIGIN))
        .build();
    engine
        .move_truck("T01", vec![Point::new(100.0, 0.0)])
        .expect("valid move");

    engine.run_until(500).expect("no dead loop");
    let first = engine.snapshot();
    assert_eq!(engine.run_until(500), Ok(0));
    assert_eq!(engine.snapshot(), first);
    assert_eq!(engine.now(), 500);
}

#[test]
fn past_trigger_times_are_clamped_to_now() {
    let engine = TestYardBuilder::new().without_tick().build();
    engine.run_until(1_000).expect("no dead loop");

    let event = request_at(&engine, 10);
    assert_eq!(event.trigger_time, 1_000);
    assert_eq!(engine.next_event_time(), Some(1_000));
}

#[test]
fn too_many_events_at_one_timestamp_abort_the_run() {
    let config = SimConfig::default()
        .with_physics_tick_ms(0)
        .with_max_events_per_timestamp(10);
    let engine = TestYardBuilder::new().with_config(config).build();
    for _ in 0..11 {
        request_at(&engine, 50);
    }

    assert_eq!(
        engine.run_until(50),
        Err(DeadLoopError {
            sim_time: 50,
            event_count: 11,
            threshold: 10,
        })
    );
    assert_eq!(engine.dead_loop_diagnostics().len(), 1);
    assert_eq!(engine.pending_events(), 1, "offending event stays queued");

    // The counter restarts after an abort.
    assert_eq!(engine.run_until(50), Ok(1));
}

#[test]
fn physics_tick_reschedules_itself() {
    let engine = TestYardBuilder::new().build();
    engine.run_until(1_000).expect("no dead loop");

    let ticks = dispatched_ids(&engine, EventKind::PhysicsTick);
    assert_eq!(ticks.len(), 10);
    assert_eq!(engine.next_event_time(), Some(1_100));
}

proptest! {
    #[test]
    fn dispatch_order_follows_time_then_creation(times in prop::collection::vec(0u64..50, 1..40)) {
        let engine = TestYardBuilder::new().without_tick().build();
        let scheduled: Vec<_> = times.iter().map(|t| request_at(&engine, *t)).collect();
        engine.run_until(50).expect("no dead loop");

        let mut expected = scheduled.clone();
        expected.sort_by_key(|event| (event.trigger_time, event.sequence));
        let expected: Vec<_> = expected.into_iter().map(|event| event.id).collect();
        prop_assert_eq!(dispatched_ids(&engine, EventKind::DispatchRequest), expected);
    }
}
