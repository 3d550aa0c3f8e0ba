//! Integration tests for the supervised world loop.
//!
//! Runs [`run_world`] against a scripted world with a zero tick interval,
//! driving it through the control channel and the law book.

// Integration tests use expect/unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::float_cmp
)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use warden_core::config::RunnerConfig;
use warden_core::{
    Governor, Law, LawAction, LawBook, MemoryAuditTrail, MemoryCheckpointStore,
    NO_SAFE_CHECKPOINT, RunEndReason, RunnerError, ScriptedWorld, control_channel, run_world,
};
use warden_events::{ContinuityBreachEvent, EventBus};

fn runner(max_ticks: u64) -> RunnerConfig {
    RunnerConfig {
        tick_interval_ms: 0,
        max_ticks,
        dt: 0.5,
    }
}

fn governor(bus: &Arc<EventBus>, store: &MemoryCheckpointStore) -> (Governor, MemoryAuditTrail) {
    let audit = MemoryAuditTrail::new();
    let governor = Governor::new(
        Arc::clone(bus),
        Box::new(store.clone()),
        Box::new(audit.clone()),
        0.9,
    )
    .unwrap();
    (governor, audit)
}

#[tokio::test]
async fn bounded_by_max_ticks() {
    let bus = Arc::new(EventBus::new());
    let (mut governor, _audit) = governor(&bus, &MemoryCheckpointStore::new());
    let mut world = ScriptedWorld::new();
    let (_control, mut commands) = control_channel();

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(5))
        .await
        .unwrap();

    assert_eq!(summary.end_reason, RunEndReason::MaxTicksReached);
    assert_eq!(summary.ticks, 5);
    assert_eq!(summary.advanced, 5);
    assert_eq!(summary.blocked, 0);
    assert_eq!(world.steps(), 5);
    assert_eq!(world.elapsed(), 2.5);
}

#[tokio::test]
async fn queued_shutdown_stops_before_any_tick() {
    let bus = Arc::new(EventBus::new());
    let (mut governor, audit) = governor(&bus, &MemoryCheckpointStore::new());
    let mut world = ScriptedWorld::new();
    let (control, mut commands) = control_channel();
    control.shutdown("operator stop").unwrap();

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(0))
        .await
        .unwrap();

    assert_eq!(
        summary.end_reason,
        RunEndReason::Shutdown {
            reason: String::from("operator stop")
        }
    );
    assert_eq!(summary.ticks, 0);
    assert_eq!(audit.events(), vec!["shutdown"]);
}

#[tokio::test]
async fn breach_with_no_checkpoint_ends_the_run() {
    let bus = Arc::new(EventBus::new());
    let (mut governor, _audit) = governor(&bus, &MemoryCheckpointStore::new());
    let mut world = ScriptedWorld::new();
    world
        .push_pairs(&[("identity_continuity", json!(1.0))])
        .push_pairs(&[("identity_continuity", json!(0.4))]);
    let (_control, mut commands) = control_channel();

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(0))
        .await
        .unwrap();

    assert_eq!(
        summary.end_reason,
        RunEndReason::Shutdown {
            reason: String::from(NO_SAFE_CHECKPOINT)
        }
    );
    assert_eq!(summary.ticks, 2);
    assert_eq!(summary.advanced, 1);
    assert_eq!(summary.blocked, 1);
    assert_eq!(world.steps(), 1);
}

#[tokio::test]
async fn paused_run_waits_for_resume() {
    let bus = Arc::new(EventBus::new());
    let (mut governor, audit) = governor(&bus, &MemoryCheckpointStore::new());
    let mut world = ScriptedWorld::new();
    let (control, mut commands) = control_channel();
    control.pause().unwrap();

    let resumer = control.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        resumer.resume().unwrap();
    });

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(3))
        .await
        .unwrap();
    task.await.unwrap();

    assert_eq!(summary.end_reason, RunEndReason::MaxTicksReached);
    assert_eq!(summary.advanced, 3);
    assert_eq!(audit.events(), vec!["pause", "resume"]);
}

#[tokio::test]
async fn paused_with_no_controller_ends_the_run() {
    let bus = Arc::new(EventBus::new());
    let (mut governor, _audit) = governor(&bus, &MemoryCheckpointStore::new());
    let mut world = ScriptedWorld::new();
    let (control, mut commands) = control_channel();
    control.pause().unwrap();
    drop(control);

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(0))
        .await
        .unwrap();

    assert_eq!(summary.end_reason, RunEndReason::ControlClosed);
    assert_eq!(summary.ticks, 0);
}

#[tokio::test]
async fn law_shutdown_takes_effect_on_the_next_iteration() {
    let bus = Arc::new(EventBus::new());
    let mut store = MemoryCheckpointStore::new();
    let _ = store.seed(json!({ "steps": 0, "elapsed": 0.0 })).unwrap();
    let (mut governor, audit) = governor(&bus, &store);

    let (control, mut commands) = control_channel();
    let book = LawBook::new(&bus, control, Box::new(audit.clone())).enact(
        Law::on::<ContinuityBreachEvent>(
            "halt_on_breach",
            LawAction::Shutdown {
                reason: String::from("continuity law"),
            },
        ),
    );
    let _subs = bus.attach(Arc::new(book));

    let mut world = ScriptedWorld::new();
    world.push_pairs(&[("identity_continuity", json!(0.2))]);

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(10))
        .await
        .unwrap();

    assert_eq!(
        summary.end_reason,
        RunEndReason::Shutdown {
            reason: String::from("continuity law")
        }
    );
    assert_eq!(summary.ticks, 1);
    assert_eq!(
        audit.events(),
        vec!["continuity_breach", "law_enforced", "rollback", "shutdown"]
    );
    assert_eq!(world.rollbacks().len(), 1);
}

#[tokio::test]
async fn rollback_command_restores_between_ticks() {
    let bus = Arc::new(EventBus::new());
    let mut store = MemoryCheckpointStore::new();
    let handle = store.seed(json!({ "steps": 40, "elapsed": 20.0 })).unwrap();
    let (mut governor, _audit) = governor(&bus, &store);
    let mut world = ScriptedWorld::new();
    let (control, mut commands) = control_channel();
    control.rollback(Some(handle.clone())).unwrap();

    let summary = run_world(&mut governor, &mut world, &mut commands, &runner(2))
        .await
        .unwrap();

    assert_eq!(summary.advanced, 2);
    assert_eq!(world.rollbacks(), &[handle]);
    assert_eq!(world.steps(), 42);
}

#[tokio::test]
async fn invalid_step_is_rejected() {
    let bus = Arc::new(EventBus::new());
    let (mut governor, _audit) = governor(&bus, &MemoryCheckpointStore::new());
    let mut world = ScriptedWorld::new();
    let (_control, mut commands) = control_channel();
    let config = RunnerConfig {
        dt: f64::NAN,
        ..runner(1)
    };

    let result = run_world(&mut governor, &mut world, &mut commands, &config).await;
    assert!(matches!(result, Err(RunnerError::InvalidStep { .. })));
}
