//! Warden engine binary.
//!
//! Wires the supervisory control plane around a drifting demonstration
//! world and runs it until the governor shuts down, the tick limit is
//! reached, or the operator interrupts.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `warden-config.yaml` (defaults if absent)
//! 2. Initialize structured logging (tracing)
//! 3. Create the event bus
//! 4. Open the checkpoint directory and audit log
//! 5. Create the governor and register policies
//! 6. Enact the law book and start the transport bridge
//! 7. Save a baseline checkpoint
//! 8. Install the Ctrl-C handler
//! 9. Run the world loop and log the result
//! 10. Detach subscribers and drain the transport queue

mod drift;
mod error;

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_core::config::{DEFAULT_CONFIG_PATH, LoggingConfig};
use warden_core::{
    ControlHandle, Governor, Law, LawAction, LawBook, WardenConfig, control_channel,
    no_self_copy, run_world,
};
use warden_events::{
    ContinuityBreachEvent, EventBus, PolicyViolationEvent, ShutdownEvent, TransportBridge,
};
use warden_store::{AuditLog, FileCheckpointStore};

use crate::drift::DriftWorld;
use crate::error::EngineError;

/// Application entry point for the Warden engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        continuity_threshold = config.governor.continuity_threshold,
        checkpoint_dir = %config.checkpoints.directory.display(),
        audit_log = %config.checkpoints.audit_log_path().display(),
        tick_interval_ms = config.runner.tick_interval_ms,
        max_ticks = config.runner.max_ticks,
        "warden-engine starting"
    );

    // 3. One bus per process, shared by reference.
    let bus = Arc::new(EventBus::new());

    // 4. Persistence.
    let store = FileCheckpointStore::open(&config.checkpoints.directory)?;
    let audit = AuditLog::open(config.checkpoints.audit_log_path())?;
    info!(index = %store.index_path().display(), "Checkpoint store opened");

    // 5. Governor.
    let mut governor = Governor::new(
        Arc::clone(&bus),
        Box::new(store),
        Box::new(audit.clone()),
        config.governor.continuity_threshold,
    )?;
    governor.register_policy(no_self_copy());

    // 6. Laws and transport.
    let (control, mut commands) = control_channel();
    let laws = LawBook::new(&bus, control.clone(), Box::new(audit))
        .enact(Law::on::<ContinuityBreachEvent>(
            "continuity_watch",
            LawAction::Observe,
        ))
        .enact(Law::on::<PolicyViolationEvent>(
            "containment_watch",
            LawAction::Observe,
        ))
        .enact(Law::on::<ShutdownEvent>("shutdown_watch", LawAction::Observe));
    let law_subs = bus.attach(Arc::new(laws));

    let (bridge, mut envelopes) = TransportBridge::new(config.transport.queue_capacity);
    let bridge_subs = bus.attach(Arc::clone(&bridge));
    let drain = tokio::spawn(async move {
        while let Some(envelope) = envelopes.recv().await {
            info!(
                target: "warden::transport",
                event = %envelope.name,
                at = %envelope.occurred_at,
                payload = %envelope.payload,
                "Event"
            );
        }
    });

    // 7. Baseline checkpoint so the first breach has somewhere to go.
    let mut world = DriftWorld::new(config.world.seed, config.checkpoints.interval_ticks);
    if governor.checkpoint(&world).is_none() {
        warn!("No baseline checkpoint; an early breach will shut the world down");
    }

    // 8. Ctrl-C requests a shutdown through the control channel.
    spawn_interrupt_handler(control);

    // 9. Run.
    let summary = run_world(&mut governor, &mut world, &mut commands, &config.runner).await?;

    let status = governor.status();
    info!(
        reason = ?summary.end_reason,
        ticks = summary.ticks,
        advanced = summary.advanced,
        blocked = summary.blocked,
        rollbacks = status.rollbacks,
        world_rollbacks = world.rollbacks(),
        final_tick = world.tick(),
        final_continuity = world.continuity(),
        "Run finished"
    );
    // 10. Detach and let the drain task flush what is still queued.
    law_subs.detach(&bus);
    bridge_subs.detach(&bus);
    let (forwarded, dropped) = (bridge.forwarded(), bridge.dropped());
    drop(bridge);
    if let Err(err) = drain.await {
        warn!(error = %err, "Transport drain task failed");
    }
    info!(forwarded, dropped, "Transport bridge totals");

    Ok(())
}

/// Load configuration from `warden-config.yaml`, or use defaults.
fn load_config() -> Result<WardenConfig, EngineError> {
    let config_path = Path::new(DEFAULT_CONFIG_PATH);
    if config_path.exists() {
        Ok(WardenConfig::from_file(config_path)?)
    } else {
        Ok(WardenConfig::parse("")?)
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Send a shutdown command on the first Ctrl-C.
fn spawn_interrupt_handler(control: ControlHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, requesting shutdown");
                if control.shutdown("operator interrupt").is_err() {
                    warn!("World loop already finished");
                }
            }
            Err(err) => warn!(error = %err, "Could not listen for Ctrl-C"),
        }
    });
}
