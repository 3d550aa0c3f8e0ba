//! Administrative command channel.
//!
//! Operators, signal handlers, and laws never touch the governor directly.
//! They send [`GovernorCommand`]s through a cloneable [`ControlHandle`];
//! the runner drains the channel between ticks and applies each command
//! with [`apply_command`], which only calls the governor's public methods.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::info;
use warden_types::CheckpointHandle;

use crate::governor::Governor;
use crate::world::World;

/// An administrative request for the governor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum GovernorCommand {
    /// Block ticks.
    Pause,
    /// Unblock ticks, clearing a shutdown if one is active.
    Resume,
    /// Enter the terminal state.
    Shutdown {
        /// Why the operator is stopping the world.
        reason: String,
    },
    /// Restore a checkpoint.
    Rollback {
        /// Checkpoint to restore; the latest one when absent.
        target: Option<CheckpointHandle>,
    },
}

/// The governor's command receiver has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("governor control channel closed")]
pub struct ControlClosed;

/// Sender half of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<GovernorCommand>,
}

/// Receiver half of the control channel, owned by the runner.
#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<GovernorCommand>,
}

/// What [`CommandReceiver::try_next`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// A queued command.
    Command(GovernorCommand),
    /// Nothing queued right now.
    Empty,
    /// Every [`ControlHandle`] has been dropped and the queue is drained.
    Closed,
}

/// Create a connected handle and receiver.
pub fn control_channel() -> (ControlHandle, CommandReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlHandle { tx }, CommandReceiver { rx })
}

impl ControlHandle {
    /// Queue `command`.
    ///
    /// # Errors
    ///
    /// Returns [`ControlClosed`] if the runner has gone away.
    pub fn send(&self, command: GovernorCommand) -> Result<(), ControlClosed> {
        self.tx.send(command).map_err(|_closed| ControlClosed)
    }

    /// Queue [`GovernorCommand::Pause`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlClosed`] if the runner has gone away.
    pub fn pause(&self) -> Result<(), ControlClosed> {
        self.send(GovernorCommand::Pause)
    }

    /// Queue [`GovernorCommand::Resume`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlClosed`] if the runner has gone away.
    pub fn resume(&self) -> Result<(), ControlClosed> {
        self.send(GovernorCommand::Resume)
    }

    /// Queue [`GovernorCommand::Shutdown`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlClosed`] if the runner has gone away.
    pub fn shutdown(&self, reason: impl Into<String>) -> Result<(), ControlClosed> {
        self.send(GovernorCommand::Shutdown {
            reason: reason.into(),
        })
    }

    /// Queue [`GovernorCommand::Rollback`].
    ///
    /// # Errors
    ///
    /// Returns [`ControlClosed`] if the runner has gone away.
    pub fn rollback(&self, target: Option<CheckpointHandle>) -> Result<(), ControlClosed> {
        self.send(GovernorCommand::Rollback { target })
    }

    /// Whether the runner has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl CommandReceiver {
    /// Take the next queued command without waiting.
    pub fn try_next(&mut self) -> Pending {
        match self.rx.try_recv() {
            Ok(command) => Pending::Command(command),
            Err(TryRecvError::Empty) => Pending::Empty,
            Err(TryRecvError::Disconnected) => Pending::Closed,
        }
    }

    /// Wait for the next command; `None` once every handle is dropped.
    pub async fn next(&mut self) -> Option<GovernorCommand> {
        self.rx.recv().await
    }
}

/// Apply one command to `governor`.
pub fn apply_command(governor: &mut Governor, world: &mut dyn World, command: GovernorCommand) {
    info!(command = ?command, "Applying control command");
    match command {
        GovernorCommand::Pause => governor.pause(),
        GovernorCommand::Resume => governor.resume(),
        GovernorCommand::Shutdown { reason } => governor.shutdown(reason),
        GovernorCommand::Rollback { target } => {
            let _ = governor.rollback(world, target);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn commands_arrive_in_send_order() {
        let (handle, mut rx) = control_channel();
        handle.pause().unwrap();
        handle.shutdown("maintenance").unwrap();

        assert_eq!(rx.try_next(), Pending::Command(GovernorCommand::Pause));
        assert_eq!(
            rx.try_next(),
            Pending::Command(GovernorCommand::Shutdown {
                reason: String::from("maintenance")
            })
        );
        assert_eq!(rx.try_next(), Pending::Empty);
    }

    #[test]
    fn dropping_every_handle_closes_the_channel() {
        let (handle, mut rx) = control_channel();
        let clone = handle.clone();
        clone.resume().unwrap();
        drop(handle);
        drop(clone);

        assert_eq!(rx.try_next(), Pending::Command(GovernorCommand::Resume));
        assert_eq!(rx.try_next(), Pending::Closed);
    }

    #[test]
    fn sending_after_receiver_drop_fails() {
        let (handle, rx) = control_channel();
        drop(rx);
        assert!(handle.is_closed());
        assert_eq!(handle.pause(), Err(ControlClosed));
    }

    #[test]
    fn commands_serialize_with_a_tag() {
        let json = serde_json::to_value(GovernorCommand::Rollback { target: None }).unwrap();
        assert_eq!(json, serde_json::json!({ "command": "rollback", "target": null }));
    }
}
