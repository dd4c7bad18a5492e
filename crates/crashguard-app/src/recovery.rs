//! Actions offered by a recovery surface

use crashguard_core::{ComponentId, HandoffPayload, HostError};

use crate::process_host::ProcessHost;

/// What the user chose on the recovery surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Start the restart target, then exit
    Restart(ComponentId),
    /// Exit without restarting
    Close,
}

impl RecoveryAction {
    pub fn label(&self) -> &'static str {
        match self {
            RecoveryAction::Restart(_) => "Restart",
            RecoveryAction::Close => "Close",
        }
    }
}

/// Actions available for `payload`; close is always offered
pub fn available_actions(payload: &HandoffPayload) -> Vec<RecoveryAction> {
    let mut actions = Vec::with_capacity(2);
    if let Some(ref target) = payload.restart_target {
        actions.push(RecoveryAction::Restart(target.clone()));
    }
    actions.push(RecoveryAction::Close);
    actions
}

/// Carry out `action`, returning the exit code for the recovery surface
pub fn perform(action: &RecoveryAction, host: &ProcessHost) -> Result<i32, HostError> {
    match action {
        RecoveryAction::Restart(target) => {
            let command = host
                .registry()
                .command_for(target)
                .ok_or_else(|| HostError::UnknownComponent(target.clone()))?;
            log::info!("Restarting {}", target);
            host.spawn_detached(target, &command, &[])?;
            Ok(0)
        }
        RecoveryAction::Close => {
            log::info!("Closing after crash");
            Ok(0)
        }
    }
}
