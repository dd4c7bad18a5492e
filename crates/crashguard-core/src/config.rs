//! Supervisor settings
//!
//! Settings are plain data and may be changed freely until the supervisor
//! is installed. Installation moves them into the supervisor context, after
//! which no mutation API exists.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::component::ComponentId;
use crate::payload::{DEFAULT_MAX_PAYLOAD_BYTES, TRUNCATION_MARKER};

/// Invalid supervisor settings
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("max_payload_bytes {budget} is smaller than the truncation marker ({minimum} bytes)")]
    PayloadBudgetTooSmall { budget: usize, minimum: usize },
}

/// Process-wide supervisor settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Launch the recovery surface even when no surface is visible
    pub launch_recovery_when_background: bool,
    /// Let the recovery surface show the full fault text
    pub show_diagnostic_details: bool,
    /// Offer "restart" on the recovery surface
    pub allow_restart: bool,
    /// Recovery surface to use (None = discover)
    pub recovery_surface: Option<ComponentId>,
    /// Restart target to use (None = discover)
    pub restart_target: Option<ComponentId>,
    /// Fault text budget for the handoff payload
    pub max_payload_bytes: usize,
    /// Icon hint passed through to the recovery surface
    pub icon_id: i32,
    /// Application name used in crash report subjects
    pub app_name: String,
    /// How long termination may wait for the reporter (0 = not at all)
    pub report_grace_ms: u64,
    /// How long termination may wait for the crash journal
    pub journal_timeout_ms: u64,
    /// How long a second faulting thread waits before terminating
    pub concurrent_fault_wait_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            launch_recovery_when_background: true,
            show_diagnostic_details: true,
            allow_restart: true,
            recovery_surface: None,
            restart_target: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            icon_id: 0,
            app_name: "application".into(),
            report_grace_ms: 0,
            journal_timeout_ms: 2_000,
            concurrent_fault_wait_ms: 5_000,
        }
    }
}

impl SupervisorConfig {
    /// Check settings that cannot be honoured as given
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.max_payload_bytes < TRUNCATION_MARKER.len() {
            return Err(InvalidConfig::PayloadBudgetTooSmall {
                budget: self.max_payload_bytes,
                minimum: TRUNCATION_MARKER.len(),
            });
        }
        Ok(())
    }

    /// Payload budget actually used, never smaller than the marker
    pub fn effective_payload_budget(&self) -> usize {
        self.max_payload_bytes.max(TRUNCATION_MARKER.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert!(config.launch_recovery_when_background);
        assert!(config.show_diagnostic_details);
        assert!(config.allow_restart);
        assert_eq!(config.max_payload_bytes, 131_071);
        assert_eq!(config.journal_timeout_ms, 2_000);
        assert_eq!(config.concurrent_fault_wait_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_budget_below_marker_rejected() {
        let config = SupervisorConfig {
            max_payload_bytes: 20,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(InvalidConfig::PayloadBudgetTooSmall {
                budget: 20,
                minimum: 24
            })
        );
        assert_eq!(config.effective_payload_budget(), 24);
    }

    #[test]
    fn test_partial_toml() {
        let config: SupervisorConfig = toml::from_str(
            r#"
            allow_restart = false
            recovery_surface = "my_app::recovery"
            "#,
        )
        .unwrap();
        assert!(!config.allow_restart);
        assert_eq!(config.recovery_surface, Some(ComponentId::new("my_app::recovery")));
        assert_eq!(config.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
    }
}
