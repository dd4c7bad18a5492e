//! Recovery surface and restart target resolution
//!
//! Both resolutions are pure queries against the registry at call time:
//! an explicitly configured identifier wins, then the first component
//! registered for the discovery action (registry order, never re-sorted),
//! then a built-in fallback.

use crate::component::{ComponentId, ComponentRegistry};

/// Discovery action for third-party recovery surfaces
pub const RECOVERY_SURFACE_ACTION: &str = "io.crashguard.action.RECOVERY";

/// Discovery action for third-party restart targets
pub const RESTART_TARGET_ACTION: &str = "io.crashguard.action.RESTART";

/// The built-in recovery surface
pub const DEFAULT_RECOVERY_SURFACE: &str = "crashguard_recovery";

/// Resolves recovery surface and restart target against a registry
pub struct TargetResolver<'a, R: ComponentRegistry + ?Sized> {
    registry: &'a R,
    recovery_surface: Option<&'a ComponentId>,
    restart_target: Option<&'a ComponentId>,
}

impl<'a, R: ComponentRegistry + ?Sized> TargetResolver<'a, R> {
    pub fn new(
        registry: &'a R,
        recovery_surface: Option<&'a ComponentId>,
        restart_target: Option<&'a ComponentId>,
    ) -> Self {
        Self {
            registry,
            recovery_surface,
            restart_target,
        }
    }

    /// Always yields a surface; the built-in one as last resort
    pub fn resolve_recovery_surface(&self) -> ComponentId {
        if let Some(id) = self.recovery_surface {
            log::debug!("Using configured recovery surface {}", id);
            return id.clone();
        }
        if let Some(id) = self.registry.query(RECOVERY_SURFACE_ACTION).into_iter().next() {
            log::debug!("Discovered recovery surface {}", id);
            return id;
        }
        log::debug!("No recovery surface registered, using {}", DEFAULT_RECOVERY_SURFACE);
        ComponentId::new(DEFAULT_RECOVERY_SURFACE)
    }

    /// `None` means the recovery surface can only offer "close"
    pub fn resolve_restart_target(&self) -> Option<ComponentId> {
        if let Some(id) = self.restart_target {
            log::debug!("Using configured restart target {}", id);
            return Some(id.clone());
        }
        if let Some(id) = self.registry.query(RESTART_TARGET_ACTION).into_iter().next() {
            log::debug!("Discovered restart target {}", id);
            return Some(id);
        }
        let entry = self.registry.default_entry_point();
        match entry {
            Some(ref id) => log::debug!("Restarting through default entry point {}", id),
            None => log::warn!("No restart target could be determined, restart will not be offered"),
        }
        entry
    }
}
