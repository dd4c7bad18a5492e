//! Conflictive fault detection
//!
//! A fault is conflictive when showing the recovery surface would most
//! likely fault again: either the recovery surface's own code is on the
//! stack, or the fault happened during application bootstrap.

use crate::bootstrap;
use crate::component::ComponentId;
use crate::fault::FaultRecord;

/// Check every frame of every link of `fault`
///
/// Matching is by exact origin identity on path-segment boundaries, so an
/// unrelated component whose name merely contains the surface id is never
/// suppressed.
pub fn is_conflictive(fault: &FaultRecord, recovery_surface: &ComponentId) -> bool {
    fault.frames().any(|frame| {
        frame.originates_from(recovery_surface.as_str()) || frame.originates_from(bootstrap::ORIGIN)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultLink, StackFrame};

    fn surface() -> ComponentId {
        ComponentId::new("my_app::recovery")
    }

    #[test]
    fn test_surface_frame_is_conflictive() {
        let fault = FaultRecord::new(
            FaultLink::new("panic", "boom")
                .with_frame(StackFrame::new("my_app::recovery::render::h0123456789abcdef"))
                .with_frame(StackFrame::new("my_app::main")),
        );
        assert!(is_conflictive(&fault, &surface()));
    }

    #[test]
    fn test_unrelated_fault_is_not_conflictive() {
        let fault = FaultRecord::new(
            FaultLink::new("panic", "index out of bounds")
                .with_frame(StackFrame::new("my_app::editor::insert"))
                .with_frame(StackFrame::new("my_app::recovery_stats::record"))
                .with_frame(StackFrame::new("std::rt::lang_start")),
        );
        assert!(!is_conflictive(&fault, &surface()));
    }

    #[test]
    fn test_bootstrap_cause_is_conflictive() {
        // Top frame is clean; only the cause passes through bootstrap
        let fault = FaultRecord::new(
            FaultLink::new("error", "startup failed").with_frame(StackFrame::new("my_app::main")),
        )
        .caused_by(
            FaultLink::new("panic", "config missing")
                .with_frame(StackFrame::new("my_app::config::load"))
                .with_frame(StackFrame::new(
                    "crashguard_core::bootstrap::run::<my_app::main::{{closure}}, ()>",
                )),
        );
        assert!(is_conflictive(&fault, &surface()));
    }

    #[test]
    fn test_root_cause_in_surface_is_conflictive() {
        let fault = FaultRecord::new(FaultLink::new("error", "surface failed"))
            .caused_by(FaultLink::new("error", "io"))
            .caused_by(FaultLink::new("panic", "draw").with_frame(StackFrame::new("my_app::recovery")));
        assert!(is_conflictive(&fault, &surface()));
    }

    #[test]
    fn test_fault_without_frames() {
        let fault = FaultRecord::new(FaultLink::new("error", "no frames"));
        assert!(!is_conflictive(&fault, &surface()));
    }
}
