//! Foreground/background liveness tracking
//!
//! The host reports top-level surface lifecycle transitions as
//! [`LifecycleEvent`]s. The tracker counts started surfaces to classify the
//! process as foreground or background and remembers the most recently
//! created surface so the crash handler can force-close it.
//!
//! Events may arrive on the host's UI thread while a fault is raised on any
//! other thread. The started-surface count is an atomic; the crash handler
//! takes a single `SeqCst` snapshot at fault time, so every event that
//! completed before the fault is visible and later ones are not.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::component::ComponentId;

/// Opaque, non-owning handle to a host surface
///
/// Holding a handle never keeps the surface alive; the host checks whether
/// the surface still exists when the handle is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(u64);

impl SurfaceHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Lifecycle transition of a top-level surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A surface belonging to `component` was created
    Created {
        surface: SurfaceHandle,
        component: ComponentId,
    },
    /// A surface became visible
    Started { surface: SurfaceHandle },
    /// A surface stopped being visible
    Stopped { surface: SurfaceHandle },
}

/// Receiver of lifecycle events
pub trait LifecycleListener: Send + Sync {
    fn on_lifecycle(&self, event: &LifecycleEvent);
}

/// Point-in-time view of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessSnapshot {
    pub active_surfaces: usize,
    pub last_created: Option<SurfaceHandle>,
}

impl LivenessSnapshot {
    /// Background means no surface is started
    pub fn is_background(&self) -> bool {
        self.active_surfaces == 0
    }
}

/// Liveness state machine
#[derive(Debug, Default)]
pub struct LivenessTracker {
    active: AtomicUsize,
    last_created: Mutex<Option<SurfaceHandle>>,
    /// Surfaces of this component are never recorded as last created
    excluded: Mutex<Option<ComponentId>>,
}

impl LivenessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore creations of `component` (the recovery surface)
    pub fn exclude(&self, component: ComponentId) {
        *self.excluded.lock() = Some(component);
    }

    /// Apply a lifecycle transition
    pub fn apply(&self, event: &LifecycleEvent) {
        match event {
            LifecycleEvent::Created { surface, component } => {
                let excluded = self.excluded.lock();
                if excluded.as_ref() == Some(component) {
                    log::trace!("Ignoring creation of recovery surface {:?}", surface);
                    return;
                }
                drop(excluded);
                *self.last_created.lock() = Some(*surface);
            }
            LifecycleEvent::Started { .. } => {
                let count = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                log::trace!("Surface started, {} active", count);
            }
            LifecycleEvent::Stopped { surface } => {
                let result = self
                    .active
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
                match result {
                    Ok(prev) => log::trace!("Surface stopped, {} active", prev - 1),
                    Err(_) => log::debug!("Stop without matching start for {:?}", surface),
                }
            }
        }
    }

    /// Number of currently started surfaces
    pub fn active_surfaces(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether the process is currently in the background
    pub fn is_background(&self) -> bool {
        self.active_surfaces() == 0
    }

    /// Most recently created non-recovery surface
    pub fn last_created(&self) -> Option<SurfaceHandle> {
        *self.last_created.lock()
    }

    /// Take the last created surface, clearing the reference
    pub fn take_last_created(&self) -> Option<SurfaceHandle> {
        self.last_created.lock().take()
    }

    pub fn snapshot(&self) -> LivenessSnapshot {
        LivenessSnapshot {
            active_surfaces: self.active_surfaces(),
            last_created: self.last_created(),
        }
    }
}

impl LifecycleListener for LivenessTracker {
    fn on_lifecycle(&self, event: &LifecycleEvent) {
        self.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn started(n: u64) -> LifecycleEvent {
        LifecycleEvent::Started {
            surface: SurfaceHandle::new(n),
        }
    }

    fn stopped(n: u64) -> LifecycleEvent {
        LifecycleEvent::Stopped {
            surface: SurfaceHandle::new(n),
        }
    }

    fn created(n: u64, component: &str) -> LifecycleEvent {
        LifecycleEvent::Created {
            surface: SurfaceHandle::new(n),
            component: ComponentId::new(component),
        }
    }

    #[test]
    fn test_starts_in_background() {
        let tracker = LivenessTracker::new();
        assert!(tracker.is_background());
        assert_eq!(tracker.last_created(), None);
    }

    #[test]
    fn test_start_stop_pairs() {
        let tracker = LivenessTracker::new();
        tracker.apply(&started(1));
        tracker.apply(&started(2));
        assert_eq!(tracker.active_surfaces(), 2);
        assert!(!tracker.is_background());

        tracker.apply(&stopped(1));
        assert!(!tracker.is_background());
        tracker.apply(&stopped(2));
        assert!(tracker.is_background());
    }

    #[test]
    fn test_unbalanced_stop_floors_at_zero() {
        let tracker = LivenessTracker::new();
        tracker.apply(&stopped(1));
        tracker.apply(&stopped(1));
        assert_eq!(tracker.active_surfaces(), 0);

        tracker.apply(&started(1));
        assert_eq!(tracker.active_surfaces(), 1);
    }

    #[test]
    fn test_background_iff_zero_for_sequences() {
        // Checked after every event of a well-formed sequence
        let sequence = [
            started(1),
            started(2),
            stopped(2),
            started(3),
            stopped(1),
            stopped(3),
            started(4),
            stopped(4),
        ];
        let tracker = LivenessTracker::new();
        let mut expected: usize = 0;
        for event in &sequence {
            tracker.apply(event);
            match event {
                LifecycleEvent::Started { .. } => expected += 1,
                LifecycleEvent::Stopped { .. } => expected -= 1,
                LifecycleEvent::Created { .. } => {}
            }
            let snapshot = tracker.snapshot();
            assert_eq!(snapshot.active_surfaces, expected);
            assert_eq!(snapshot.is_background(), expected == 0);
        }
    }

    #[test]
    fn test_created_overwrites_last() {
        let tracker = LivenessTracker::new();
        tracker.apply(&created(1, "my_app::main_window"));
        tracker.apply(&created(2, "my_app::settings"));
        assert_eq!(tracker.last_created(), Some(SurfaceHandle::new(2)));
    }

    #[test]
    fn test_recovery_surface_not_recorded() {
        let tracker = LivenessTracker::new();
        tracker.exclude(ComponentId::new("my_app::recovery"));
        tracker.apply(&created(1, "my_app::main_window"));
        tracker.apply(&created(2, "my_app::recovery"));
        assert_eq!(tracker.last_created(), Some(SurfaceHandle::new(1)));
    }

    #[test]
    fn test_take_clears_reference() {
        let tracker = LivenessTracker::new();
        tracker.apply(&created(7, "my_app::main_window"));
        assert_eq!(tracker.take_last_created(), Some(SurfaceHandle::new(7)));
        assert_eq!(tracker.last_created(), None);
    }

    #[test]
    fn test_concurrent_events() {
        let tracker = Arc::new(LivenessTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        tracker.apply(&started(i));
                        tracker.apply(&stopped(i));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.active_surfaces(), 0);
        assert!(tracker.is_background());
    }
}
