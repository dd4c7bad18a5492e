//! Host environment abstractions
//!
//! The supervisor talks to its environment only through these traits: the
//! [`Host`] (component registry, surface launching and closing, lifecycle
//! events, process exit), the [`HookSlot`] holding the process-wide panic
//! hook, and an optional [`CrashJournal`] for durable crash records.

use std::io;
use std::panic::PanicHookInfo;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::component::{ComponentId, ComponentRegistry};
use crate::liveness::{LifecycleListener, SurfaceHandle};
use crate::payload::HandoffPayload;

/// Errors raised by a host while launching components
#[derive(Error, Debug)]
pub enum HostError {
    #[error("Unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("Failed to spawn {0}: {1}")]
    Spawn(ComponentId, #[source] io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The environment a supervised process runs in
pub trait Host: ComponentRegistry + Send + Sync {
    /// Start `surface` as a new top-level flow carrying `payload`
    ///
    /// The crashed flow must not be resumable from the new one.
    fn launch(&self, surface: &ComponentId, payload: &HandoffPayload) -> Result<(), HostError>;

    /// Force-close `surface` if it still exists
    ///
    /// Returns false when the surface is already gone.
    fn close_surface(&self, surface: SurfaceHandle) -> bool;

    /// Deliver lifecycle events to `listener` from now on
    fn subscribe_lifecycle(&self, listener: Arc<dyn LifecycleListener>);

    /// End the process with `code`
    fn terminate(&self, code: i32) -> !;
}

/// Durable, best-effort storage for the raw fault text
pub trait CrashJournal: Send + Sync {
    /// Record `fault_text`, returning where it was written
    fn record(&self, fault_text: &str) -> io::Result<PathBuf>;
}

/// A panic hook as accepted by [`std::panic::set_hook`]
pub type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Who currently owns the fault interception hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookState {
    /// The runtime's default hook
    Default,
    /// A crash supervisor installed through this slot
    Ours,
    /// Some other library's hook
    Foreign,
}

/// The process-wide fault interception hook
pub trait HookSlot: Send + Sync {
    /// Inspect the current hook without changing it
    fn state(&self) -> HookState;

    /// Register `hook` as ours, returning a replaced foreign hook
    fn replace(&self, hook: PanicHook) -> Option<PanicHook>;
}

static PANIC_HOOK_OURS: AtomicBool = AtomicBool::new(false);

/// The real [`std::panic`] hook
///
/// There is exactly one per process, so every `PanicHookSlot` value refers
/// to the same slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicHookSlot;

impl PanicHookSlot {
    /// Take the current hook, classifying it against the std default
    fn take_classified() -> (PanicHook, bool) {
        let current = std::panic::take_hook();
        // take_hook() leaves the std default installed and hands it back
        // boxed from the same site, so a second take yields a box with the
        // same data pointer and vtable exactly when `current` is the default.
        let default = std::panic::take_hook();
        let is_default = std::ptr::eq(&*current, &*default);
        (current, is_default)
    }
}

impl HookSlot for PanicHookSlot {
    /// Classify the current hook
    ///
    /// The hook is taken out and set back. A panic on another thread in
    /// that window runs the std default hook instead of the current one.
    fn state(&self) -> HookState {
        if PANIC_HOOK_OURS.load(Ordering::SeqCst) {
            return HookState::Ours;
        }
        let (current, is_default) = Self::take_classified();
        std::panic::set_hook(current);
        if is_default {
            HookState::Default
        } else {
            HookState::Foreign
        }
    }

    fn replace(&self, hook: PanicHook) -> Option<PanicHook> {
        let (previous, is_default) = Self::take_classified();
        std::panic::set_hook(hook);
        PANIC_HOOK_OURS.store(true, Ordering::SeqCst);
        if is_default {
            None
        } else {
            Some(previous)
        }
    }
}
