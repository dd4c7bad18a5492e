//! Application bootstrap marker
//!
//! Hosts run their early initialisation inside [`run`]. A fault whose
//! stack passes through it happened before the application was usable,
//! so relaunching it through a recovery surface would only fault again.

/// Origin identity of [`run`] as it appears in backtraces
pub const ORIGIN: &str = "crashguard_core::bootstrap::run";

/// Run application bootstrap code
#[inline(never)]
pub fn run<T>(init: impl FnOnce() -> T) -> T {
    // black_box keeps this frame from being turned into a tail call
    std::hint::black_box(init())
}
