//! Panic hook classification against the real process-wide hook
//!
//! Kept in its own test binary with a single test: installing our hook is
//! process-wide and cannot be undone.

use std::panic::PanicHookInfo;

use crashguard_core::{HookSlot, HookState, PanicHookSlot};

#[test]
fn test_panic_hook_slot_states() {
    let slot = PanicHookSlot;

    // Taking the hook leaves the std default in place
    let _ = std::panic::take_hook();
    assert_eq!(slot.state(), HookState::Default);
    assert_eq!(slot.state(), HookState::Default);

    std::panic::set_hook(Box::new(|_: &PanicHookInfo<'_>| {}));
    assert_eq!(slot.state(), HookState::Foreign);
    // Inspecting puts the foreign hook back
    assert_eq!(slot.state(), HookState::Foreign);

    let previous = slot.replace(Box::new(|_: &PanicHookInfo<'_>| {}));
    assert!(previous.is_some());
    assert_eq!(slot.state(), HookState::Ours);
}
