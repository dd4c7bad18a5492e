//! crashguard - Crash supervision with recovery handoff
//!
//! This is the main entry point. It runs the built-in recovery surface,
//! which is what a supervised process launches after a crash when no other
//! recovery surface is registered.

fn main() {
    std::process::exit(crashguard_recovery::run());
}
