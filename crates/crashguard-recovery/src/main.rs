//! crashguard-recovery - Default recovery surface
//!
//! Main entry point for the recovery surface binary.

fn main() {
    std::process::exit(crashguard_recovery::run());
}
