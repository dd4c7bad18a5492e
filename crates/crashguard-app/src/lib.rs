//! crashguard-app: Host integration for crashguard
//!
//! This crate wires the supervision core into an ordinary process:
//! configuration file, component registry, process host, crash log,
//! error details and recovery-side actions.

pub mod config;
pub mod crash_state;
pub mod details;
pub mod process_host;
pub mod recovery;
pub mod registry;

use std::sync::Arc;

use crashguard_core::{CrashSupervisor, InstallError, PanicHookSlot, Reporter, SupervisorHandle};

pub use config::{load_config, save_config, AppInfo, ComponentConfig, Config, ConfigError};
pub use crash_state::{CrashRecord, FileCrashJournal};
pub use process_host::ProcessHost;
pub use recovery::RecoveryAction;
pub use registry::ConfigRegistry;

/// A process running under the crash supervisor
pub struct Supervised {
    pub handle: SupervisorHandle,
    pub host: Arc<ProcessHost>,
}

/// Install the crash supervisor for this process as described by `config`
pub fn install_supervisor(
    config: &Config,
    reporter: Option<Arc<dyn Reporter>>,
) -> Result<Supervised, InstallError> {
    let registry = ConfigRegistry::new(config.components.clone()).with_current_exe();
    let host = Arc::new(ProcessHost::new(registry));

    let mut supervisor = CrashSupervisor::new(config.supervisor_config());
    if config.app.crash_log {
        supervisor = supervisor.journal(Arc::new(FileCrashJournal::new(config.app.name.clone())));
    }
    if let Some(reporter) = reporter {
        supervisor = supervisor.reporter(reporter);
    }

    let handle = supervisor.install(host.clone(), &PanicHookSlot)?;
    Ok(Supervised { handle, host })
}
