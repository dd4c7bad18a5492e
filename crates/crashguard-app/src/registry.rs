//! Component registry backed by the `[[components]]` table

use std::path::{Path, PathBuf};

use crashguard_core::resolver::DEFAULT_RECOVERY_SURFACE;
use crashguard_core::{ComponentId, ComponentRegistry};

use crate::config::ComponentConfig;

/// Executable name of the built-in recovery surface
pub const RECOVERY_BINARY: &str = "crashguard-recovery";

/// A resolved command line for a component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Registry of configured components
#[derive(Debug, Clone, Default)]
pub struct ConfigRegistry {
    components: Vec<ComponentConfig>,
    entry_point: Option<ComponentId>,
}

impl ConfigRegistry {
    pub fn new(components: Vec<ComponentConfig>) -> Self {
        Self {
            components,
            entry_point: None,
        }
    }

    /// Use the current executable as the default entry point
    pub fn with_current_exe(mut self) -> Self {
        match std::env::current_exe() {
            Ok(exe) => self.entry_point = Some(ComponentId::new(exe.to_string_lossy())),
            Err(e) => log::warn!("Cannot determine current executable: {}", e),
        }
        self
    }

    pub fn with_entry_point(mut self, entry_point: ComponentId) -> Self {
        self.entry_point = Some(entry_point);
        self
    }

    pub fn get(&self, id: &ComponentId) -> Option<&ComponentConfig> {
        self.components.iter().find(|c| &c.id == id)
    }

    /// How to start `id`
    ///
    /// Registered components use their configured command. The built-in
    /// recovery surface is looked up next to the current executable, then
    /// on `PATH`. Any other id naming an existing file is run as is.
    pub fn command_for(&self, id: &ComponentId) -> Option<LaunchCommand> {
        if let Some(component) = self.get(id) {
            return Some(LaunchCommand {
                program: PathBuf::from(&component.command),
                args: component.args.clone(),
            });
        }

        if id.as_str() == DEFAULT_RECOVERY_SURFACE {
            return Some(LaunchCommand {
                program: sibling_executable(RECOVERY_BINARY)
                    .unwrap_or_else(|| PathBuf::from(RECOVERY_BINARY)),
                args: Vec::new(),
            });
        }

        let path = Path::new(id.as_str());
        if path.is_absolute() && path.is_file() {
            return Some(LaunchCommand {
                program: path.to_path_buf(),
                args: Vec::new(),
            });
        }

        None
    }
}

impl ComponentRegistry for ConfigRegistry {
    fn query(&self, action: &str) -> Vec<ComponentId> {
        self.components
            .iter()
            .filter(|c| c.actions.iter().any(|a| a == action))
            .map(|c| c.id.clone())
            .collect()
    }

    fn default_entry_point(&self) -> Option<ComponentId> {
        self.entry_point.clone()
    }
}

fn sibling_executable(name: &str) -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(format!("{}{}", name, std::env::consts::EXE_SUFFIX));
    candidate.is_file().then_some(candidate)
}
