//! CLI argument parsing for crashguard-recovery

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crashguard_core::{ComponentId, HandoffPayload};

/// crashguard-recovery - Shown after an application crash
#[derive(Parser, Debug)]
#[command(name = "crashguard-recovery")]
#[command(about = "Reports an application crash and offers to restart it")]
#[command(version)]
pub struct Cli {
    /// Fault text of the crash
    #[arg(long = "fault-text", default_value = "", allow_hyphen_values = true)]
    pub fault_text: String,

    /// Component or executable to start on "restart"
    #[arg(long = "restart-target")]
    pub restart_target: Option<String>,

    /// Show the full fault text
    #[arg(long = "show-details", default_value_t = true, action = ArgAction::Set)]
    pub show_details: bool,

    /// Icon hint
    #[arg(long = "icon-id", default_value_t = 0, allow_negative_numbers = true)]
    pub icon_id: i32,

    /// Log level
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Don't prompt; close immediately
    #[arg(long = "non-interactive")]
    pub non_interactive: bool,

    /// Config file (default: platform config dir)
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// The payload this surface was started with
    pub fn payload(&self) -> HandoffPayload {
        HandoffPayload {
            restart_target: self
                .restart_target
                .as_deref()
                .filter(|t| !t.is_empty())
                .map(ComponentId::new),
            show_details: self.show_details,
            fault_text: self.fault_text.clone(),
            icon_id: self.icon_id,
        }
    }
}
