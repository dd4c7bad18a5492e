//! crashguard-recovery: Default recovery surface
//!
//! Started by the crash supervisor with the handoff payload on its command
//! line. Shows what happened and lets the user restart the application or
//! close.

pub mod cli;

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Context;
use chrono::Local;

use crashguard_app::crash_state::{self, crash_log_path};
use crashguard_app::details::describe;
use crashguard_app::recovery::{available_actions, perform, RecoveryAction};
use crashguard_app::{install_supervisor, load_config, Config, ConfigRegistry, ProcessHost};
use cli::Cli;

/// Run the recovery surface, returning the process exit code
pub fn run() -> i32 {
    let cli = Cli::parse_args();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level.as_str()))
        .init();

    let config = load(&cli);

    // A crash in here is conflictive and ends in plain termination
    let supervised = crashguard_core::bootstrap::run(|| install_supervisor(&config, None));
    let host = match supervised {
        Ok(supervised) => supervised.host,
        Err(e) => {
            log::warn!("Running without crash supervision: {}", e);
            std::sync::Arc::new(ProcessHost::new(ConfigRegistry::new(config.components.clone())))
        }
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    match run_with(&cli, &config, &host, &mut input, &mut output) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{:#}", e);
            1
        }
    }
}

fn load(cli: &Cli) -> Config {
    let loaded = match cli.config {
        Some(ref path) => crashguard_app::config::load_config_from(path),
        None => load_config(),
    };
    loaded.unwrap_or_else(|e| {
        log::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    })
}

/// Show the crash and carry out the chosen action
pub fn run_with(
    cli: &Cli,
    config: &Config,
    host: &ProcessHost,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> anyhow::Result<i32> {
    let mut payload = cli.payload();
    if payload.fault_text.is_empty() {
        // Started by hand: show the last recorded crash once
        let path = crash_log_path();
        if let Some(text) = last_crash_text(&path) {
            payload.fault_text = text;
            if let Err(e) = crash_state::clear_crash_record(&path) {
                log::warn!("Failed to clear crash record: {}", e);
            }
        }
    }

    writeln!(output, "{} has stopped unexpectedly.", config.app.name)?;
    writeln!(output)?;
    if payload.show_details {
        writeln!(output, "{}", describe(&payload, &config.app, Local::now()))?;
        writeln!(output)?;
    }

    let actions = available_actions(&payload);
    let action = if cli.non_interactive {
        RecoveryAction::Close
    } else {
        prompt(&actions, input, output)?
    };

    perform(&action, host).with_context(|| format!("{} failed", action.label()))
}

fn last_crash_text(path: &Path) -> Option<String> {
    if !path.exists() {
        return None;
    }
    match crash_state::read_crash_record(path) {
        Ok(record) => Some(record.fault_text),
        Err(e) => {
            log::debug!("No usable crash record: {}", e);
            None
        }
    }
}

/// Ask until a valid choice is made; end of input means close
fn prompt(
    actions: &[RecoveryAction],
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> anyhow::Result<RecoveryAction> {
    loop {
        for (i, action) in actions.iter().enumerate() {
            write!(output, "[{}] {}  ", i + 1, action.label())?;
        }
        writeln!(output)?;
        write!(output, "> ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line).context("Failed to read choice")? == 0 {
            return Ok(RecoveryAction::Close);
        }

        if let Some(action) = parse_choice(line.trim(), actions) {
            return Ok(action);
        }
        writeln!(output, "Unknown choice: {}", line.trim())?;
    }
}

fn parse_choice(choice: &str, actions: &[RecoveryAction]) -> Option<RecoveryAction> {
    if let Ok(n) = choice.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| actions.get(i)).cloned();
    }
    let choice = choice.to_ascii_lowercase();
    if choice.is_empty() {
        return None;
    }
    actions
        .iter()
        .find(|a| a.label().to_ascii_lowercase().starts_with(&choice))
        .cloned()
}
