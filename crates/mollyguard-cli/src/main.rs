//! `mollyguardctl`: guard power targets and manage auto-unlock keys.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mollyguard_core::{
    config::DEFAULT_CONFIG_PATH,
    confirm::{current_hostname, TerminalPrompt},
    logging,
    workflow::{WorkflowLevel, WorkflowReport},
    MollyguardConfig, MollyguardError, MollyguardService, PowerAction,
};
use mollyguard_system::{CryptsetupSlots, SystemctlManager};
use schemars::schema_for;
use serde_json::to_string_pretty;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "mollyguardctl",
    version,
    about = "Molly-guard for systemd power targets with LUKS auto-unlock keys."
)]
struct Cli {
    /// Path to the mollyguard configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mask the guarded units and provision auto-unlock keys (boot service).
    Start,

    /// Unmask every guarded unit.
    Stop,

    /// Safely reboot the system.
    Reboot,

    /// Safely power off the system.
    Poweroff,

    /// Safely shut down (power off) the system.
    Shutdown,

    /// Safely halt the system.
    Halt,

    /// Safely suspend the system.
    Suspend,

    /// Safely hibernate the system.
    Hibernate,

    /// Safely suspend, then hibernate the system.
    SuspendThenHibernate,

    /// Provision auto-unlock keys without touching unit masks.
    ProvisionKey,

    /// Remove the auto-unlock key slots and erase their key files.
    #[command(alias = "clear-luks")]
    ClearKey,

    /// Validate a configuration file or emit the config schema.
    Validate {
        /// Path to the configuration file to validate.
        #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
        file: PathBuf,

        /// Output the JSON schema instead of validating a file.
        #[arg(long)]
        schema: bool,
    },
}

impl Commands {
    fn power_action(&self) -> Option<PowerAction> {
        match self {
            Commands::Reboot => Some(PowerAction::Reboot),
            Commands::Poweroff => Some(PowerAction::Poweroff),
            Commands::Shutdown => Some(PowerAction::Shutdown),
            Commands::Halt => Some(PowerAction::Halt),
            Commands::Suspend => Some(PowerAction::Suspend),
            Commands::Hibernate => Some(PowerAction::Hibernate),
            Commands::SuspendThenHibernate => Some(PowerAction::SuspendThenHibernate),
            _ => None,
        }
    }
}

/// Entry point: run, then map the failure class onto a distinct exit code.
fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn run() -> Result<()> {
    logging::init("info");
    let cli = Cli::parse();

    if let Commands::Validate { file, schema } = &cli.command {
        return validate(file, *schema);
    }

    let config = Arc::new(load_config(&cli.config)?);
    let manager = SystemctlManager::from_config(&config);
    let slots = CryptsetupSlots::from_config(&config);
    let service = MollyguardService::new(config, manager, slots);

    let report = if let Some(action) = cli.command.power_action() {
        let hostname = current_hostname()?;
        service.power(action, &hostname, &mut TerminalPrompt)?
    } else {
        match cli.command {
            Commands::Start => service.start()?,
            Commands::Stop => service.stop()?,
            Commands::ProvisionKey => service.provision_keys()?,
            Commands::ClearKey => service.clear_keys()?,
            _ => unreachable!("power actions and validate are handled above"),
        }
    };

    print_report(report);
    Ok(())
}

fn load_config(path: &Path) -> Result<MollyguardConfig> {
    MollyguardConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn validate(file: &Path, schema: bool) -> Result<()> {
    if schema {
        let schema = schema_for!(MollyguardConfig);
        println!("{}", to_string_pretty(&schema)?);
        return Ok(());
    }

    let cfg = load_config(file)?;
    println!(
        "Configuration valid ({} units, {} volumes).",
        cfg.guard.units.len(),
        cfg.volumes.len()
    );
    Ok(())
}

/// Exit code of the first `MollyguardError` in the chain, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<MollyguardError>())
        .map(MollyguardError::exit_code)
        .unwrap_or(1)
}

/// Pretty-print a workflow report so humans can follow along.
fn print_report(report: WorkflowReport) {
    println!("{}", report.title);
    for event in report.events {
        println!("  [{}] {}", level_tag(event.level), event.message);
    }
}

/// Short tag used when printing workflow severity levels.
fn level_tag(level: WorkflowLevel) -> &'static str {
    match level {
        WorkflowLevel::Info => "INFO",
        WorkflowLevel::Success => "OK",
        WorkflowLevel::Warn => "WARN",
        WorkflowLevel::Security => "SEC",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommands_map_to_power_actions() {
        let cli = Cli::parse_from(["mollyguardctl", "suspend-then-hibernate"]);
        assert_eq!(
            cli.command.power_action(),
            Some(PowerAction::SuspendThenHibernate)
        );
        let cli = Cli::parse_from(["mollyguardctl", "shutdown"]);
        assert_eq!(cli.command.power_action(), Some(PowerAction::Shutdown));
        let cli = Cli::parse_from(["mollyguardctl", "clear-luks"]);
        assert!(matches!(cli.command, Commands::ClearKey));
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn exit_code_follows_error_class() {
        let err = anyhow::Error::new(MollyguardError::ConfirmationFailed("hostname".into()))
            .context("reboot");
        assert_eq!(exit_code(&err), 3);
        assert_eq!(exit_code(&anyhow::anyhow!("other")), 1);
    }
}
