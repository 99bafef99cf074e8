//! `ServiceManager` backed by the host `systemctl`.

use crate::command::CommandRunner;
use mollyguard_core::config::MollyguardConfig;
use mollyguard_core::error::MollyguardResult;
use mollyguard_core::provider::{PowerAction, ServiceManager};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SystemctlManager {
    runner: CommandRunner,
}

impl SystemctlManager {
    pub fn from_config(config: &MollyguardConfig) -> Self {
        Self::with_path(config.systemctl_path(), config.command_timeout())
    }

    pub fn with_path(path: PathBuf, timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(path, timeout),
        }
    }
}

impl ServiceManager for SystemctlManager {
    fn mask(&self, unit: &str) -> MollyguardResult<()> {
        self.runner.run_checked(&["mask", unit]).map(|_| ())
    }

    fn unmask(&self, unit: &str) -> MollyguardResult<()> {
        self.runner.run_checked(&["unmask", unit]).map(|_| ())
    }

    fn power_action(&self, action: PowerAction) -> MollyguardResult<()> {
        self.runner.run_checked(&[action.verb()]).map(|_| ())
    }
}
