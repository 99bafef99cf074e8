//! `KeySlotManager` backed by the host `cryptsetup`.
//!
//! Keys are always handed over as file paths, never as arguments or stdin.

use crate::command::CommandRunner;
use log::debug;
use mollyguard_core::config::MollyguardConfig;
use mollyguard_core::error::MollyguardResult;
use mollyguard_core::provider::{KeySlotManager, SlotRemoval};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// cryptsetup's exit status for "No key available with this passphrase".
const EXIT_NO_MATCHING_KEY: i32 = 2;

#[derive(Debug, Clone)]
pub struct CryptsetupSlots {
    runner: CommandRunner,
}

impl CryptsetupSlots {
    pub fn from_config(config: &MollyguardConfig) -> Self {
        Self::with_path(config.cryptsetup_path(), config.command_timeout())
    }

    pub fn with_path(path: PathBuf, timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(path, timeout),
        }
    }
}

impl KeySlotManager for CryptsetupSlots {
    fn add_key(
        &self,
        device: &str,
        key_file: &Path,
        authorizing_key_file: Option<&Path>,
    ) -> MollyguardResult<()> {
        let new_key = key_file.to_string_lossy().into_owned();
        match authorizing_key_file {
            Some(existing) => {
                let existing = existing.to_string_lossy().into_owned();
                let args = [
                    "luksAddKey",
                    "--batch-mode",
                    "--key-file",
                    existing.as_str(),
                    device,
                    new_key.as_str(),
                ];
                let out = self.runner.run(&args, None)?;
                self.runner.check(&args, out)?;
            }
            None => {
                // cryptsetup asks the operator for an existing passphrase
                let args = ["luksAddKey", "--batch-mode", device, new_key.as_str()];
                let out = self.runner.run_attached(&args)?;
                self.runner.check(&args, out)?;
            }
        }
        Ok(())
    }

    fn remove_key(&self, device: &str, key_file: &Path) -> MollyguardResult<SlotRemoval> {
        // no --batch-mode: cryptsetup must keep refusing to drop the last slot
        let key = key_file.to_string_lossy().into_owned();
        let args = ["luksRemoveKey", device, key.as_str()];
        let out = self.runner.run(&args, None)?;
        match out.status {
            0 => Ok(SlotRemoval::Removed),
            EXIT_NO_MATCHING_KEY => {
                debug!("luksRemoveKey on {device}: {}", out.diagnostic());
                Ok(SlotRemoval::NotRegistered)
            }
            status => {
                debug!("luksRemoveKey on {device}: {}", out.diagnostic());
                Err(self.runner.failure(&args, status))
            }
        }
    }
}
