//! Lifecycle of the ephemeral auto-unlock key: provision, then clear once the
//! volume has been opened.

use crate::config::{VolumeKeyPolicy, MAX_KEY_SIZE};
use crate::error::{MollyguardError, MollyguardResult};
use crate::keyfile::{fingerprint, generate_key, wipe_key_file, write_key_file};
use crate::provider::{KeySlotManager, SlotRemoval};
use log::{info, warn};
use std::path::PathBuf;

/// What `provision` left behind for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    pub device: String,
    pub key_file: PathBuf,
    pub key_size: usize,
    pub fingerprint: String,
}

/// What `clear` found and removed for one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearReport {
    pub device: String,
    pub key_file: PathBuf,
    pub file_wiped: bool,
    pub slot: Option<SlotRemoval>,
}

pub struct KeyLifecycle<K: KeySlotManager> {
    slots: K,
    wipe_passes: u32,
}

impl<K: KeySlotManager> KeyLifecycle<K> {
    pub fn new(slots: K, wipe_passes: u32) -> Self {
        Self { slots, wipe_passes }
    }

    pub fn slots(&self) -> &K {
        &self.slots
    }

    /// Generate a fresh key, persist it atomically, and register it as an
    /// additional key slot. An unregistered key never stays on disk.
    ///
    /// A key left over from an earlier provision is cleared first, so each
    /// volume carries at most one auto-unlock slot.
    pub fn provision(&self, policy: &VolumeKeyPolicy) -> MollyguardResult<ProvisionReport> {
        let path = policy.key_path();
        if policy.key_size == 0 || policy.key_size > MAX_KEY_SIZE {
            return Err(provision_error(
                policy,
                format!("key_size must be between 1 and {MAX_KEY_SIZE} bytes"),
            ));
        }

        if path.exists() {
            info!(
                "stale key {} found for {}; clearing before provisioning",
                path.display(),
                policy.device
            );
            self.clear(policy)
                .map_err(|err| provision_error(policy, format!("clear stale key: {err}")))?;
        }

        let fingerprint = {
            let key = generate_key(policy.key_size);
            write_key_file(&path, &key).map_err(|err| {
                provision_error(policy, format!("write {}: {err}", path.display()))
            })?;
            fingerprint(&key)
        };

        let authorizing = policy.authorizing_key_path();
        if let Err(err) = self
            .slots
            .add_key(&policy.device, &path, authorizing.as_deref())
        {
            if let Err(wipe_err) = wipe_key_file(&path, self.wipe_passes) {
                warn!(
                    "[MG4001] could not remove unregistered key {}: {wipe_err}",
                    path.display()
                );
            }
            return Err(provision_error(policy, format!("register key slot: {err}")));
        }

        info!(
            "provisioned {}-byte key {} for {} (sha256 {fingerprint})",
            policy.key_size,
            path.display(),
            policy.device
        );

        Ok(ProvisionReport {
            device: policy.device.clone(),
            key_file: path,
            key_size: policy.key_size,
            fingerprint,
        })
    }

    /// Drop the key slot and erase the key file. Missing files are fine.
    ///
    /// The slot is removed first because cryptsetup identifies it by the file
    /// content. The file is wiped even if slot removal fails.
    pub fn clear(&self, policy: &VolumeKeyPolicy) -> MollyguardResult<ClearReport> {
        let path = policy.key_path();
        if !path.exists() {
            info!(
                "no key file at {} for {}; nothing to clear",
                path.display(),
                policy.device
            );
            return Ok(ClearReport {
                device: policy.device.clone(),
                key_file: path,
                file_wiped: false,
                slot: None,
            });
        }

        let slot = self.slots.remove_key(&policy.device, &path);
        if let Ok(SlotRemoval::NotRegistered) = &slot {
            warn!(
                "[MG4101] key in {} was not registered on {}",
                path.display(),
                policy.device
            );
        }

        let wiped = wipe_key_file(&path, self.wipe_passes)
            .map_err(|err| clear_error(policy, format!("wipe {}: {err}", path.display())))?;

        let slot = slot.map_err(|err| clear_error(policy, format!("remove key slot: {err}")))?;

        info!("cleared auto-unlock key {} for {}", path.display(), policy.device);
        Ok(ClearReport {
            device: policy.device.clone(),
            key_file: path,
            file_wiped: wiped,
            slot: Some(slot),
        })
    }
}

fn provision_error(policy: &VolumeKeyPolicy, reason: impl Into<String>) -> MollyguardError {
    MollyguardError::Provision {
        device: policy.device.clone(),
        reason: reason.into(),
    }
}

fn clear_error(policy: &VolumeKeyPolicy, reason: impl Into<String>) -> MollyguardError {
    MollyguardError::Clear {
        device: policy.device.clone(),
        reason: reason.into(),
    }
}
