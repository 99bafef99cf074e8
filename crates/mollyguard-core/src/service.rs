//! Sequences config, unit guard, confirmation gate, and key lifecycle into the
//! handful of linear flows the CLI exposes.

use crate::config::MollyguardConfig;
use crate::confirm::{ConfirmationGate, Prompt};
use crate::error::{MollyguardError, MollyguardResult};
use crate::guard::UnitGuard;
use crate::keys::KeyLifecycle;
use crate::provider::{KeySlotManager, PowerAction, ServiceManager, SlotRemoval};
use crate::workflow::{WorkflowLevel, WorkflowReport};
use log::warn;
use std::sync::Arc;

pub struct MollyguardService<M: ServiceManager, K: KeySlotManager> {
    config: Arc<MollyguardConfig>,
    guard: UnitGuard<M>,
    keys: KeyLifecycle<K>,
    gate: ConfirmationGate,
}

impl<M: ServiceManager, K: KeySlotManager> MollyguardService<M, K> {
    pub fn new(config: Arc<MollyguardConfig>, manager: M, slots: K) -> Self {
        let gate = ConfirmationGate::new(config.guard.prompt_hostname);
        let keys = KeyLifecycle::new(slots, config.guard.wipe_passes);
        Self {
            config,
            guard: UnitGuard::new(manager),
            keys,
            gate,
        }
    }

    pub fn guard(&self) -> &UnitGuard<M> {
        &self.guard
    }

    pub fn keys(&self) -> &KeyLifecycle<K> {
        &self.keys
    }

    /// Boot-time entry: mask every configured unit, then provision keys.
    pub fn start(&self) -> MollyguardResult<WorkflowReport> {
        let mut report = WorkflowReport::new("Mollyguard armed");
        let units = self.config.units();
        if units.is_empty() {
            report.push(WorkflowLevel::Warn, "No units configured; nothing masked.");
        } else {
            self.guard.mask_all(&units)?;
            report.push(
                WorkflowLevel::Success,
                format!("Masked {}", units.join(", ")),
            );
        }

        self.provision_into(&mut report)?;
        Ok(report)
    }

    /// Lift every configured mask.
    pub fn stop(&self) -> MollyguardResult<WorkflowReport> {
        let mut report = WorkflowReport::new("Mollyguard disarmed");
        let units = self.config.units();
        self.guard.unmask_all(&units)?;
        report.push(
            WorkflowLevel::Warn,
            format!("Unmasked {} unit(s); power actions are unguarded", units.len()),
        );
        Ok(report)
    }

    /// Provision auto-unlock keys for every configured volume.
    pub fn provision_keys(&self) -> MollyguardResult<WorkflowReport> {
        let mut report = WorkflowReport::new("Auto-unlock keys provisioned");
        self.provision_into(&mut report)?;
        Ok(report)
    }

    fn provision_into(&self, report: &mut WorkflowReport) -> MollyguardResult<()> {
        if self.config.volumes.is_empty() {
            report.push(WorkflowLevel::Info, "No volumes configured; no keys provisioned.");
            return Ok(());
        }

        for volume in &self.config.volumes {
            let provisioned = self.keys.provision(volume)?;
            report.push(
                WorkflowLevel::Security,
                format!(
                    "Added {}-byte key slot on {} via {} (sha256 {})",
                    provisioned.key_size,
                    provisioned.device,
                    provisioned.key_file.display(),
                    provisioned.fingerprint
                ),
            );
        }
        Ok(())
    }

    /// Erase the key file and key slot of every configured volume.
    ///
    /// Every volume is attempted; the first failure is returned afterwards.
    pub fn clear_keys(&self) -> MollyguardResult<WorkflowReport> {
        let mut report = WorkflowReport::new("Auto-unlock keys cleared");
        let mut first_error = None;

        for volume in &self.config.volumes {
            match self.keys.clear(volume) {
                Ok(cleared) => {
                    let message = match (cleared.file_wiped, cleared.slot) {
                        (false, _) => format!(
                            "No key file at {} for {}",
                            cleared.key_file.display(),
                            cleared.device
                        ),
                        (true, Some(SlotRemoval::NotRegistered)) => format!(
                            "Wiped {}; no matching key slot on {}",
                            cleared.key_file.display(),
                            cleared.device
                        ),
                        (true, _) => format!(
                            "Wiped {} and removed its key slot from {}",
                            cleared.key_file.display(),
                            cleared.device
                        ),
                    };
                    report.push(WorkflowLevel::Security, message);
                }
                Err(err) => {
                    warn!("{err}");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Confirm with the operator, then unmask and dispatch `action`.
    ///
    /// Actions that end the boot session first provision the auto-unlock
    /// keys for the next boot. A provisioning failure leaves every unit
    /// masked.
    pub fn power<P: Prompt>(
        &self,
        action: PowerAction,
        hostname: &str,
        prompt: &mut P,
    ) -> MollyguardResult<WorkflowReport> {
        if !self.gate.confirm(hostname, prompt) {
            return Err(MollyguardError::ConfirmationFailed(format!(
                "hostname not confirmed; {action} aborted"
            )));
        }

        let mut report = WorkflowReport::new(format!("{action} requested"));
        if action.ends_session() {
            self.provision_into(&mut report)?;
        }

        self.guard.unmask_and_invoke(action)?;
        report.push(
            WorkflowLevel::Success,
            format!("Unmasked {} and dispatched {action}", action.units().join(", ")),
        );
        Ok(report)
    }
}
