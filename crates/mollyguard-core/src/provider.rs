use crate::error::MollyguardResult;
use std::fmt;
use std::path::Path;

/// Destructive power operations guarded by the unit masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    Reboot,
    Poweroff,
    Shutdown,
    Halt,
    Suspend,
    Hibernate,
    SuspendThenHibernate,
}

impl PowerAction {
    pub const ALL: [PowerAction; 7] = [
        PowerAction::Reboot,
        PowerAction::Poweroff,
        PowerAction::Shutdown,
        PowerAction::Halt,
        PowerAction::Suspend,
        PowerAction::Hibernate,
        PowerAction::SuspendThenHibernate,
    ];

    /// The `systemctl` verb that carries out this action.
    pub fn verb(self) -> &'static str {
        match self {
            PowerAction::Reboot => "reboot",
            PowerAction::Poweroff | PowerAction::Shutdown => "poweroff",
            PowerAction::Halt => "halt",
            PowerAction::Suspend => "suspend",
            PowerAction::Hibernate => "hibernate",
            PowerAction::SuspendThenHibernate => "suspend-then-hibernate",
        }
    }

    /// Whether the action ends the boot session, so the next start goes
    /// through the volume unlock again.
    pub fn ends_session(self) -> bool {
        matches!(
            self,
            PowerAction::Reboot | PowerAction::Poweroff | PowerAction::Shutdown | PowerAction::Halt
        )
    }

    /// Targets that must be unmasked for the verb to go through.
    ///
    /// systemd's reboot, poweroff and halt services all require
    /// `shutdown.target`, so it travels with them.
    pub fn units(self) -> &'static [&'static str] {
        match self {
            PowerAction::Reboot => &["reboot.target", "shutdown.target"],
            PowerAction::Poweroff | PowerAction::Shutdown => {
                &["poweroff.target", "shutdown.target"]
            }
            PowerAction::Halt => &["halt.target", "shutdown.target"],
            PowerAction::Suspend => &["suspend.target"],
            PowerAction::Hibernate => &["hibernate.target"],
            PowerAction::SuspendThenHibernate => &["suspend-then-hibernate.target"],
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PowerAction::Shutdown => "shutdown",
            other => other.verb(),
        };
        f.write_str(name)
    }
}

/// Abstraction over the service manager that owns unit mask state.
///
/// Implementations hold no state of their own: mask and unmask must be
/// idempotent so concurrent invocations converge.
pub trait ServiceManager {
    fn mask(&self, unit: &str) -> MollyguardResult<()>;

    fn unmask(&self, unit: &str) -> MollyguardResult<()>;

    /// Dispatch the power action. Returning `Ok` means the request was
    /// accepted, not that the machine has gone down.
    fn power_action(&self, action: PowerAction) -> MollyguardResult<()>;
}

/// Outcome of asking the encryption tool to drop a key slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRemoval {
    Removed,
    NotRegistered,
}

/// Abstraction over LUKS key-slot management.
///
/// Key material only ever crosses this boundary as a file path.
pub trait KeySlotManager {
    /// Register `key_file` as an additional unlock credential for `device`.
    fn add_key(
        &self,
        device: &str,
        key_file: &Path,
        authorizing_key_file: Option<&Path>,
    ) -> MollyguardResult<()>;

    /// Remove the slot unlocked by `key_file` from `device`.
    fn remove_key(&self, device: &str, key_file: &Path) -> MollyguardResult<SlotRemoval>;
}
