//! Unit guard: masks power targets and lifts a single mask on request.
//!
//! Mask state lives in the service manager; nothing here caches it.

use crate::error::{MollyguardError, MollyguardResult};
use crate::provider::{PowerAction, ServiceManager};
use log::{info, warn};

pub struct UnitGuard<M: ServiceManager> {
    manager: M,
}

impl<M: ServiceManager> UnitGuard<M> {
    pub fn new(manager: M) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Mask every unit, attempting all of them even after a failure.
    pub fn mask_all(&self, units: &[String]) -> MollyguardResult<()> {
        self.apply_all(units, "mask", |unit| self.manager.mask(unit))
    }

    /// Unmask every unit, attempting all of them even after a failure.
    pub fn unmask_all(&self, units: &[String]) -> MollyguardResult<()> {
        self.apply_all(units, "unmask", |unit| self.manager.unmask(unit))
    }

    fn apply_all<F>(&self, units: &[String], verb: &str, op: F) -> MollyguardResult<()>
    where
        F: Fn(&str) -> MollyguardResult<()>,
    {
        let mut failed = Vec::new();
        for unit in units {
            match op(unit) {
                Ok(()) => info!("{verb}ed {unit}"),
                Err(err) => {
                    warn!("[MG3000] could not {verb} {unit}: {err}");
                    failed.push(unit.clone());
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(MollyguardError::PartialMask { failed })
        }
    }

    /// Unmask the targets `action` needs and dispatch it exactly once.
    /// Nothing is re-masked afterwards, even when the action fails.
    pub fn unmask_and_invoke(&self, action: PowerAction) -> MollyguardResult<()> {
        for unit in action.units() {
            self.manager.unmask(unit)?;
            info!("unmasked {unit} for {action}");
        }

        if let Err(err) = self.manager.power_action(action) {
            warn!(
                "[MG3001] {action} failed; {} left unmasked",
                action.units().join(", ")
            );
            return Err(err);
        }

        info!("{action} dispatched to the service manager");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// In-memory stand-in for systemd's mask state.
    #[derive(Default)]
    pub(crate) struct MockManager {
        pub masked: Mutex<HashSet<String>>,
        pub actions: Mutex<Vec<PowerAction>>,
        pub missing: HashSet<String>,
        pub fail_action: bool,
    }

    impl MockManager {
        pub(crate) fn with_missing(units: &[&str]) -> Self {
            Self {
                missing: units.iter().map(|u| u.to_string()).collect(),
                ..Self::default()
            }
        }

        pub(crate) fn is_masked(&self, unit: &str) -> bool {
            self.masked.lock().unwrap().contains(unit)
        }

        fn check(&self, unit: &str) -> MollyguardResult<()> {
            if self.missing.contains(unit) {
                return Err(MollyguardError::CommandFailed {
                    binary: "/usr/bin/systemctl".into(),
                    args: format!("mask {unit}"),
                    status: 1,
                });
            }
            Ok(())
        }
    }

    impl ServiceManager for MockManager {
        fn mask(&self, unit: &str) -> MollyguardResult<()> {
            self.check(unit)?;
            self.masked.lock().unwrap().insert(unit.to_string());
            Ok(())
        }

        fn unmask(&self, unit: &str) -> MollyguardResult<()> {
            self.check(unit)?;
            self.masked.lock().unwrap().remove(unit);
            Ok(())
        }

        fn power_action(&self, action: PowerAction) -> MollyguardResult<()> {
            if self.fail_action {
                return Err(MollyguardError::CommandFailed {
                    binary: "/usr/bin/systemctl".into(),
                    args: action.verb().to_string(),
                    status: 1,
                });
            }
            self.actions.lock().unwrap().push(action);
            Ok(())
        }
    }

    fn units(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn masking_twice_is_idempotent() {
        let guard = UnitGuard::new(MockManager::default());
        let list = units(&["reboot.target"]);
        guard.mask_all(&list).unwrap();
        guard.mask_all(&list).unwrap();
        assert!(guard.manager().is_masked("reboot.target"));
    }

    #[test]
    fn mask_all_attempts_every_unit_and_reports_failures() {
        let guard = UnitGuard::new(MockManager::with_missing(&["nonexistent.target"]));
        let list = units(&["halt.target", "nonexistent.target", "reboot.target"]);
        let err = guard.mask_all(&list).unwrap_err();
        match err {
            MollyguardError::PartialMask { failed } => {
                assert_eq!(failed, vec!["nonexistent.target".to_string()])
            }
            other => panic!("expected PartialMask, got {other:?}"),
        }
        assert!(guard.manager().is_masked("halt.target"));
        assert!(guard.manager().is_masked("reboot.target"));
    }

    #[test]
    fn unmask_all_clears_masks() {
        let guard = UnitGuard::new(MockManager::default());
        let list = units(&["halt.target", "reboot.target"]);
        guard.mask_all(&list).unwrap();
        guard.unmask_all(&list).unwrap();
        assert!(guard.manager().masked.lock().unwrap().is_empty());
    }

    #[test]
    fn unmask_and_invoke_dispatches_once() {
        let guard = UnitGuard::new(MockManager::default());
        guard
            .mask_all(&units(&["reboot.target", "shutdown.target", "halt.target"]))
            .unwrap();

        guard.unmask_and_invoke(PowerAction::Reboot).unwrap();

        let manager = guard.manager();
        assert!(!manager.is_masked("reboot.target"));
        assert!(!manager.is_masked("shutdown.target"));
        assert!(manager.is_masked("halt.target"));
        assert_eq!(*manager.actions.lock().unwrap(), vec![PowerAction::Reboot]);
    }

    #[test]
    fn failed_action_leaves_target_unmasked() {
        let manager = MockManager {
            fail_action: true,
            ..MockManager::default()
        };
        let guard = UnitGuard::new(manager);
        guard.mask_all(&units(&["poweroff.target"])).unwrap();

        let err = guard.unmask_and_invoke(PowerAction::Poweroff).unwrap_err();
        assert!(matches!(err, MollyguardError::CommandFailed { .. }));
        assert!(!guard.manager().is_masked("poweroff.target"));
    }

    #[test]
    fn unmask_failure_skips_action() {
        let guard = UnitGuard::new(MockManager::with_missing(&["suspend.target"]));
        assert!(guard.unmask_and_invoke(PowerAction::Suspend).is_err());
        assert!(guard.manager().actions.lock().unwrap().is_empty());
    }
}
