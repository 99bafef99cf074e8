use crate::error::{MollyguardError, MollyguardResult};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Location `mollyguardctl` reads when no `--config` flag is given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/mollyguard.toml";

/// cryptsetup's default ceiling for key files (8 MiB).
pub const MAX_KEY_SIZE: usize = 8 * 1024 * 1024;

/// Power-related targets masked when the config does not name its own set.
pub const DEFAULT_UNITS: &[&str] = &[
    "halt.target",
    "hibernate.target",
    "poweroff.target",
    "reboot.target",
    "shutdown.target",
    "suspend.target",
    "suspend-then-hibernate.target",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GuardConfig {
    /// Units masked by `start`. An explicit empty list disables masking.
    #[serde(default = "default_units")]
    pub units: BTreeSet<String>,

    #[serde(default = "default_systemctl")]
    pub systemctl: String,

    #[serde(default = "default_cryptsetup")]
    pub cryptsetup: String,

    /// Require the operator to retype the hostname before a power action.
    #[serde(default = "default_prompt_hostname")]
    pub prompt_hostname: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of zero-overwrite passes before a key file is unlinked.
    #[serde(default = "default_wipe_passes")]
    pub wipe_passes: u32,
}

fn default_units() -> BTreeSet<String> {
    DEFAULT_UNITS.iter().map(|unit| unit.to_string()).collect()
}

fn default_systemctl() -> String {
    "/usr/bin/systemctl".to_string()
}

fn default_cryptsetup() -> String {
    "/usr/sbin/cryptsetup".to_string()
}

fn default_prompt_hostname() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_wipe_passes() -> u32 {
    1
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            units: default_units(),
            systemctl: default_systemctl(),
            cryptsetup: default_cryptsetup(),
            prompt_hostname: default_prompt_hostname(),
            timeout_secs: default_timeout_secs(),
            wipe_passes: default_wipe_passes(),
        }
    }
}

/// Auto-unlock key policy for one encrypted volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VolumeKeyPolicy {
    /// Block device or `UUID=` reference understood by cryptsetup.
    pub device: String,

    /// Where the boot-time unlock step expects the key file.
    pub key_file: String,

    #[serde(default = "default_key_size")]
    pub key_size: usize,

    /// Existing key file that authorises `luksAddKey`. When unset cryptsetup
    /// asks for an existing passphrase on the attached terminal.
    #[serde(default)]
    pub authorizing_key_file: Option<String>,
}

fn default_key_size() -> usize {
    2048
}

impl VolumeKeyPolicy {
    pub fn key_path(&self) -> PathBuf {
        PathBuf::from(&self.key_file)
    }

    pub fn authorizing_key_path(&self) -> Option<PathBuf> {
        self.authorizing_key_file.as_ref().map(PathBuf::from)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct MollyguardConfig {
    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub volumes: Vec<VolumeKeyPolicy>,

    #[serde(skip)]
    pub path: PathBuf,
}

impl MollyguardConfig {
    /// Load the TOML config at `path`. A missing file yields the defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> MollyguardResult<Self> {
        let path = path.as_ref();
        let mut cfg = match fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<Self>(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!("{} not found; using built-in defaults", path.display());
                Self::default()
            }
            Err(err) => return Err(err.into()),
        };

        cfg.path = path.to_path_buf();

        let issues = cfg.validate();
        if !issues.is_empty() {
            return Err(MollyguardError::InvalidConfig(issues.join("; ")));
        }

        Ok(cfg)
    }

    /// Collect every semantic problem serde cannot catch on its own.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        let guard = &self.guard;

        require_absolute(&mut issues, "guard.systemctl", &guard.systemctl);
        require_absolute(&mut issues, "guard.cryptsetup", &guard.cryptsetup);
        if guard.timeout_secs == 0 {
            issues.push("guard.timeout_secs must be greater than zero".to_string());
        }
        if guard.wipe_passes == 0 {
            issues.push("guard.wipe_passes must be greater than zero".to_string());
        }
        if guard.units.iter().any(|unit| unit.trim().is_empty()) {
            issues.push("guard.units must not contain blank entries".to_string());
        }

        let mut key_files = HashSet::new();
        for (idx, volume) in self.volumes.iter().enumerate() {
            let label = format!("volumes[{idx}]");
            if volume.device.trim().is_empty() {
                issues.push(format!("{label}.device must not be empty"));
            }
            require_absolute(&mut issues, &format!("{label}.key_file"), &volume.key_file);
            if !key_files.insert(volume.key_file.as_str()) {
                issues.push(format!(
                    "{label}.key_file {} is shared with another volume",
                    volume.key_file
                ));
            }
            if volume.key_size == 0 {
                issues.push(format!("{label}.key_size must be greater than zero"));
            } else if volume.key_size > MAX_KEY_SIZE {
                issues.push(format!(
                    "{label}.key_size must not exceed {MAX_KEY_SIZE} bytes (got {})",
                    volume.key_size
                ));
            }
            if let Some(auth) = &volume.authorizing_key_file {
                require_absolute(&mut issues, &format!("{label}.authorizing_key_file"), auth);
            }
        }

        issues
    }

    pub fn units(&self) -> Vec<String> {
        self.guard.units.iter().cloned().collect()
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.guard.timeout_secs)
    }

    pub fn systemctl_path(&self) -> PathBuf {
        PathBuf::from(&self.guard.systemctl)
    }

    pub fn cryptsetup_path(&self) -> PathBuf {
        PathBuf::from(&self.guard.cryptsetup)
    }
}

fn require_absolute(issues: &mut Vec<String>, field: &str, value: &str) {
    if value.trim().is_empty() {
        issues.push(format!("{field} must not be empty"));
    } else if !Path::new(value).is_absolute() {
        issues.push(format!("{field} must be an absolute path (got `{value}`)"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mollyguard.toml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = MollyguardConfig::load(&path).unwrap();
        assert_eq!(cfg.guard.units.len(), 7);
        assert!(cfg.guard.units.contains("reboot.target"));
        assert_eq!(cfg.guard.systemctl, "/usr/bin/systemctl");
        assert!(cfg.guard.prompt_hostname);
        assert!(cfg.volumes.is_empty());
        assert_eq!(cfg.path, path);
    }

    #[test]
    fn parses_volumes_and_applies_key_size_default() {
        let (_dir, path) = write_config(
            r#"
[guard]
prompt_hostname = false

[[volumes]]
device = "/dev/sda2"
key_file = "/run/key"

[[volumes]]
device = "UUID=3f1c"
key_file = "/run/other.key"
key_size = 4096
authorizing_key_file = "/root/luks.key"
"#,
        );
        let cfg = MollyguardConfig::load(&path).unwrap();
        assert!(!cfg.guard.prompt_hostname);
        assert_eq!(cfg.volumes.len(), 2);
        assert_eq!(cfg.volumes[0].key_size, 2048);
        assert_eq!(cfg.volumes[1].key_size, 4096);
        assert_eq!(
            cfg.volumes[1].authorizing_key_path(),
            Some(PathBuf::from("/root/luks.key"))
        );
    }

    #[test]
    fn duplicate_units_collapse() {
        let (_dir, path) = write_config(
            r#"
[guard]
units = ["reboot.target", "reboot.target", "halt.target"]
"#,
        );
        let cfg = MollyguardConfig::load(&path).unwrap();
        assert_eq!(cfg.units(), vec!["halt.target", "reboot.target"]);
    }

    #[test]
    fn explicit_empty_units_are_respected() {
        let (_dir, path) = write_config("[guard]\nunits = []\n");
        let cfg = MollyguardConfig::load(&path).unwrap();
        assert!(cfg.guard.units.is_empty());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let (_dir, path) = write_config(
            r#"
colour = "green"

[guard]
legacy_flag = true

[future]
anything = 1
"#,
        );
        assert!(MollyguardConfig::load(&path).is_ok());
    }

    #[test]
    fn volume_without_device_is_rejected() {
        let (_dir, path) = write_config("[[volumes]]\nkey_file = \"/run/key\"\n");
        let err = MollyguardConfig::load(&path).unwrap_err();
        assert!(matches!(err, MollyguardError::Toml(_)), "{err:?}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let (_dir, path) = write_config("[guard]\nprompt_hostname = \"yes\"\n");
        assert!(matches!(
            MollyguardConfig::load(&path).unwrap_err(),
            MollyguardError::Toml(_)
        ));
    }

    #[test]
    fn relative_paths_and_zero_sizes_are_rejected() {
        let (_dir, path) = write_config(
            r#"
[guard]
systemctl = "systemctl"

[[volumes]]
device = "/dev/sda2"
key_file = "run/key"
key_size = 0

[[volumes]]
device = "/dev/sdb2"
key_file = "/run/other.key"
key_size = 1099511627776
"#,
        );
        match MollyguardConfig::load(&path).unwrap_err() {
            MollyguardError::InvalidConfig(msg) => {
                assert!(msg.contains("guard.systemctl"), "{msg}");
                assert!(msg.contains("volumes[0].key_file"), "{msg}");
                assert!(msg.contains("volumes[0].key_size"), "{msg}");
                assert!(msg.contains("volumes[1].key_size must not exceed"), "{msg}");
            }
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn shared_key_file_is_rejected() {
        let cfg = MollyguardConfig {
            volumes: vec![
                VolumeKeyPolicy {
                    device: "/dev/sda2".into(),
                    key_file: "/run/key".into(),
                    key_size: 32,
                    authorizing_key_file: None,
                },
                VolumeKeyPolicy {
                    device: "/dev/sdb2".into(),
                    key_file: "/run/key".into(),
                    key_size: 32,
                    authorizing_key_file: None,
                },
            ],
            ..MollyguardConfig::default()
        };
        let issues = cfg.validate();
        assert_eq!(issues.len(), 1, "{issues:?}");
        assert!(issues[0].contains("shared"));
    }
}
