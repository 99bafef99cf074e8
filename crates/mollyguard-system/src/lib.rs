//! System-backed providers for mollyguard. `command` owns process spawning;
//! `systemctl` and `cryptsetup` translate provider calls into CLI arguments.

mod command;
mod cryptsetup;
mod systemctl;

pub use command::{CommandRunner, Output};
pub use cryptsetup::CryptsetupSlots;
pub use systemctl::SystemctlManager;
