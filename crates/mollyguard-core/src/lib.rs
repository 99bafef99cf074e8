pub mod config;
pub mod confirm;
pub mod error;
pub mod guard;
pub mod keyfile;
pub mod keys;
pub mod logging;
pub mod provider;
pub mod service;
pub mod workflow;

pub use config::{GuardConfig, MollyguardConfig, VolumeKeyPolicy};
pub use error::{MollyguardError, MollyguardResult};
pub use provider::{KeySlotManager, PowerAction, ServiceManager, SlotRemoval};
pub use service::MollyguardService;
