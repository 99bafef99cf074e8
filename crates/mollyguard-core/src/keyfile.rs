//! Key file generation, atomic persistence, and erasure.

use crate::error::MollyguardResult;
use log::warn;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Seek, SeekFrom, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::NamedTempFile;
use zeroize::Zeroizing;

/// Owner read/write only. The clear step overwrites the file in place.
pub const KEY_FILE_MODE: u32 = 0o600;

const WIPE_CHUNK: usize = 4096;

/// Fill a fresh buffer with `size` bytes from the OS CSPRNG.
pub fn generate_key(size: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; size]);
    OsRng.fill_bytes(&mut key);
    key
}

/// SHA-256 of the key, hex encoded, for log correlation.
pub fn fingerprint(key: &[u8]) -> String {
    hex::encode(Sha256::digest(key))
}

/// Write raw key material to `path` atomically with owner-only permissions.
///
/// Readers of `path` observe either the previous file or the complete new
/// one, never a partial write.
pub fn write_key_file(path: &Path, key: &[u8]) -> MollyguardResult<()> {
    persist_atomically(path, |file| file.write_all(key))
}

pub(crate) fn persist_atomically<F>(path: &Path, fill: F) -> MollyguardResult<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    fs::set_permissions(temp.path(), fs::Permissions::from_mode(KEY_FILE_MODE))?;
    fill(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    sync_dir_or_warn(parent, "MG4002");
    Ok(())
}

/// Overwrite `path` with zeros `passes` times, then unlink it.
///
/// Returns `false` when there was no file to wipe.
pub fn wipe_key_file(path: &Path, passes: u32) -> MollyguardResult<bool> {
    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err.into()),
    };

    let len = file.metadata()?.len();
    let zeros = [0u8; WIPE_CHUNK];
    for _ in 0..passes.max(1) {
        file.seek(SeekFrom::Start(0))?;
        let mut remaining = len;
        while remaining > 0 {
            let chunk = remaining.min(WIPE_CHUNK as u64) as usize;
            file.write_all(&zeros[..chunk])?;
            remaining -= chunk as u64;
        }
        file.sync_all()?;
    }
    drop(file);

    fs::remove_file(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        sync_dir_or_warn(parent, "MG4102");
    }
    Ok(true)
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir).and_then(|file| file.sync_all())
}

/// The rename or unlink already happened; a failed directory sync only
/// weakens its durability, so it is reported rather than returned.
fn sync_dir_or_warn(dir: &Path, code: &str) -> bool {
    match sync_dir(dir) {
        Ok(()) => true,
        Err(err) => {
            warn!("[{code}] could not sync directory {}: {err}", dir.display());
            false
        }
    }
}
