//! Flat-file persistence: the address database and the anchors list.
//!
//! Both files are bincode with a leading version so a future format change
//! can refuse cleanly instead of misparsing. Corruption is never fatal here;
//! the loaders fall back to empty and the address loader rewrites the file
//! so the damage does not survive. Writes go through a temp sibling and a
//! rename, leaving either the old file or the new one on disk, never half
//! of each.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::errors::PersistenceError;
use crate::domain::types::Endpoint;
use crate::ports::outbound::AddressBookState;

pub const ADDRESS_DB_FILE: &str = "addresses.dat";
pub const ANCHORS_FILE: &str = "anchors.dat";

const ADDRESS_DB_VERSION: u32 = 1;
const ANCHORS_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct AddressDbFile {
    version: u32,
    state: AddressBookState,
}

#[derive(Serialize, Deserialize)]
struct AnchorsFile {
    version: u32,
    anchors: Vec<Endpoint>,
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn save_addresses(path: &Path, state: &AddressBookState) -> Result<(), PersistenceError> {
    let file = AddressDbFile {
        version: ADDRESS_DB_VERSION,
        state: state.clone(),
    };
    let bytes =
        bincode::serialize(&file).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), new = state.new.len(), tried = state.tried.len(), "address database written");
    Ok(())
}

pub fn load_addresses(path: &Path) -> Result<AddressBookState, PersistenceError> {
    let bytes = fs::read(path)?;
    let file: AddressDbFile =
        bincode::deserialize(&bytes).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
    if file.version != ADDRESS_DB_VERSION {
        return Err(PersistenceError::Version {
            found: file.version,
            expected: ADDRESS_DB_VERSION,
        });
    }
    Ok(file.state)
}

/// Startup loader. A missing file is a clean first run; anything unreadable
/// is logged, replaced with an empty database on disk, and forgotten.
pub fn load_addresses_or_reset(path: &Path) -> AddressBookState {
    match load_addresses(path) {
        Ok(state) => state,
        Err(PersistenceError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            AddressBookState::default()
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "address database unreadable, resetting");
            let empty = AddressBookState::default();
            if let Err(err) = save_addresses(path, &empty) {
                warn!(path = %path.display(), error = %err, "address database rewrite failed");
            }
            empty
        }
    }
}

pub fn save_anchors(path: &Path, anchors: &[Endpoint]) -> Result<(), PersistenceError> {
    let file = AnchorsFile {
        version: ANCHORS_VERSION,
        anchors: anchors.to_vec(),
    };
    let bytes =
        bincode::serialize(&file).map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), count = anchors.len(), "anchors written");
    Ok(())
}

/// Startup loader. The file is deleted after reading so a crashy node does
/// not hammer the same two anchors on every restart; it reappears at the
/// next clean shutdown. Absence or corruption just means no anchors.
pub fn take_anchors(path: &Path) -> Vec<Endpoint> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %err, "anchors unreadable");
            }
            return Vec::new();
        }
    };
    if let Err(err) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "anchors delete failed");
    }
    match bincode::deserialize::<AnchorsFile>(&bytes) {
        Ok(file) if file.version == ANCHORS_VERSION => {
            debug!(count = file.anchors.len(), "anchors loaded");
            file.anchors
        }
        Ok(file) => {
            warn!(found = file.version, "anchors version unsupported, ignoring");
            Vec::new()
        }
        Err(err) => {
            warn!(error = %err, "anchors corrupt, ignoring");
            Vec::new()
        }
    }
}
