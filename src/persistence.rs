//! Key-value blob storage for the alarm collection.
//!
//! The store treats blobs as opaque bytes; the alarm list is encoded as a
//! TOML document by [`encode`] and read back by [`decode`].

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    alarm::{AlarmId, AlarmRecord},
    collection::Collection,
    error::StoreError,
};

/// key the alarm list is saved under
pub const ALARMS_KEY: &str = "SavedAlarms";

pub trait BlobStore {
    /// `Ok(None)` when nothing was ever written under `key`.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replaces the blob under `key` as a whole.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.toml"))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl BlobStore for FileBlobStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    /// Writes to a temporary sibling and renames it over the target so a
    /// reader never sees a half written blob.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(io_error(&self.root))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("toml.tmp");
        {
            let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
            file.write_all(bytes).map_err(io_error(&tmp))?;
            file.sync_all().map_err(io_error(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(&path))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }
}

impl<B: BlobStore + ?Sized> BlobStore for &mut B {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).write(key, bytes)
    }
}

pub type Alarms = Collection<AlarmId, AlarmRecord>;

#[derive(Debug, Serialize, Deserialize)]
struct AlarmsDocument {
    #[serde(default)]
    alarms: Alarms,
}

pub fn encode(alarms: &Alarms) -> Result<Vec<u8>, StoreError> {
    let document = AlarmsDocument {
        alarms: alarms.clone(),
    };
    Ok(toml::to_string(&document)?.into_bytes())
}

pub fn decode(bytes: &[u8]) -> Result<Alarms, StoreError> {
    let text = String::from_utf8(bytes.to_vec())?;
    let document: AlarmsDocument = toml::from_str(&text)?;
    Ok(document.alarms)
}
