//! Typed JSON file persistence.
//!
//! Each record kind gets its own `JsonFile<T>`; there is no shared store that
//! inspects the record type at runtime. Saves write a temporary file next to
//! the target and rename it into place, so readers observe either the old or
//! the new content, never a partial write.

use std::fs;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

use crate::errors::StoreError;

pub struct JsonFile<T> {
    path: PathBuf,
    pretty: bool,
    #[cfg_attr(not(unix), allow(dead_code))]
    mode: u32,
    _record: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    /// `mode` is applied to the file on unix when it is written.
    pub fn new(path: impl Into<PathBuf>, pretty: bool, mode: u32) -> Self {
        Self {
            path: path.into(),
            pretty,
            mode,
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<T, StoreError> {
        let raw = fs::read(&self.path).map_err(|source| self.io_error(source))?;
        serde_json::from_slice(&raw).map_err(|source| StoreError::Json {
            path: self.display(),
            source,
        })
    }

    /// Loads the record, or writes `default` and returns it if the file does
    /// not exist yet. The returned flag is true when the default was written.
    pub fn load_or_init(&self, default: T) -> Result<(T, bool), StoreError> {
        match fs::metadata(&self.path) {
            Ok(_) => Ok((self.load()?, false)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("{} does not exist, writing initial data", self.display());
                self.save(&default)?;
                Ok((default, true))
            }
            Err(source) => Err(self.io_error(source)),
        }
    }

    pub fn save(&self, record: &T) -> Result<(), StoreError> {
        let data = if self.pretty {
            serde_json::to_vec_pretty(record)
        } else {
            serde_json::to_vec(record)
        }
        .map_err(|source| StoreError::Json {
            path: self.display(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| self.io_error(source))?;
        tmp.write_all(&data).map_err(|source| self.io_error(source))?;
        tmp.as_file()
            .sync_all()
            .map_err(|source| self.io_error(source))?;
        self.apply_mode(tmp.as_file())?;

        tmp.persist(&self.path).map_err(|source| StoreError::Persist {
            path: self.display(),
            source,
        })?;

        debug!("Saved {} ({} bytes)", self.display(), data.len());
        Ok(())
    }

    #[cfg(unix)]
    fn apply_mode(&self, file: &fs::File) -> Result<(), StoreError> {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(self.mode))
            .map_err(|source| self.io_error(source))
    }

    #[cfg(not(unix))]
    fn apply_mode(&self, _file: &fs::File) -> Result<(), StoreError> {
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.display(),
            source,
        }
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }
}
