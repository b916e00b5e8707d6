//! MIDI file store: byte-level file access under the data directory.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file already exists: {0}")]
    Exists(String),
    #[error("invalid file name: {0:?}")]
    InvalidName(String),
    #[error("I/O error on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    fn io(name: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound(name.to_string()),
            io::ErrorKind::AlreadyExists => Self::Exists(name.to_string()),
            _ => Self::Io {
                name: name.to_string(),
                source,
            },
        }
    }
}

/// Flat directory of `.mid` files addressed by bare file name.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir.display().to_string(), e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the `.mid` files in the store, sorted.
    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(".", e))?;
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.ends_with(".mid"))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|p| p.exists())
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let bytes = fs::read(self.path(name)?).map_err(|e| StoreError::io(name, e))?;
        log::info!("read MIDI file {name} ({} bytes)", bytes.len());
        Ok(bytes)
    }

    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::write(self.path(name)?, bytes).map_err(|e| StoreError::io(name, e))?;
        log::info!("wrote MIDI file {name} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Claim `name` with an empty placeholder file.
    pub fn reserve(&self, name: &str) -> Result<(), StoreError> {
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name)?)
            .map_err(|e| StoreError::io(name, e))?;
        log::info!("reserved placeholder MIDI file {name}");
        Ok(())
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<(), StoreError> {
        let source = self.path(from)?;
        let target = self.path(to)?;
        if !source.exists() {
            return Err(StoreError::NotFound(from.to_string()));
        }
        if target.exists() {
            return Err(StoreError::Exists(to.to_string()));
        }
        fs::rename(source, target).map_err(|e| StoreError::io(from, e))?;
        log::info!("renamed MIDI file {from} -> {to}");
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        fs::remove_file(self.path(name)?).map_err(|e| StoreError::io(name, e))?;
        log::info!("deleted MIDI file {name}");
        Ok(())
    }

    fn path(&self, name: &str) -> Result<PathBuf, StoreError> {
        // Exactly one plain component: no separators, no `.` or `..`.
        let mut components = Path::new(name).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(part)), None) if part == name
        );
        if !plain || name.contains(['/', '\\', '\0']) {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }
}
