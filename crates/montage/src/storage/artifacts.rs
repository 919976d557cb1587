//! Filesystem blob store for source videos and generated montages.
//!
//! Records elsewhere in the crate only ever hold an [`ArtifactHandle`].
//! Handles are flat tokens (`<kind>-<uuid>.<ext>`) and never contain path
//! separators, so resolving one cannot escape the store root.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

const MAX_ALLOCATION_ATTEMPTS: u32 = 8;

/// Opaque reference to a stored byte object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(String);

impl ArtifactHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File extension encoded in the handle, if any.
    pub fn extension(&self) -> Option<&str> {
        self.0.rsplit_once('.').map(|(_, ext)| ext)
    }

    fn validate(&self) -> Result<(), StorageError> {
        let valid = !self.0.is_empty()
            && !self.0.starts_with('.')
            && !self.0.contains("..")
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if valid {
            Ok(())
        } else {
            Err(StorageError::InvalidHandle(self.0.clone()))
        }
    }
}

impl fmt::Display for ArtifactHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Source,
    Montage,
    DecisionList,
}

impl ArtifactKind {
    fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Source => "source",
            ArtifactKind::Montage => "montage",
            ArtifactKind::DecisionList => "edl",
        }
    }
}

/// Move a file from `src` to `dst`. Uses `rename` first and falls back to
/// copy + delete for cross-device moves.
fn move_file(src: &Path, dst: &Path) -> Result<(), StorageError> {
    if std::fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dst).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    std::fs::remove_file(src).map_err(|e| StorageError::MoveFile {
        from: src.to_path_buf(),
        to: dst.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn sanitize_extension(extension: &str) -> String {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    if !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        ext
    } else {
        "bin".to_string()
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens the store, creating the root directory if needed.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::CreateDirectory {
            path: root.clone(),
            source: e,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a fresh handle and creates an empty file for it.
    ///
    /// The caller writes the content to the returned path. Creation uses
    /// `create_new`, so an existing blob is never overwritten.
    pub fn allocate(
        &self,
        kind: ArtifactKind,
        extension: &str,
    ) -> Result<(ArtifactHandle, PathBuf), StorageError> {
        let ext = sanitize_extension(extension);
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let handle = ArtifactHandle(format!(
                "{}-{}.{}",
                kind.prefix(),
                uuid::Uuid::new_v4(),
                ext
            ));
            let path = self.root.join(handle.as_str());
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok((handle, path)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StorageError::WriteFile { path, source: e }),
            }
        }
        Err(StorageError::Exhausted(MAX_ALLOCATION_ATTEMPTS))
    }

    pub fn put_bytes(
        &self,
        kind: ArtifactKind,
        extension: &str,
        content: &[u8],
    ) -> Result<ArtifactHandle, StorageError> {
        let (handle, path) = self.allocate(kind, extension)?;
        let written = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .and_then(|mut file| file.write_all(content));
        if let Err(e) = written {
            let _ = std::fs::remove_file(&path);
            return Err(StorageError::WriteFile { path, source: e });
        }
        Ok(handle)
    }

    /// Moves an existing file into the store.
    pub fn import_file(
        &self,
        kind: ArtifactKind,
        extension: &str,
        source: &Path,
    ) -> Result<ArtifactHandle, StorageError> {
        if !source.is_file() {
            return Err(StorageError::NotFound(source.display().to_string()));
        }
        let (handle, path) = self.allocate(kind, extension)?;
        if let Err(e) = move_file(source, &path) {
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }
        Ok(handle)
    }

    /// Maps a handle to its location inside the store.
    pub fn resolve(&self, handle: &ArtifactHandle) -> Result<PathBuf, StorageError> {
        handle.validate()?;
        Ok(self.root.join(handle.as_str()))
    }

    pub fn exists(&self, handle: &ArtifactHandle) -> bool {
        self.resolve(handle).map(|p| p.is_file()).unwrap_or(false)
    }

    pub fn size(&self, handle: &ArtifactHandle) -> Result<u64, StorageError> {
        let path = self.resolve(handle)?;
        std::fs::metadata(&path)
            .map(|m| m.len())
            .map_err(|_| StorageError::NotFound(handle.to_string()))
    }

    pub fn read(&self, handle: &ArtifactHandle) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(handle)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    /// Opens a blob for streaming reads.
    pub async fn open(&self, handle: &ArtifactHandle) -> Result<tokio::fs::File, StorageError> {
        let path = self.resolve(handle)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(handle.to_string()))
            }
            Err(e) => Err(StorageError::ReadFile { path, source: e }),
        }
    }

    /// Every blob currently in the store.
    pub fn handles(&self) -> Result<Vec<ArtifactHandle>, StorageError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| StorageError::ReadFile {
            path: self.root.clone(),
            source: e,
        })?;

        let mut handles = Vec::new();
        for entry in entries.flatten() {
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                let handle = ArtifactHandle::new(name);
                if handle.validate().is_ok() {
                    handles.push(handle);
                }
            }
        }
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(handles)
    }

    /// Removes a blob. Deleting a missing blob is not an error.
    pub fn delete(&self, handle: &ArtifactHandle) -> Result<(), StorageError> {
        let path = self.resolve(handle)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::RemoveFile { path, source: e }),
        }
    }
}
