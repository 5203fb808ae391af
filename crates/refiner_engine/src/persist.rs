use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("not a file path: {0:?}")]
    InvalidTarget(PathBuf),
    #[error("output directory {dir:?} missing or not writable: {source}")]
    OutputDir {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("writing temp file in {dir:?} failed: {source}")]
    TempFile {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("replacing {target:?} with {temp:?} failed: {source}")]
    Rename {
        target: PathBuf,
        temp: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes whole files into one directory: temp file, sync, then rename over the target.
#[derive(Debug, Clone)]
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        self.ensure_dir()?;

        let target = self.dir.join(filename);
        let temp_error = |source| PersistError::TempFile {
            dir: self.dir.clone(),
            source,
        };
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(temp_error)?;
        tmp.write_all(content.as_bytes()).map_err(temp_error)?;
        tmp.flush().map_err(temp_error)?;
        tmp.as_file_mut().sync_all().map_err(temp_error)?;

        let temp = tmp.path().to_path_buf();
        tmp.persist(&target).map_err(|err| PersistError::Rename {
            target: target.clone(),
            temp,
            source: err.error,
        })?;
        Ok(target)
    }

    fn ensure_dir(&self) -> Result<(), PersistError> {
        let dir_error = |source| PersistError::OutputDir {
            dir: self.dir.clone(),
            source,
        };
        if self.dir.exists() {
            if !fs::metadata(&self.dir).map_err(dir_error)?.is_dir() {
                return Err(dir_error(io::Error::other("path is not a directory")));
            }
            Ok(())
        } else {
            fs::create_dir_all(&self.dir).map_err(dir_error)
        }
    }
}

/// Atomically replaces `target`, creating its parent directory if needed.
pub fn write_atomically(target: &Path, content: &str) -> Result<PathBuf, PersistError> {
    let filename = target
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PersistError::InvalidTarget(target.to_path_buf()))?;
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    AtomicFileWriter::new(dir).write(filename, content)
}
