use std::fs;
use std::io::{self, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;
use tracing::debug;

use crate::error::AtlasError;

pub const SCRATCH_FILE_NAME: &str = "scratch.h5ad";
pub const DEFAULT_RESULTS_DIR: &str = "results";

/// Local layout of a run: the single scratch file that stages one dataset at a
/// time, and the directory outputs are written to.
#[derive(Debug, Clone)]
pub struct Store {
    scratch_path: Utf8PathBuf,
    results_dir: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, AtlasError> {
        Ok(Self {
            scratch_path: Self::default_scratch_path()?,
            results_dir: Utf8PathBuf::from(DEFAULT_RESULTS_DIR),
        })
    }

    pub fn new_with_paths(scratch_path: Utf8PathBuf, results_dir: Utf8PathBuf) -> Self {
        Self {
            scratch_path,
            results_dir,
        }
    }

    pub fn default_scratch_path() -> Result<Utf8PathBuf, AtlasError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.cache_dir().join("kira-obs").join(SCRATCH_FILE_NAME),
                )
                .ok()
            })
            .ok_or_else(|| AtlasError::Filesystem("unable to resolve cache directory".to_string()))
    }

    pub fn scratch_path(&self) -> &Utf8Path {
        &self.scratch_path
    }

    pub fn results_dir(&self) -> &Utf8Path {
        &self.results_dir
    }

    pub fn result_path(&self, file_name: &str) -> Utf8PathBuf {
        self.results_dir.join(file_name)
    }

    pub fn ensure_scratch_dir(&self) -> Result<(), AtlasError> {
        match self.scratch_path.parent() {
            Some(parent) if !parent.as_str().is_empty() => fs::create_dir_all(parent.as_std_path())
                .map_err(|err| AtlasError::Filesystem(err.to_string())),
            _ => Ok(()),
        }
    }

    pub fn ensure_results_dir(&self) -> Result<(), AtlasError> {
        fs::create_dir_all(self.results_dir.as_std_path())
            .map_err(|err| AtlasError::Filesystem(err.to_string()))
    }

    pub fn scratch_exists(&self) -> bool {
        self.scratch_path.as_std_path().exists()
    }

    /// Deletes the scratch file. Returns whether there was one.
    pub fn remove_scratch(&self) -> Result<bool, AtlasError> {
        match fs::remove_file(self.scratch_path.as_std_path()) {
            Ok(()) => {
                debug!(path = %self.scratch_path, "removed scratch file");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AtlasError::Filesystem(format!(
                "remove {}: {err}",
                self.scratch_path
            ))),
        }
    }

    /// Writes `path` through a temporary sibling that replaces it on success.
    pub fn write_atomic<F>(path: &Utf8Path, write: F) -> Result<(), AtlasError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let output_err = |message: String| AtlasError::OutputWrite {
            path: path.as_std_path().to_path_buf(),
            message,
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .unwrap_or(Utf8Path::new("."));
        fs::create_dir_all(parent.as_std_path()).map_err(|err| output_err(err.to_string()))?;
        let temp = Builder::new()
            .prefix("kira-obs-out")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| output_err(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            write(&mut writer).map_err(|err| output_err(err.to_string()))?;
            writer.flush().map_err(|err| output_err(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| output_err(err.to_string()))?;
        Ok(())
    }
}
