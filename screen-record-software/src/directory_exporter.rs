//! Export step that moves finished recordings into a shared folder.
//!
//! The recording is copied (together with its metadata sidecar, if present)
//! into `{destination}/{sub_folder}` and the working copy is deleted only
//! after the copy succeeded. On failure the working copy stays untouched.

use std::fs;
use std::path::{Path, PathBuf};

use screen_record_core::models::error::RecordError;
use screen_record_core::models::recording_result::RecordingResult;
use screen_record_core::storage::metadata::metadata_path;
use screen_record_core::traits::exporter::RecordingExporter;

pub struct DirectoryExporter {
    destination: PathBuf,
    sub_folder: Option<String>,
}

impl DirectoryExporter {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            sub_folder: None,
        }
    }

    /// Place exports in a named folder below the destination.
    pub fn with_sub_folder(mut self, name: impl Into<String>) -> Self {
        self.sub_folder = Some(name.into());
        self
    }

    pub fn target_directory(&self) -> PathBuf {
        match self.sub_folder {
            Some(ref name) => self.destination.join(name),
            None => self.destination.clone(),
        }
    }

    fn copy_into(source: &Path, directory: &Path) -> Result<PathBuf, RecordError> {
        let name = source
            .file_name()
            .ok_or_else(|| RecordError::StorageError(format!("{} has no file name", source.display())))?;
        let target = directory.join(name);
        fs::copy(source, &target).map_err(|e| {
            RecordError::StorageError(format!(
                "failed to copy {} to {}: {}",
                source.display(),
                target.display(),
                e
            ))
        })?;
        Ok(target)
    }
}

impl RecordingExporter for DirectoryExporter {
    fn export(&self, result: &RecordingResult) -> Result<PathBuf, RecordError> {
        let directory = self.target_directory();
        fs::create_dir_all(&directory)
            .map_err(|e| RecordError::StorageError(format!("failed to create {}: {}", directory.display(), e)))?;

        let exported = Self::copy_into(&result.file_path, &directory)?;
        let sidecar = metadata_path(&result.file_path);
        let exported_sidecar = if sidecar.exists() {
            match Self::copy_into(&sidecar, &directory) {
                Ok(path) => Some(path),
                Err(e) => {
                    let _ = fs::remove_file(&exported);
                    return Err(e);
                }
            }
        } else {
            None
        };

        for working in [Some(result.file_path.as_path()), exported_sidecar.as_ref().map(|_| sidecar.as_path())]
            .into_iter()
            .flatten()
        {
            if let Err(e) = fs::remove_file(working) {
                log::warn!("failed to delete working copy {}: {}", working.display(), e);
            }
        }

        log::info!("exported {} to {}", result.file_path.display(), exported.display());
        Ok(exported)
    }
}
