use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::converter::{ConversionError, Format};

/// File name prefix of in-progress encodes inside the temp directory.
pub const TEMP_FILE_PREFIX: &str = "flux-";

/// An encode target in the temp directory.
///
/// The encoder writes to [`StagedOutput::path`]; only a successful
/// [`StagedOutput::commit`] moves the file to its destination. Dropping an
/// uncommitted output removes the temp file.
#[derive(Debug)]
pub struct StagedOutput {
    path: PathBuf,
    committed: bool,
}

impl StagedOutput {
    pub async fn create(temp_dir: &Path, format: Format) -> Result<Self, ConversionError> {
        tokio::fs::create_dir_all(temp_dir).await.map_err(|e| {
            ConversionError::conversion_failed(
                format!("cannot create temp dir {}: {}", temp_dir.display(), e),
                None,
            )
        })?;
        let path = temp_dir.join(format!(
            "{}{}.{}",
            TEMP_FILE_PREFIX,
            Uuid::new_v4(),
            format.extension()
        ));
        Ok(Self {
            path,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Moves the encoded file to `destination`.
    ///
    /// Fails when the encoder left no output or an empty one.
    pub async fn commit(mut self, destination: &Path) -> Result<u64, ConversionError> {
        let size = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => {
                return Err(ConversionError::conversion_failed(
                    "Output file not created",
                    None,
                ))
            }
        };
        if size == 0 {
            return Err(ConversionError::conversion_failed("Output file is empty", None));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ConversionError::conversion_failed(
                    format!("cannot create {}: {}", parent.display(), e),
                    None,
                )
            })?;
        }

        // rename fails across filesystems, fall back to copy
        if tokio::fs::rename(&self.path, destination).await.is_err() {
            tokio::fs::copy(&self.path, destination).await.map_err(|e| {
                ConversionError::conversion_failed(
                    format!("cannot write {}: {}", destination.display(), e),
                    None,
                )
            })?;
            let _ = tokio::fs::remove_file(&self.path).await;
        }

        self.committed = true;
        Ok(size)
    }
}

impl Drop for StagedOutput {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
