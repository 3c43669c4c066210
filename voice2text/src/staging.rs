//! Attachment staging.
//!
//! The engine reads audio from the local filesystem. [`AttachmentStager`]
//! downloads an attachment into the staging directory and hands back a
//! [`StagedAttachment`] guard; dropping the guard removes the file, so every
//! exit path of an operation cleans up after itself.

use crate::error::PlatformResult;
use crate::events::Attachment;
use crate::platform::ChatPlatform;
use crate::util::generate_id;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Extension used when the attachment carries no usable file name.
const DEFAULT_EXTENSION: &str = "ogg";

enum StagingDir {
    Owned(TempDir),
    Configured(PathBuf),
}

impl StagingDir {
    fn path(&self) -> &Path {
        match self {
            Self::Owned(dir) => dir.path(),
            Self::Configured(path) => path,
        }
    }
}

/// Downloads attachments into a process-wide staging directory.
pub struct AttachmentStager {
    platform: Arc<dyn ChatPlatform>,
    dir: StagingDir,
}

impl std::fmt::Debug for AttachmentStager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentStager")
            .field("dir", &self.dir.path())
            .finish_non_exhaustive()
    }
}

impl AttachmentStager {
    /// Stage into a fresh temporary directory, removed with the stager.
    ///
    /// # Errors
    ///
    /// Fails when the temporary directory cannot be created.
    pub fn temporary(platform: Arc<dyn ChatPlatform>) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("voice2text-").tempdir()?;
        debug!(dir = %dir.path().display(), "staging in temporary directory");
        Ok(Self {
            platform,
            dir: StagingDir::Owned(dir),
        })
    }

    /// Stage into `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be created.
    pub fn in_dir(platform: Arc<dyn ChatPlatform>, dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            platform,
            dir: StagingDir::Configured(dir),
        })
    }

    /// Staging directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Download `attachment` to a unique local file.
    ///
    /// A partially written file is removed when the download fails.
    ///
    /// # Errors
    ///
    /// Returns the platform error when the download fails.
    pub async fn stage(&self, attachment: &Attachment) -> PlatformResult<StagedAttachment> {
        let path = self.dir.path().join(staged_file_name(attachment));
        let staged = StagedAttachment { path };

        self.platform.save_attachment(attachment, &staged.path).await?;

        debug!(
            attachment = %attachment.id,
            size = ?attachment.size,
            path = %staged.path.display(),
            "attachment staged"
        );
        Ok(staged)
    }
}

/// A downloaded attachment; the file is removed when this is dropped.
#[derive(Debug)]
pub struct StagedAttachment {
    path: PathBuf,
}

impl StagedAttachment {
    /// Local path of the staged bytes.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedAttachment {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "staged file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove staged file"),
        }
    }
}

fn staged_file_name(attachment: &Attachment) -> String {
    let stem: String = attachment
        .id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let extension = attachment
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(DEFAULT_EXTENSION);
    format!("{}.{extension}", generate_id(&stem))
}
