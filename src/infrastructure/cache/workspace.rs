//! Scoped per-conversion scratch directories.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{trace, warn};

use crate::domain::errors::{ConversionError, ConversionResult};

/// Name of the frame subdirectory inside a workspace.
const FRAMES_DIR: &str = "frames";

/// Root directory under which conversions create their workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceRoot {
    root: PathBuf,
}

impl WorkspaceRoot {
    /// Creates a root at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Returns the default root (`$TMPDIR/stickerconv`).
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(std::env::temp_dir().join(crate::NAME))
    }

    /// Returns the root path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh, uniquely named workspace.
    ///
    /// # Errors
    /// Returns `WorkspaceFailure` if the directory cannot be created.
    pub fn create(&self, label: &str) -> ConversionResult<Workspace> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            ConversionError::workspace(format!(
                "Failed to create workspace root {}: {e}",
                self.root.display()
            ))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(&format!("{label}-"))
            .tempdir_in(&self.root)
            .map_err(|e| ConversionError::workspace(format!("Failed to create workspace: {e}")))?;

        trace!(path = %dir.path().display(), "Created workspace");
        Ok(Workspace { dir })
    }
}

/// A scratch directory owned by one in-flight conversion.
///
/// Removed when dropped, whichever way the conversion ends.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Returns the workspace directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns a path for a file directly inside the workspace.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Creates and returns the frame subdirectory.
    ///
    /// # Errors
    /// Returns `WorkspaceFailure` if the directory cannot be created.
    pub async fn frames_dir(&self) -> ConversionResult<PathBuf> {
        let frames = self.file(FRAMES_DIR);
        tokio::fs::create_dir_all(&frames)
            .await
            .map_err(|e| ConversionError::workspace(format!("Failed to create frames dir: {e}")))?;
        Ok(frames)
    }

    /// Lists the frames in the frame subdirectory, ordered by name.
    ///
    /// # Errors
    /// Returns `WorkspaceFailure` if the directory cannot be read.
    pub async fn frames(&self) -> ConversionResult<Vec<PathBuf>> {
        list_frames(&self.file(FRAMES_DIR))
            .await
            .map_err(|e| ConversionError::workspace(format!("Failed to list frames: {e}")))
    }

    /// Removes the workspace now, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => trace!(path = %path.display(), "Removed workspace"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove workspace"),
        }
    }
}

/// Lists the PNG frames in `dir`, ordered by file name.
///
/// # Errors
/// Returns error if the directory cannot be read.
pub async fn list_frames(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
        {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}
