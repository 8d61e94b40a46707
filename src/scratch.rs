//! Request-scoped scratch storage.
//!
//! Each request gets its own uniquely named directory. It is removed when the
//! `ScratchDir` is dropped, so every exit path (success, error, unwinding)
//! releases it.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

const PREFIX: &str = "rx-scan-";

#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a scratch directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(PREFIX);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!("Scratch dir created: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path for a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Remove the directory now. Failures are logged and otherwise ignored.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!("Scratch dir removed: {}", path.display()),
            Err(e) => warn!("Failed to remove scratch dir {}: {}", path.display(), e),
        }
    }
}
