//! Per-job scratch directories
//!
//! A [`Workspace`] owns every file a job downloads or derives. It is removed
//! by [`Workspace::reclaim`] on the normal paths and by `Drop` otherwise, so
//! no job leaves its directory behind.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::Result;
use crate::job::{sanitize_id, AssetRole};

/// Scoped directory holding a job's working assets
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    reclaimed: bool,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `root`
    pub async fn create(root: &Path, job_id: &str) -> Result<Self> {
        let dir = root.join(format!("{}-{}", sanitize_id(job_id), uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).await?;
        debug!("Created workspace {}", dir.display());
        Ok(Self {
            dir,
            reclaimed: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Path for the `index`-th downloaded asset of `role`
    #[must_use]
    pub fn asset_path(&self, role: AssetRole, index: usize, ext: &str) -> PathBuf {
        self.dir.join(format!("{}_{index}.{ext}", role.prefix()))
    }

    /// Path for an intermediate or final file produced inside the workspace
    #[must_use]
    pub fn derived_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Delete the directory and everything in it
    pub async fn reclaim(mut self) -> Result<()> {
        self.reclaimed = true;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                debug!("Reclaimed workspace {}", self.dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.reclaimed {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {}: {e}", self.dir.display());
            }
        }
    }
}

/// Reserve a file name in `dir` that no other artifact holds.
///
/// A taken `merged_rec1.mp4` yields `merged_rec1-1.mp4`, then `-2` and so
/// on. The reservation is an empty file that [`hand_off`] replaces.
pub async fn claim_destination(dir: &Path, filename: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).await?;
    let (stem, ext) = filename.rsplit_once('.').unwrap_or((filename, ""));

    let mut attempt = 0u32;
    loop {
        let candidate = match (attempt, ext) {
            (0, _) => filename.to_string(),
            (_, "") => format!("{stem}-{attempt}"),
            _ => format!("{stem}-{attempt}.{ext}"),
        };
        let path = dir.join(candidate);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                debug!("{} is taken", path.display());
            }
            Err(e) => return Err(e.into()),
        }
        attempt += 1;
    }
}

/// Move a finished artifact out of the workspace into `dest`.
///
/// Falls back to copy + remove when a rename crosses filesystems.
pub async fn hand_off(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    if fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    fs::copy(src, dest).await?;
    fs::remove_file(src).await?;
    Ok(())
}
