// ABOUTME: Per-request scratch directories for the slidepress application
// ABOUTME: Each conversion gets a uniquely named directory that is removed when dropped

use crate::errors::{PressError, Result};
use crate::utils;
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the final merged document inside a workspace
pub const MERGED_FILE_NAME: &str = "merged_slides.pdf";

/// A scratch directory owned by exactly one conversion request.
///
/// The directory and everything in it is deleted when the workspace is
/// dropped, on both the success and the failure path.
#[derive(Debug)]
pub struct RequestWorkspace {
    id: Uuid,
    root: PathBuf,
}

impl RequestWorkspace {
    /// Create `<base>/<uuid>`; `base` is created if needed
    pub fn create(base: &Path) -> Result<Self> {
        utils::ensure_directory_exists(base)?;

        let id = Uuid::new_v4();
        let root = base.join(id.to_string());
        fs::create_dir(&root).map_err(|e| {
            PressError::ValidationError(format!(
                "Failed to create workspace {:?}: {}",
                root, e
            ))
        })?;

        debug!("Created workspace {:?}", root);
        Ok(Self { id, root })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// `slide_<n>.html`, `n` one-based
    pub fn slide_html_path(&self, number: usize) -> PathBuf {
        self.root.join(format!("slide_{}.html", number))
    }

    /// `slide_<n>.pdf`, `n` one-based
    pub fn slide_pdf_path(&self, number: usize) -> PathBuf {
        self.root.join(format!("slide_{}.pdf", number))
    }

    pub fn merged_path(&self) -> PathBuf {
        self.root.join(MERGED_FILE_NAME)
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        match fs::remove_dir_all(&self.root) {
            Ok(()) => debug!("Removed workspace {:?}", self.root),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove workspace {:?}: {}", self.root, e),
        }
    }
}
