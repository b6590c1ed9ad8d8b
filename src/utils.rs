// ABOUTME: Utility functions for the slidepress application
// ABOUTME: Provides helpers for validation, path handling and output naming

use crate::errors::{PressError, Result};
use std::path::{Path, PathBuf};

/// Validate that a file exists
pub fn validate_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(PressError::PathNotFoundError(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(PressError::ValidationError(format!(
            "Path is not a file: {:?}",
            path
        )));
    }
    Ok(())
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    } else if !path.is_dir() {
        return Err(PressError::ValidationError(format!(
            "Path exists but is not a directory: {:?}",
            path
        )));
    }
    Ok(())
}

/// Ensure a file's parent directory exists
pub fn ensure_parent_directory_exists(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory_exists(parent)?;
        }
    }
    Ok(())
}

/// Get the absolute path
pub fn get_absolute_path(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| {
        PressError::ValidationError(format!("Failed to get absolute path for {:?}: {}", path, e))
    })
}

/// True when a file name ends with `.html`
pub fn has_html_extension(file_name: &str) -> bool {
    file_name.ends_with(".html")
}

/// Download name for a converted deck: `<stem>_merged.pdf`
pub fn merged_pdf_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "slides".to_string());
    format!("{}_merged.pdf", stem)
}
