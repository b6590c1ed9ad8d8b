// ABOUTME: Error types for the slidepress application
// ABOUTME: Provides structured error handling for each stage of the conversion pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PressError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTML contains no <section> elements")]
    NoSlidesFound,

    #[error("Failed to parse HTML: {0}")]
    HtmlError(String),

    #[error("Failed to render slide {slide}: {reason}")]
    RenderFailed { slide: usize, reason: String },

    #[error("Timed out rendering slide {slide} while waiting for {stage} ({timeout_ms} ms)")]
    RenderTimeout {
        slide: usize,
        stage: String,
        timeout_ms: u64,
    },

    #[error("PDF merge failed: {0}")]
    MergeFailed(String),

    #[error("Headless browser error: {message}")]
    BrowserError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("PPTX generation error: {0}")]
    PptxError(String),

    #[error("Input validation error: {0}")]
    ValidationError(String),

    #[error("Path not found: {0}")]
    PathNotFoundError(PathBuf),

    #[error("Server error: {0}")]
    ServerError(String),
}

impl PressError {
    /// Wrap a headless browser failure with a short description of what was attempted
    pub fn browser(context: &str, err: anyhow::Error) -> Self {
        PressError::BrowserError {
            message: format!("{}: {}", context, err),
            source: Some(err.into()),
        }
    }
}

// Implement conversion from zip errors
impl From<zip::result::ZipError> for PressError {
    fn from(err: zip::result::ZipError) -> Self {
        PressError::PptxError(format!("ZIP operation failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, PressError>;
