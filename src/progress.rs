// ABOUTME: Progress reporting hooks for the slidepress conversion pipeline
// ABOUTME: Lets callers observe per-slide progress without the library printing anything

use crate::errors::PressError;
use crate::render::PageSize;
use log::{error, info};
use std::path::Path;

/// Receives events as a conversion moves through its stages.
///
/// All methods have no-op defaults so implementations only override what
/// they need. Slide numbers are one-based.
pub trait ProgressSink: Send + Sync {
    fn on_conversion_start(&self, total_slides: usize) {
        let _ = total_slides;
    }

    fn on_slide_start(&self, slide: usize, total_slides: usize) {
        let _ = (slide, total_slides);
    }

    fn on_slide_rendered(&self, slide: usize, total_slides: usize, size: PageSize) {
        let _ = (slide, total_slides, size);
    }

    fn on_merge_complete(&self, pages: usize, output: &Path) {
        let _ = (pages, output);
    }

    fn on_conversion_failed(&self, error: &PressError) {
        let _ = error;
    }
}

/// Discards every event
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// Reports progress through the `log` facade
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_conversion_start(&self, total_slides: usize) {
        info!("Converting {} slides", total_slides);
    }

    fn on_slide_start(&self, slide: usize, total_slides: usize) {
        info!("Rendering slide {}/{}", slide, total_slides);
    }

    fn on_slide_rendered(&self, slide: usize, total_slides: usize, size: PageSize) {
        info!(
            "Rendered slide {}/{} ({}x{} px)",
            slide, total_slides, size.width, size.height
        );
    }

    fn on_merge_complete(&self, pages: usize, output: &Path) {
        info!("Merged {} pages into {:?}", pages, output);
    }

    fn on_conversion_failed(&self, error: &PressError) {
        error!("Conversion failed: {}", error);
    }
}
