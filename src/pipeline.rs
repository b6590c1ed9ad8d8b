// ABOUTME: Conversion pipeline for the slidepress application
// ABOUTME: Runs load, isolate, render and merge for one request inside its own workspace

use crate::config::Config;
use crate::errors::{PressError, Result};
use crate::isolate;
use crate::loader::SourceDocument;
use crate::merge;
use crate::progress::{LogProgress, ProgressSink};
use crate::render::{self, ChromeExporter, PageExporter, RenderConfig, RenderedPage};
use crate::utils;
use crate::workspace::RequestWorkspace;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything one conversion request needs besides the input and the exporter
#[derive(Clone)]
pub struct ConversionContext {
    /// Directory under which the request's workspace is created
    pub workspace_root: PathBuf,
    pub progress: Arc<dyn ProgressSink>,
}

impl ConversionContext {
    pub fn new(workspace_root: impl Into<PathBuf>, progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            progress,
        }
    }
}

/// Result of a successful conversion.
///
/// Owns the request workspace; the merged PDF and every intermediate file
/// are deleted when this value is dropped, so copy or read the PDF first.
#[derive(Debug)]
pub struct ConversionOutput {
    workspace: RequestWorkspace,
    merged: PathBuf,
    pages: Vec<RenderedPage>,
}

impl ConversionOutput {
    pub fn merged_path(&self) -> &Path {
        &self.merged
    }

    pub fn pages(&self) -> &[RenderedPage] {
        &self.pages
    }

    pub fn workspace(&self) -> &RequestWorkspace {
        &self.workspace
    }

    /// Copy the merged PDF to `destination`, then remove the workspace
    pub fn persist_to(self, destination: &Path) -> Result<PathBuf> {
        utils::ensure_parent_directory_exists(destination)?;
        fs::copy(&self.merged, destination)?;
        Ok(destination.to_path_buf())
    }

    /// Read the merged PDF into memory, then remove the workspace
    pub fn read_merged(self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.merged)?)
    }
}

/// Convert one HTML deck into a merged PDF.
///
/// The deck is parsed before any workspace exists, so a deck without
/// sections leaves nothing on disk. Any later failure removes the
/// workspace before the error is returned.
pub fn convert_html_to_pdf(
    html: &str,
    ctx: &ConversionContext,
    exporter: &mut dyn PageExporter,
) -> Result<ConversionOutput> {
    let result = run(html, ctx, exporter);
    if let Err(e) = &result {
        ctx.progress.on_conversion_failed(e);
    }
    result
}

fn run(
    html: &str,
    ctx: &ConversionContext,
    exporter: &mut dyn PageExporter,
) -> Result<ConversionOutput> {
    let doc = SourceDocument::parse(html)?;
    ctx.progress.on_conversion_start(doc.slide_count());

    // Dropped (and removed) on every early return below
    let workspace = RequestWorkspace::create(&ctx.workspace_root)?;

    let html_paths = isolate::write_standalone_documents(&doc, &workspace)?;
    let pages = render::render_pages(exporter, &html_paths, &workspace, ctx.progress.as_ref())?;

    let pdf_paths: Vec<PathBuf> = pages.iter().map(|p| p.path.clone()).collect();
    let merged = merge::merge_pages(&pdf_paths, &workspace.merged_path())?;
    ctx.progress.on_merge_complete(pages.len(), &merged);

    Ok(ConversionOutput {
        workspace,
        merged,
        pages,
    })
}

/// Batch entry point: convert an HTML file on disk into `output` using headless Chrome
pub fn convert_file(input: &Path, output: &Path, config: &Config, render_config: RenderConfig) -> Result<PathBuf> {
    utils::validate_file_exists(input)?;

    let html = fs::read_to_string(input).map_err(|e| {
        PressError::ValidationError(format!("Failed to read {:?} as UTF-8 text: {}", input, e))
    })?;

    let ctx = ConversionContext::new(config.workspace_dir.clone(), Arc::new(LogProgress));
    let mut exporter = ChromeExporter::new(render_config);

    let converted = convert_html_to_pdf(&html, &ctx, &mut exporter)?;
    let page_total = converted.pages().len();
    let written = converted.persist_to(output)?;

    info!("Wrote {} slides to {:?}", page_total, written);
    Ok(written)
}
