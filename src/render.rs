// ABOUTME: Browser rendering module for the slidepress application
// ABOUTME: Prints each standalone slide document to a PDF page sized to the rendered slide

use crate::errors::{PressError, Result};
use crate::progress::ProgressSink;
use crate::utils;
use crate::workspace::RequestWorkspace;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptionsBuilder, Tab};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

/// CSS pixels per inch, used to turn measured pixels into paper size
const PX_PER_INCH: f64 = 96.0;

/// Selector of the slide that must be visible before export
pub const VISIBLE_SLIDE_SELECTOR: &str = "section.active";

/// Configuration for browser rendering
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub browser_path: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    /// Bound on navigation and on the document becoming ready
    pub navigation_timeout: Duration,
    /// Fixed delay after the document is ready
    pub settle_delay: Duration,
    /// Per-image bound on waiting for load or error
    pub image_timeout: Duration,
    /// Fixed delay after images so CSS backgrounds can paint
    pub paint_delay: Duration,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    /// Page size used when the presentation container cannot be measured
    pub fallback_size: PageSize,
}

impl RenderConfig {
    /// Longest stretch one slide can go without browser traffic, sleeps included
    pub fn idle_browser_timeout(&self) -> Duration {
        self.navigation_timeout
            + self.settle_delay
            + self.image_timeout
            + self.paint_delay
            + self.visibility_timeout
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            browser_path: None,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(3000),
            image_timeout: Duration::from_millis(5000),
            paint_delay: Duration::from_millis(2000),
            visibility_timeout: Duration::from_millis(10000),
            poll_interval: Duration::from_millis(100),
            fallback_size: PageSize::FALLBACK,
        }
    }
}

/// Rendered size of a slide in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    pub const FALLBACK: PageSize = PageSize {
        width: 1920,
        height: 1080,
    };

    pub fn width_inches(&self) -> f64 {
        f64::from(self.width) / PX_PER_INCH
    }

    pub fn height_inches(&self) -> f64 {
        f64::from(self.height) / PX_PER_INCH
    }

    /// Size in PDF points (1/72 in)
    pub fn to_points(&self) -> (f64, f64) {
        (self.width_inches() * 72.0, self.height_inches() * 72.0)
    }

    fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One slide printed to its own PDF file
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPage {
    /// One-based slide number
    pub number: usize,
    pub path: PathBuf,
    pub size: PageSize,
}

/// Exports a single standalone slide document as a one-page PDF
pub trait PageExporter {
    /// Render `html_path` and write the PDF to `pdf_path`, returning the page size.
    /// `slide` is one-based and only used for error reporting.
    fn export_page(&mut self, slide: usize, html_path: &Path, pdf_path: &Path) -> Result<PageSize>;
}

/// Render every standalone document in order, stopping at the first failure
pub fn render_pages(
    exporter: &mut dyn PageExporter,
    html_paths: &[PathBuf],
    workspace: &RequestWorkspace,
    progress: &dyn ProgressSink,
) -> Result<Vec<RenderedPage>> {
    let total = html_paths.len();
    let start_time = Instant::now();
    let mut pages = Vec::with_capacity(total);

    for (index, html_path) in html_paths.iter().enumerate() {
        let number = index + 1;
        progress.on_slide_start(number, total);

        let pdf_path = workspace.slide_pdf_path(number);
        let size = exporter.export_page(number, html_path, &pdf_path)?;
        verify_page_written(number, &pdf_path)?;

        progress.on_slide_rendered(number, total, size);
        pages.push(RenderedPage {
            number,
            path: pdf_path,
            size,
        });
    }

    info!(
        "Rendering complete. Printed {} slides in {:.2} seconds",
        pages.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(pages)
}

/// A page counts as rendered only if its file exists and is non-empty
pub fn verify_page_written(slide: usize, pdf_path: &Path) -> Result<()> {
    match fs::metadata(pdf_path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(PressError::RenderFailed {
            slide,
            reason: format!("{:?} is empty", file_name(pdf_path)),
        }),
        Err(_) => Err(PressError::RenderFailed {
            slide,
            reason: format!("{:?} was not created", file_name(pdf_path)),
        }),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

struct BrowserSession {
    // Dropping the browser shuts Chrome down, so it lives as long as the tab
    _browser: Browser,
    tab: Arc<Tab>,
}

/// Exporter backed by one headless Chrome instance and one tab.
///
/// The browser is launched on the first export and reused for every
/// following slide, then shut down when the exporter is dropped.
pub struct ChromeExporter {
    config: RenderConfig,
    session: Option<BrowserSession>,
}

impl ChromeExporter {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn tab(&mut self) -> Result<Arc<Tab>> {
        if let Some(session) = &self.session {
            return Ok(session.tab.clone());
        }

        let session = self.launch()?;
        let tab = session.tab.clone();
        self.session = Some(session);
        Ok(tab)
    }

    fn launch(&self) -> Result<BrowserSession> {
        let mut launch_options_builder = LaunchOptionsBuilder::default();

        launch_options_builder.window_size(Some((self.config.window_width, self.config.window_height)));
        launch_options_builder.headless(true);
        // Keep the connection alive across the longest wait we may sit through
        launch_options_builder.idle_browser_timeout(self.config.idle_browser_timeout());

        if let Some(browser_path) = &self.config.browser_path {
            launch_options_builder.path(Some(PathBuf::from(browser_path)));
        }

        let launch_options = launch_options_builder
            .build()
            .map_err(|e| PressError::BrowserError {
                message: format!("Failed to build browser options: {:?}", e),
                source: None,
            })?;

        info!("Launching headless browser");
        let browser = Browser::new(launch_options)
            .map_err(|e| PressError::browser("Failed to launch browser", e))?;

        let tab = browser
            .new_tab()
            .map_err(|e| PressError::browser("Failed to create new tab", e))?;
        tab.set_default_timeout(self.config.navigation_timeout);

        Ok(BrowserSession {
            _browser: browser,
            tab,
        })
    }

    fn wait_for_images(&self, tab: &Tab, slide: usize) -> Result<()> {
        let timeout_ms = self.config.image_timeout.as_millis();
        let script = format!(
            r#"Promise.all(Array.from(document.images).map(img => {{
                if (img.complete) return Promise.resolve();
                return new Promise(resolve => {{
                    img.addEventListener('load', resolve, {{ once: true }});
                    img.addEventListener('error', resolve, {{ once: true }});
                    setTimeout(resolve, {timeout_ms});
                }});
            }})).then(() => true)"#
        );

        tab.evaluate(&script, true)
            .map(|_| ())
            .map_err(|e| PressError::RenderFailed {
                slide,
                reason: format!("image wait failed: {}", e),
            })
    }

    fn wait_for_visible_slide(&self, tab: &Tab, slide: usize) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector('{VISIBLE_SLIDE_SELECTOR}');
                if (!el) return false;
                const style = window.getComputedStyle(el);
                const rect = el.getBoundingClientRect();
                return style.display !== 'none' && style.visibility !== 'hidden'
                    && rect.width > 0 && rect.height > 0;
            }})()"#
        );

        let visible = poll_condition(
            tab,
            &script,
            self.config.visibility_timeout,
            self.config.poll_interval,
        )
        .map_err(|e| PressError::RenderFailed {
            slide,
            reason: format!("visibility check failed: {}", e),
        })?;

        if visible {
            Ok(())
        } else {
            Err(PressError::RenderFailed {
                slide,
                reason: format!(
                    "{} did not become visible within {} ms",
                    VISIBLE_SLIDE_SELECTOR,
                    self.config.visibility_timeout.as_millis()
                ),
            })
        }
    }

    fn measure_container(&self, tab: &Tab) -> PageSize {
        let script = format!(
            r#"(() => {{
                const container = document.getElementById('{}');
                if (!container) return null;
                const rect = container.getBoundingClientRect();
                return JSON.stringify({{ width: Math.ceil(rect.width), height: Math.ceil(rect.height) }});
            }})()"#,
            crate::loader::CONTAINER_ID
        );

        let measured = match tab.evaluate(&script, false) {
            Ok(result) => match result.value {
                Some(Value::String(json)) => serde_json::from_str::<PageSize>(&json).ok(),
                _ => None,
            },
            Err(e) => {
                warn!("Failed to measure presentation container: {}", e);
                None
            }
        };

        match measured {
            Some(size) if !size.is_empty() => size,
            _ => {
                warn!(
                    "Presentation container not measurable, using {}x{}",
                    self.config.fallback_size.width, self.config.fallback_size.height
                );
                self.config.fallback_size
            }
        }
    }

}

impl PageExporter for ChromeExporter {
    fn export_page(&mut self, slide: usize, html_path: &Path, pdf_path: &Path) -> Result<PageSize> {
        let tab = self.tab()?;

        let absolute = utils::get_absolute_path(html_path)?;
        let url = Url::from_file_path(&absolute)
            .map_err(|_| PressError::ValidationError(format!("Not a file path: {:?}", absolute)))?;

        navigate(&*tab, &self.config, slide, url.as_str())?;

        // Let late resources (fonts, scripts) start before polling images
        thread::sleep(self.config.settle_delay);
        self.wait_for_images(&tab, slide)?;
        thread::sleep(self.config.paint_delay);

        self.wait_for_visible_slide(&tab, slide)?;

        let size = self.measure_container(&tab);
        let options = PrintToPdfOptions {
            print_background: Some(true),
            paper_width: Some(size.width_inches()),
            paper_height: Some(size.height_inches()),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            prefer_css_page_size: Some(false),
            page_ranges: Some("1".to_string()),
            ..Default::default()
        };

        let pdf = tab
            .print_to_pdf(Some(options))
            .map_err(|e| PressError::RenderFailed {
                slide,
                reason: format!("PDF export failed: {}", e),
            })?;
        fs::write(pdf_path, pdf)?;

        debug!("Printed slide {} to {:?}", slide, pdf_path);
        Ok(size)
    }
}

/// The two page operations the bounded waits are built from
trait PageDriver {
    /// Load `url` and wait for the navigation to commit
    fn open(&self, url: &str) -> anyhow::Result<()>;

    /// Evaluate `expression`, true only when it yields boolean `true`
    fn check(&self, expression: &str) -> anyhow::Result<bool>;
}

impl PageDriver for Tab {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        self.navigate_to(url)?.wait_until_navigated()?;
        Ok(())
    }

    fn check(&self, expression: &str) -> anyhow::Result<bool> {
        let result = self.evaluate(expression, false)?;
        Ok(matches!(result.value, Some(Value::Bool(true))))
    }
}

/// Navigate and wait for the document to be ready, both bounded by the navigation timeout
fn navigate(page: &dyn PageDriver, config: &RenderConfig, slide: usize, url: &str) -> Result<()> {
    debug!("Opening page at URL: {}", url);
    let started = Instant::now();

    page.open(url).map_err(|e| {
        if started.elapsed() >= config.navigation_timeout {
            render_timeout(slide, "navigation", config.navigation_timeout)
        } else {
            PressError::RenderFailed {
                slide,
                reason: format!("navigation failed: {}", e),
            }
        }
    })?;

    let ready = poll_condition(
        page,
        "document.readyState === 'complete'",
        config.navigation_timeout,
        config.poll_interval,
    )
    .map_err(|e| PressError::RenderFailed {
        slide,
        reason: format!("could not query document state: {}", e),
    })?;

    if !ready {
        return Err(render_timeout(slide, "document load", config.navigation_timeout));
    }
    Ok(())
}

fn render_timeout(slide: usize, stage: &str, limit: Duration) -> PressError {
    PressError::RenderTimeout {
        slide,
        stage: stage.to_string(),
        timeout_ms: limit.as_millis() as u64,
    }
}

/// Evaluate `expression` until it yields `true` or `timeout` passes
fn poll_condition(
    page: &dyn PageDriver,
    expression: &str,
    timeout: Duration,
    interval: Duration,
) -> anyhow::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if page.check(expression)? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgress;
    use tempfile::TempDir;

    /// Writes fixed bytes for each slide, or nothing for the slide listed in `empty_on`
    struct ScriptedExporter {
        calls: Vec<usize>,
        empty_on: Option<usize>,
    }

    impl PageExporter for ScriptedExporter {
        fn export_page(&mut self, slide: usize, _html: &Path, pdf_path: &Path) -> Result<PageSize> {
            self.calls.push(slide);
            let bytes: &[u8] = if Some(slide) == self.empty_on { b"" } else { b"%PDF-1.5" };
            fs::write(pdf_path, bytes)?;
            Ok(PageSize {
                width: 800,
                height: 600 * slide as u32,
            })
        }
    }

    fn html_paths(workspace: &RequestWorkspace, count: usize) -> Vec<PathBuf> {
        (1..=count).map(|n| workspace.slide_html_path(n)).collect()
    }

    #[test]
    fn test_pages_rendered_in_order() {
        let base = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(base.path()).unwrap();
        let mut exporter = ScriptedExporter {
            calls: Vec::new(),
            empty_on: None,
        };

        let pages = render_pages(&mut exporter, &html_paths(&workspace, 3), &workspace, &NoopProgress)
            .unwrap();

        assert_eq!(exporter.calls, vec![1, 2, 3]);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[2].path, workspace.slide_pdf_path(3));
        assert_eq!(pages[2].size.height, 1800);
    }

    #[test]
    fn test_empty_output_fails_fast() {
        let base = TempDir::new().unwrap();
        let workspace = RequestWorkspace::create(base.path()).unwrap();
        let mut exporter = ScriptedExporter {
            calls: Vec::new(),
            empty_on: Some(2),
        };

        let result = render_pages(&mut exporter, &html_paths(&workspace, 3), &workspace, &NoopProgress);

        assert!(matches!(result, Err(PressError::RenderFailed { slide: 2, .. })));
        assert_eq!(exporter.calls, vec![1, 2], "slide 3 must not be attempted");
    }

    #[test]
    fn test_missing_output_is_a_render_failure() {
        let base = TempDir::new().unwrap();
        let err = verify_page_written(4, &base.path().join("slide_4.pdf")).unwrap_err();
        assert!(err.to_string().contains("slide_4.pdf"));
        assert!(matches!(err, PressError::RenderFailed { slide: 4, .. }));
    }

    /// Stands in for a tab: `open` takes `load` and then fails if asked to, `check` always answers `ready`
    struct StalledPage {
        load: Duration,
        open_fails: bool,
        ready: bool,
    }

    impl PageDriver for StalledPage {
        fn open(&self, _url: &str) -> anyhow::Result<()> {
            thread::sleep(self.load);
            if self.open_fails {
                anyhow::bail!("net::ERR_CONNECTION_REFUSED");
            }
            Ok(())
        }

        fn check(&self, _expression: &str) -> anyhow::Result<bool> {
            Ok(self.ready)
        }
    }

    fn short_waits() -> RenderConfig {
        RenderConfig {
            navigation_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(5),
            ..RenderConfig::default()
        }
    }

    #[test]
    fn test_slow_navigation_is_a_timeout() {
        let page = StalledPage {
            load: Duration::from_millis(60),
            open_fails: true,
            ready: true,
        };

        let err = navigate(&page, &short_waits(), 3, "file:///deck/slide_3.html").unwrap_err();

        match err {
            PressError::RenderTimeout {
                slide,
                stage,
                timeout_ms,
            } => {
                assert_eq!(slide, 3);
                assert_eq!(stage, "navigation");
                assert_eq!(timeout_ms, 30);
            }
            other => panic!("expected a timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_quick_navigation_error_is_a_render_failure() {
        let page = StalledPage {
            load: Duration::ZERO,
            open_fails: true,
            ready: true,
        };

        let err = navigate(&page, &short_waits(), 1, "file:///deck/slide_1.html").unwrap_err();

        assert!(matches!(err, PressError::RenderFailed { slide: 1, .. }));
        assert!(err.to_string().contains("ERR_CONNECTION_REFUSED"));
    }

    #[test]
    fn test_document_never_ready_is_a_timeout() {
        let page = StalledPage {
            load: Duration::ZERO,
            open_fails: false,
            ready: false,
        };

        let started = Instant::now();
        let err = navigate(&page, &short_waits(), 2, "file:///deck/slide_2.html").unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            err,
            PressError::RenderTimeout { slide: 2, ref stage, timeout_ms: 30 } if stage == "document load"
        ));
    }

    #[test]
    fn test_ready_document_navigates() {
        let page = StalledPage {
            load: Duration::ZERO,
            open_fails: false,
            ready: true,
        };
        assert!(navigate(&page, &short_waits(), 1, "file:///deck/slide_1.html").is_ok());
    }

    #[test]
    fn test_idle_browser_timeout_covers_every_wait() {
        let config = RenderConfig {
            navigation_timeout: Duration::from_millis(100),
            settle_delay: Duration::from_millis(20),
            image_timeout: Duration::from_millis(300),
            paint_delay: Duration::from_millis(4),
            visibility_timeout: Duration::from_millis(5000),
            ..RenderConfig::default()
        };
        assert_eq!(config.idle_browser_timeout(), Duration::from_millis(5424));
        assert!(RenderConfig::default().idle_browser_timeout() > Duration::from_secs(45));
    }

    #[test]
    fn test_page_size_conversions() {
        let size = PageSize {
            width: 1920,
            height: 1080,
        };
        assert_eq!(size.width_inches(), 20.0);
        assert_eq!(size.height_inches(), 11.25);
        assert_eq!(size.to_points(), (1440.0, 810.0));
    }
}
