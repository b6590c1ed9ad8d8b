// ABOUTME: Configuration module for the slidepress application
// ABOUTME: Provides configuration settings and environment variable handling

use crate::pptx::PptxConfig;
use crate::render::RenderConfig;
use crate::server::ServerConfig;
use log::warn;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 30000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 3000;
const DEFAULT_IMAGE_TIMEOUT_MS: u64 = 5000;
const DEFAULT_PAINT_DELAY_MS: u64 = 2000;
const DEFAULT_VISIBILITY_TIMEOUT_MS: u64 = 10000;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

/// Global configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub browser_path: Option<String>,
    pub workspace_dir: PathBuf,
    pub navigation_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub image_timeout_ms: u64,
    pub paint_delay_ms: u64,
    pub visibility_timeout_ms: u64,
    pub max_upload_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser_path: None,
            workspace_dir: default_workspace_dir(),
            navigation_timeout_ms: DEFAULT_NAVIGATION_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            image_timeout_ms: DEFAULT_IMAGE_TIMEOUT_MS,
            paint_delay_ms: DEFAULT_PAINT_DELAY_MS,
            visibility_timeout_ms: DEFAULT_VISIBILITY_TIMEOUT_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn default_workspace_dir() -> PathBuf {
    env::temp_dir().join("slidepress")
}

/// Read a numeric environment variable, warning and falling back on bad input
fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<u64>() {
            Ok(value) => value,
            Err(_) => {
                warn!(
                    "Ignoring {}={:?}: not a non-negative integer, using {}",
                    name, raw, default
                );
                default
            }
        },
        _ => default,
    }
}

impl Config {
    /// Create a new configuration instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let browser_path = env::var("BROWSER_PATH").ok().filter(|p| !p.is_empty());
        let workspace_dir = env::var("WORKSPACE_DIR")
            .ok()
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_workspace_dir);

        Self {
            browser_path,
            workspace_dir,
            navigation_timeout_ms: env_u64("NAVIGATION_TIMEOUT_MS", DEFAULT_NAVIGATION_TIMEOUT_MS),
            settle_delay_ms: env_u64("SETTLE_DELAY_MS", DEFAULT_SETTLE_DELAY_MS),
            image_timeout_ms: env_u64("IMAGE_TIMEOUT_MS", DEFAULT_IMAGE_TIMEOUT_MS),
            paint_delay_ms: env_u64("PAINT_DELAY_MS", DEFAULT_PAINT_DELAY_MS),
            visibility_timeout_ms: env_u64("VISIBILITY_TIMEOUT_MS", DEFAULT_VISIBILITY_TIMEOUT_MS),
            max_upload_bytes: env_u64("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
        }
    }

    /// Get a render configuration with defaults from this config
    pub fn get_render_config(
        &self,
        browser_path: Option<String>,
        settle_delay_ms: Option<u64>,
        visibility_timeout_ms: Option<u64>,
    ) -> RenderConfig {
        RenderConfig {
            browser_path: browser_path.or_else(|| self.browser_path.clone()),
            navigation_timeout: Duration::from_millis(self.navigation_timeout_ms),
            settle_delay: Duration::from_millis(settle_delay_ms.unwrap_or(self.settle_delay_ms)),
            image_timeout: Duration::from_millis(self.image_timeout_ms),
            paint_delay: Duration::from_millis(self.paint_delay_ms),
            visibility_timeout: Duration::from_millis(
                visibility_timeout_ms.unwrap_or(self.visibility_timeout_ms),
            ),
            ..RenderConfig::default()
        }
    }

    /// Get a PPTX configuration with defaults
    pub fn get_pptx_config(&self, title: Option<String>) -> PptxConfig {
        PptxConfig {
            title: title.unwrap_or_else(|| "Presentation".to_string()),
            ..PptxConfig::default()
        }
    }

    /// Get a server configuration with defaults
    pub fn get_server_config(&self, host: Option<String>, port: Option<u16>) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            host: host.unwrap_or(defaults.host),
            port: port.unwrap_or(defaults.port),
            max_upload_bytes: self.max_upload_bytes,
        }
    }
}
