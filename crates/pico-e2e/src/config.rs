//! Harness configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::browser::SessionConfig;
use crate::builder::BuildConfig;
use crate::error::{E2eError, E2eResult};
use crate::scenario::SiteContract;
use crate::server::ServerConfig;

/// Everything a run needs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub build: BuildConfig,
    pub server: ServerConfig,
    pub browser: SessionConfig,
    pub timing: TimingConfig,
    pub contract: SiteContract,

    /// Where results and failure screenshots go
    pub output_dir: PathBuf,

    /// How many times the catalog runs against the same server and browser
    pub iterations: u32,

    /// Run only the scenario with this name
    pub only: Option<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            build: BuildConfig::default(),
            server: ServerConfig::default(),
            browser: SessionConfig::default(),
            timing: TimingConfig::default(),
            contract: SiteContract::default(),
            output_dir: PathBuf::from("test-results"),
            iterations: 1,
            only: None,
        }
    }
}

/// Waits and timeouts used while a scenario drives its page.
///
/// The settle values were tuned against one machine; slower hosts may need
/// larger ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause after navigation before touching hydrated elements
    pub hydration_settle_ms: u64,

    /// Longest wait for the DOM to reflect a click
    pub click_settle_ms: u64,

    /// Interval between DOM polls
    pub poll_interval_ms: u64,

    pub navigation_timeout_ms: u64,
    pub element_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            hydration_settle_ms: 500,
            click_settle_ms: 1_000,
            poll_interval_ms: 50,
            navigation_timeout_ms: 10_000,
            element_timeout_ms: 5_000,
        }
    }
}

impl TimingConfig {
    pub fn hydration_settle(&self) -> Duration {
        Duration::from_millis(self.hydration_settle_ms)
    }

    pub fn click_settle(&self) -> Duration {
        Duration::from_millis(self.click_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }
}

impl HarnessConfig {
    /// Load configuration from a YAML file, or defaults if it does not exist.
    /// Relative paths are resolved against the file's directory.
    pub fn load(path: &Path) -> E2eResult<Self> {
        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)?;
            Self::from_yaml(&content)?
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Self::default()
        };

        config.resolve_paths(&base);
        Ok(config)
    }

    /// Like [`load`](Self::load), but when `path` does not exist the default
    /// paths are anchored at `root` rather than the working directory
    pub fn load_with_root(path: &Path, root: &Path) -> E2eResult<Self> {
        if path.exists() {
            return Self::load(path);
        }

        debug!(
            "No configuration at {}, using defaults under {}",
            path.display(),
            root.display()
        );
        let mut config = Self::default();
        config.resolve_paths(root);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        config.normalize();
        Ok(config)
    }

    fn normalize(&mut self) {
        if self.output_dir.as_os_str().is_empty() {
            self.output_dir = PathBuf::from("test-results");
        }
        self.iterations = self.iterations.max(1);
    }

    /// Anchor every relative path at `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        self.normalize();

        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        anchor(&mut self.build.generator_path);
        anchor(&mut self.build.view_path);
        anchor(&mut self.build.props_path);
        anchor(&mut self.build.output_dir);
        anchor(&mut self.output_dir);
        if let Some(cwd) = self.build.prebuild.as_mut().and_then(|p| p.cwd.as_mut()) {
            anchor(cwd);
        }
        if let Some(chrome) = self.browser.chrome_executable.as_mut() {
            anchor(chrome);
        }
    }

    /// Apply `PICO_E2E_*` overrides from the environment
    pub fn apply_env(&mut self) -> E2eResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> E2eResult<()> {
        if let Some(generator) = var("PICO_E2E_GENERATOR") {
            self.build.generator_path = PathBuf::from(generator);
        }
        if let Some(port) = var("PICO_E2E_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| E2eError::Config(format!("PICO_E2E_PORT is not a port: {}", port)))?;
        }
        if let Some(chrome) = var("PICO_E2E_CHROME") {
            self.browser.chrome_executable = Some(PathBuf::from(chrome));
        }
        if let Some(headless) = var("PICO_E2E_HEADLESS") {
            self.browser.headless = parse_flag(&headless)
                .ok_or_else(|| E2eError::Config(format!("PICO_E2E_HEADLESS is not a boolean: {}", headless)))?;
        }
        Ok(())
    }

    /// Write the effective configuration, e.g. as a starting template
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
