//! Error types for the E2E harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generator prebuild failed: {0}")]
    Prebuild(String),

    #[error("Site build failed: {0}")]
    Build(String),

    #[error("Failed to launch generator {program}: {source}")]
    BuildLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server readiness check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Browser failed to launch: {0}")]
    BrowserLaunch(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Assertion failed: {description} (expected {expected}, got {actual})")]
    AssertionFailed {
        description: String,
        expected: String,
        actual: String,
    },

    #[error("Scenario panicked: {0}")]
    ScenarioPanicked(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("Browser protocol error: {0}")]
    Cdp(#[from] chromiumoxide::error::CdpError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Whether this error aborts the whole run rather than a single scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            E2eError::Config(_)
                | E2eError::Prebuild(_)
                | E2eError::Build(_)
                | E2eError::BuildLaunch { .. }
                | E2eError::ServerStartup(_)
                | E2eError::ServerHealthCheck(_)
                | E2eError::BrowserLaunch(_)
        )
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
