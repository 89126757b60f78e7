//! Main test runner that orchestrates build, server, browser and scenarios

use std::path::PathBuf;
use std::time::Instant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::assertion::AssertionResult;
use crate::browser::{BrowserSession, PageContext};
use crate::builder::SiteBuilder;
use crate::config::HarnessConfig;
use crate::error::{E2eError, E2eResult};
use crate::scenario::{catalog, Scenario, ScenarioContext};
use crate::server::ServerHandle;

/// Result of running a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub iteration: u32,
    pub success: bool,
    pub duration_ms: u64,
    pub assertions: Vec<AssertionResult>,
    pub error: Option<String>,
    pub screenshot_path: Option<PathBuf>,
}

/// Result of running the whole catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn success(&self) -> bool {
        self.total > 0 && self.failed == 0
    }
}

/// Owns the run: build once, serve once, one browser, scenarios in sequence,
/// teardown in reverse.
pub struct TestRunner {
    config: HarnessConfig,
    scenarios: Vec<Box<dyn Scenario>>,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(HarnessConfig::default())
    }

    /// Create a test runner over the standard scenario catalog
    pub fn with_config(config: HarnessConfig) -> Self {
        Self::with_scenarios(config, catalog())
    }

    pub fn with_scenarios(config: HarnessConfig, scenarios: Vec<Box<dyn Scenario>>) -> Self {
        Self { config, scenarios }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Scenarios this run will execute, honouring `only`
    pub fn selected(&self) -> E2eResult<Vec<&dyn Scenario>> {
        let selected: Vec<&dyn Scenario> = self
            .scenarios
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| self.config.only.as_deref().map_or(true, |only| s.name() == only))
            .collect();

        if selected.is_empty() {
            return Err(E2eError::Config(match &self.config.only {
                Some(only) => format!("no scenario named {}", only),
                None => "no scenarios to run".to_string(),
            }));
        }
        Ok(selected)
    }

    /// Full run. `Err` only for setup failures; scenario failures are in the
    /// returned suite.
    pub async fn run(&self) -> E2eResult<TestSuiteResult> {
        let scenarios = self.selected()?;

        let builder = SiteBuilder::new(&self.config.build);
        let site = builder.build(self.config.build.descriptor()).await?;

        let mut server = ServerHandle::start(site.root(), &self.config.server).await?;

        let mut session = match BrowserSession::launch(self.config.browser.clone()).await {
            Ok(session) => session,
            Err(e) => {
                server.stop().await;
                return Err(e);
            }
        };

        let suite = self.run_scenarios(&scenarios, &session, server.base_url()).await;

        session.close().await;
        server.stop().await;

        Ok(suite)
    }

    /// Run `scenarios` sequentially against an already running server
    pub async fn run_scenarios(
        &self,
        scenarios: &[&dyn Scenario],
        session: &BrowserSession,
        base_url: &str,
    ) -> TestSuiteResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let ctx = ScenarioContext {
            base_url: base_url.to_string(),
            timing: self.config.timing.clone(),
            contract: self.config.contract.clone(),
        };

        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;

        info!(
            "Running {} scenario(s) x {} iteration(s)...",
            scenarios.len(),
            self.config.iterations
        );

        for iteration in 1..=self.config.iterations {
            for scenario in scenarios {
                let result = self.run_scenario(*scenario, session, &ctx, iteration).await;
                if result.success {
                    passed += 1;
                    info!("✓ {} ({} ms)", result.name, result.duration_ms);
                } else {
                    failed += 1;
                    error!(
                        "✗ {} - {}",
                        result.name,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
                results.push(result);
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!("");
        info!(
            "Test Results: {} run, {} passed, {} failed ({} ms)",
            results.len(),
            passed,
            failed,
            duration_ms
        );

        TestSuiteResult {
            started_at,
            total: results.len(),
            passed,
            failed,
            duration_ms,
            results,
        }
    }

    /// Run one scenario on its own page; never fails, errors land in the result
    async fn run_scenario(
        &self,
        scenario: &dyn Scenario,
        session: &BrowserSession,
        ctx: &ScenarioContext,
        iteration: u32,
    ) -> TestResult {
        let start = Instant::now();
        debug!("Running scenario: {} (iteration {})", scenario.name(), iteration);

        let outcome = session
            .with_page(|page| async move {
                let outcome = scenario.run(&page, ctx).await;
                let failed = match &outcome {
                    Ok(assertions) => assertions.iter().any(|a| !a.passed),
                    Err(_) => true,
                };
                let screenshot = if failed {
                    self.capture_failure(&page, scenario.name(), iteration).await
                } else {
                    None
                };
                (outcome, screenshot)
            })
            .await;

        let (assertions, error, screenshot_path) = match outcome {
            Ok((Ok(assertions), shot)) => (assertions, None, shot),
            Ok((Err(e), shot)) => (Vec::new(), Some(e.to_string()), shot),
            Err(e) => (Vec::new(), Some(e.to_string()), None),
        };
        let error = error.or_else(|| {
            assertions
                .iter()
                .find(|a| !a.passed)
                .cloned()
                .and_then(AssertionResult::into_error)
                .map(|e| e.to_string())
        });

        for failure in assertions.iter().filter(|a| !a.passed) {
            error!(
                "  {}: expected {}, got {}",
                failure.description, failure.expected, failure.actual
            );
        }

        TestResult {
            name: scenario.name().to_string(),
            iteration,
            success: error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            assertions,
            error,
            screenshot_path,
        }
    }

    /// Best-effort screenshot of a failing page
    async fn capture_failure(&self, page: &PageContext, name: &str, iteration: u32) -> Option<PathBuf> {
        let path = self
            .config
            .output_dir
            .join("screenshots")
            .join(format!("{}-{}.png", name, iteration));

        match page.screenshot(&path).await {
            Ok(()) => {
                info!("Failure screenshot: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("Could not capture screenshot for {}: {}", name, e);
                None
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir)?;

        let path = self.config.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, success: bool) -> TestResult {
        TestResult {
            name: name.to_string(),
            iteration: 1,
            success,
            duration_ms: 5,
            assertions: vec![AssertionResult::equals("document title", "Pico", "Pico")],
            error: (!success).then(|| "boom".to_string()),
            screenshot_path: None,
        }
    }

    fn suite(results: Vec<TestResult>) -> TestSuiteResult {
        let passed = results.iter().filter(|r| r.success).count();
        TestSuiteResult {
            started_at: Utc::now(),
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms: 10,
            results,
        }
    }

    #[test]
    fn test_suite_success_requires_all_passed() {
        assert!(suite(vec![result("page-loads", true)]).success());
        assert!(!suite(vec![result("page-loads", true), result("root-data", false)]).success());
        assert!(!suite(vec![]).success());
    }

    #[test]
    fn test_only_selects_one_scenario() {
        let config = HarnessConfig {
            only: Some("root-data".to_string()),
            ..Default::default()
        };
        let runner = TestRunner::with_config(config);
        let names: Vec<&str> = runner.selected().unwrap().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["root-data"]);
    }

    #[test]
    fn test_unknown_scenario_is_config_error() {
        let config = HarnessConfig {
            only: Some("missing".to_string()),
            ..Default::default()
        };
        let runner = TestRunner::with_config(config);
        match runner.selected() {
            Ok(_) => panic!("selected a scenario that does not exist"),
            Err(err) => assert!(matches!(err, E2eError::Config(_))),
        }
    }

    #[tokio::test]
    async fn test_build_failure_aborts_before_server() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = HarnessConfig::default();
        config.build.generator_path = tmp.path().join("missing-generator");
        config.build.output_dir = tmp.path().join("public");
        config.server.port = 0;

        let runner = TestRunner::with_config(config);
        let err = runner.run().await.unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(err, E2eError::BuildLaunch { .. }));
        assert!(!tmp.path().join("public").exists());
    }

    #[test]
    fn test_write_results() {
        let tmp = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            output_dir: tmp.path().join("results"),
            ..Default::default()
        };
        let runner = TestRunner::with_config(config);

        let path = runner
            .write_results(&suite(vec![result("page-loads", true), result("root-data", false)]))
            .unwrap();

        let written: TestSuiteResult =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written.total, 2);
        assert_eq!(written.failed, 1);
        assert_eq!(written.results[1].error.as_deref(), Some("boom"));
    }
}
