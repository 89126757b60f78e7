//! The scenario catalog: what a correctly generated page must do

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::assertion::AssertionResult;
use crate::browser::PageContext;
use crate::config::TimingConfig;
use crate::error::E2eResult;

/// Stable facts about the generated page the scenarios check against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteContract {
    /// Expected `document.title`
    pub title: String,

    /// Element whose text shows the counter value
    pub counter_display: String,

    /// Element that increments the counter
    pub counter_button: String,

    /// Script tag carrying the server-rendered props
    pub root_data: String,

    /// Require the root data to be a JSON object, not just valid JSON
    pub root_data_object: bool,
}

impl Default for SiteContract {
    fn default() -> Self {
        Self {
            title: "Pico".to_string(),
            counter_display: "section.age-button h3".to_string(),
            counter_button: "section.age-button button".to_string(),
            root_data: "script#p-root-data".to_string(),
            root_data_object: true,
        }
    }
}

/// What a scenario can see besides its page
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    pub base_url: String,
    pub timing: TimingConfig,
    pub contract: SiteContract,
}

/// One independent end-to-end check against a fresh page.
///
/// `Err` means the scenario could not complete (navigation failed, element
/// missing); mismatches are reported as failed [`AssertionResult`]s.
#[async_trait]
pub trait Scenario: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, page: &PageContext, ctx: &ScenarioContext) -> E2eResult<Vec<AssertionResult>>;
}

/// Every scenario, in reporting order
pub fn catalog() -> Vec<Box<dyn Scenario>> {
    vec![
        Box::new(PageLoad),
        Box::new(ReactiveUpdate),
        Box::new(StructuredData),
    ]
}

/// The root document loads and carries the expected title
pub struct PageLoad;

#[async_trait]
impl Scenario for PageLoad {
    fn name(&self) -> &str {
        "page-loads"
    }

    async fn run(&self, page: &PageContext, ctx: &ScenarioContext) -> E2eResult<Vec<AssertionResult>> {
        page.goto(&ctx.base_url, ctx.timing.navigation_timeout()).await?;

        let mut results = Vec::new();
        if let Some(status) = page.response_status().await? {
            results.push(AssertionResult::equals("HTTP status of root document", 200, status));
        }

        let title = page.title().await?;
        results.push(AssertionResult::equals(
            "document title",
            ctx.contract.title.as_str(),
            title.as_str(),
        ));
        Ok(results)
    }
}

/// Clicking the counter button re-renders the counter without a reload
pub struct ReactiveUpdate;

#[async_trait]
impl Scenario for ReactiveUpdate {
    fn name(&self) -> &str {
        "reactive-counter"
    }

    async fn run(&self, page: &PageContext, ctx: &ScenarioContext) -> E2eResult<Vec<AssertionResult>> {
        let timing = &ctx.timing;
        let contract = &ctx.contract;

        page.goto(&ctx.base_url, timing.navigation_timeout()).await?;

        // The hydration runtime exposes no ready event
        sleep(timing.hydration_settle()).await;

        page.wait_for(&contract.counter_display, timing.element_timeout(), timing.poll_interval())
            .await?;
        let before = page.text_content(&contract.counter_display).await?;
        info!("Counter before click: {}", before.trim());

        page.click(&contract.counter_button, timing.element_timeout()).await?;

        let after = page
            .wait_for_text_change(
                &contract.counter_display,
                &before,
                timing.click_settle(),
                timing.poll_interval(),
            )
            .await?;
        info!("Counter after click: {}", after.trim());

        Ok(vec![AssertionResult::differs(
            "counter text after click",
            before,
            after,
        )])
    }
}

/// Exactly one root-data script, holding parseable JSON
pub struct StructuredData;

#[async_trait]
impl Scenario for StructuredData {
    fn name(&self) -> &str {
        "root-data"
    }

    async fn run(&self, page: &PageContext, ctx: &ScenarioContext) -> E2eResult<Vec<AssertionResult>> {
        let selector = &ctx.contract.root_data;

        page.goto(&ctx.base_url, ctx.timing.navigation_timeout()).await?;

        let count = page.count(selector).await?;
        let mut results = vec![AssertionResult::equals(
            &format!("number of {} elements", selector),
            1,
            count,
        )];
        if count == 0 {
            return Ok(results);
        }

        let content = page.text_content(selector).await?;
        debug!("{} content: {}", selector, content);

        results.push(AssertionResult::non_empty("root data text", &content));
        results.push(AssertionResult::parses_as_json("root data text", &content));
        if ctx.contract.root_data_object {
            results.push(AssertionResult::json_object("root data shape", &content));
        }
        Ok(results)
    }
}
