//! Pico E2E Test Harness
//!
//! This crate verifies a Pico-rendered static site end to end:
//! - Renders the site by running the generator as a subprocess
//! - Serves the output directory over HTTP from an in-process server
//! - Drives one headless Chrome over the DevTools protocol
//! - Runs each scenario on a fresh, isolated page and asserts on the DOM
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── SiteBuilder::build(BuildDescriptor) -> BuiltSite     │
//! │    ├── ServerHandle::start(root, config) -> ServerHandle    │
//! │    ├── BrowserSession::launch(config) -> BrowserSession     │
//! │    ├── with_page(|page| scenario.run(page)) per scenario    │
//! │    └── session.close(); server.stop()                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario catalog                                           │
//! │    ├── page-loads        title == "Pico"                    │
//! │    ├── reactive-counter  counter text changes on click      │
//! │    └── root-data         one script#p-root-data, valid JSON │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod assertion;
pub mod browser;
pub mod builder;
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod scenario;
pub mod server;

pub use assertion::AssertionResult;
pub use browser::{BrowserSession, PageContext};
pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use runner::{TestRunner, TestSuiteResult};
pub use scenario::{Scenario, ScenarioContext};
