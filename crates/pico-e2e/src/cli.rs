//! Command-line arguments for the `e2e` harness binary

use std::path::{Path, PathBuf};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::config::HarnessConfig;
use crate::error::E2eResult;

#[derive(Parser, Debug)]
#[command(name = "pico-e2e")]
#[command(about = "E2E test runner for Pico-rendered sites")]
#[command(ignore_errors = true)]
pub struct HarnessArgs {
    /// Harness configuration file (YAML)
    #[arg(long, env = "PICO_E2E_CONFIG", default_value = "pico-e2e.yaml")]
    pub config: PathBuf,

    /// Run only the scenario with this name
    #[arg(long)]
    pub scenario: Option<String>,

    /// Repeat the catalog this many times
    #[arg(long)]
    pub iterations: Option<u32>,

    /// Output directory for results
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Fail instead of skipping when the generator or browser is missing
    #[arg(
        long,
        env = "PICO_E2E_REQUIRE",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub require: bool,
}

impl HarnessArgs {
    /// Effective configuration: file (or defaults under `root`), then
    /// environment, then command-line flags
    pub fn load_config(&self, root: &Path) -> E2eResult<HarnessConfig> {
        let mut config = HarnessConfig::load_with_root(&self.config, root)?;
        config.apply_env()?;

        if let Some(name) = &self.scenario {
            config.only = Some(name.clone());
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations.max(1);
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        Ok(config)
    }
}

/// Directory holding the workspace `Cargo.toml`; the site and generator
/// live relative to it
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let tmp = tempfile::tempdir().unwrap();
        let args = HarnessArgs::try_parse_from([
            "e2e",
            "--config",
            tmp.path().join("missing.yaml").to_str().unwrap(),
            "--scenario",
            "root-data",
            "--iterations",
            "0",
            "-o",
            "/tmp/pico-results",
        ])
        .unwrap();

        let config = args.load_config(tmp.path()).unwrap();
        assert_eq!(config.only.as_deref(), Some("root-data"));
        assert_eq!(config.iterations, 1);
        assert_eq!(config.output_dir, PathBuf::from("/tmp/pico-results"));
    }

    #[test]
    fn test_require_accepts_boolish_env_values() {
        for (value, expected) in [("1", true), ("yes", true), ("true", true), ("0", false), ("off", false)] {
            std::env::set_var("PICO_E2E_REQUIRE", value);
            let args = HarnessArgs::try_parse_from(["e2e"]).unwrap();
            assert_eq!(args.require, expected, "PICO_E2E_REQUIRE={}", value);
            assert_eq!(args.config, PathBuf::from("pico-e2e.yaml"));
        }
        std::env::remove_var("PICO_E2E_REQUIRE");

        let args = HarnessArgs::try_parse_from(["e2e", "--require"]).unwrap();
        assert!(args.require);
    }

    #[test]
    fn test_project_root_is_workspace_root() {
        let manifest = std::fs::read_to_string(project_root().join("Cargo.toml")).unwrap();
        assert!(manifest.contains("[workspace]"));
    }
}
