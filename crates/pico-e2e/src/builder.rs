//! Site building - running the external generator to produce static files

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};

/// File the generator must emit at the root of the output directory
pub const SITE_INDEX: &str = "index.html";

/// Configuration for the build step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Path to the generator executable
    pub generator_path: PathBuf,

    /// View template handed to `render`
    pub view_path: PathBuf,

    /// Props file handed to `render`
    pub props_path: PathBuf,

    /// Directory the generator writes into (created if absent)
    pub output_dir: PathBuf,

    /// Command that produces the generator binary before rendering
    pub prebuild: Option<PrebuildCommand>,

    /// Upper bound for each subprocess, in milliseconds
    pub timeout_ms: u64,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            generator_path: PathBuf::from("../pico/pico"),
            view_path: PathBuf::from("site/views/home.html"),
            props_path: PathBuf::from("site/props.json"),
            output_dir: PathBuf::from("public"),
            prebuild: None,
            timeout_ms: 120_000,
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Snapshot the paths into an immutable descriptor
    pub fn descriptor(&self) -> BuildDescriptor {
        BuildDescriptor::new(
            &self.generator_path,
            &self.view_path,
            &self.props_path,
            &self.output_dir,
        )
    }
}

/// A command run before `render`, e.g. `go build -o pico .`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrebuildCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

/// Everything the generator needs for one render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDescriptor {
    generator_path: PathBuf,
    view_path: PathBuf,
    props_path: PathBuf,
    output_dir: PathBuf,
}

impl BuildDescriptor {
    pub fn new(
        generator_path: impl Into<PathBuf>,
        view_path: impl Into<PathBuf>,
        props_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            generator_path: generator_path.into(),
            view_path: view_path.into(),
            props_path: props_path.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn generator_path(&self) -> &Path {
        &self.generator_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Arguments for the generator. Flags go before positionals.
    pub fn render_args(&self) -> Vec<OsString> {
        vec![
            OsString::from("render"),
            OsString::from("--output"),
            self.output_dir.clone().into_os_string(),
            self.view_path.clone().into_os_string(),
            self.props_path.clone().into_os_string(),
        ]
    }

    fn validate(&self) -> E2eResult<()> {
        if !is_executable(&self.generator_path) {
            return Err(E2eError::BuildLaunch {
                program: self.generator_path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "generator is missing or not executable",
                ),
            });
        }

        for (what, path) in [("view template", &self.view_path), ("props file", &self.props_path)] {
            if !path.is_file() {
                return Err(E2eError::Build(format!(
                    "{} not found: {}",
                    what,
                    path.display()
                )));
            }
        }

        Ok(())
    }
}

/// Output of a successful render
#[derive(Debug, Clone)]
pub struct BuiltSite {
    root: PathBuf,
    file_count: usize,
}

impl BuiltSite {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }
}

/// Runs the generator as a black box: arguments in, exit code and files out
#[derive(Debug, Clone)]
pub struct SiteBuilder {
    prebuild: Option<PrebuildCommand>,
    timeout: Duration,
}

impl SiteBuilder {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            prebuild: config.prebuild.clone(),
            timeout: config.timeout(),
        }
    }

    /// Prebuild (if configured), then render the site described by `descriptor`
    pub async fn build(&self, descriptor: BuildDescriptor) -> E2eResult<BuiltSite> {
        if let Some(prebuild) = &self.prebuild {
            self.run_prebuild(prebuild).await?;
        }

        descriptor.validate()?;
        std::fs::create_dir_all(&descriptor.output_dir)?;

        let args = descriptor.render_args();
        info!(
            "Running: {} {}",
            descriptor.generator_path.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut cmd = Command::new(&descriptor.generator_path);
        cmd.args(&args);

        let status = run_to_completion(cmd, self.timeout, &descriptor.generator_path.display().to_string())
            .await
            .map_err(|e| match e {
                E2eError::Timeout(what) => E2eError::Build(format!("timed out: {}", what)),
                other => other,
            })?;

        if !status.success() {
            return Err(E2eError::Build(format!(
                "{} render exited with {}",
                descriptor.generator_path.display(),
                status
            )));
        }

        let file_count = verify_output(&descriptor.output_dir)?;
        info!(
            "Site built into {} ({} files)",
            descriptor.output_dir.display(),
            file_count
        );

        Ok(BuiltSite {
            root: descriptor.output_dir,
            file_count,
        })
    }

    async fn run_prebuild(&self, prebuild: &PrebuildCommand) -> E2eResult<()> {
        info!("Prebuild: {} {}", prebuild.program, prebuild.args.join(" "));

        let mut cmd = Command::new(&prebuild.program);
        cmd.args(&prebuild.args);
        if let Some(cwd) = &prebuild.cwd {
            cmd.current_dir(cwd);
        }

        let status = match run_to_completion(cmd, self.timeout, &prebuild.program).await {
            Ok(status) => status,
            Err(E2eError::BuildLaunch { program, source }) => {
                return Err(E2eError::Prebuild(format!("could not launch {}: {}", program, source)));
            }
            Err(E2eError::Timeout(what)) => {
                return Err(E2eError::Prebuild(format!("timed out: {}", what)));
            }
            Err(e) => return Err(e),
        };

        if !status.success() {
            return Err(E2eError::Prebuild(format!(
                "{} exited with {}",
                prebuild.program, status
            )));
        }
        Ok(())
    }
}

/// Spawn `cmd` with inherited stdio and wait for it, bounded by `limit`
async fn run_to_completion(mut cmd: Command, limit: Duration, label: &str) -> E2eResult<ExitStatus> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| E2eError::BuildLaunch {
        program: label.to_string(),
        source,
    })?;

    match timeout(limit, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => {
            warn!("{} did not finish within {:?}, terminating", label, limit);
            terminate(&mut child).await;
            Err(E2eError::Timeout(format!("{} after {:?}", label, limit)))
        }
    }
}

/// SIGTERM first, then kill whatever is left
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(id) = child.id() {
            if kill(Pid::from_raw(id as i32), Signal::SIGTERM).is_ok() {
                sleep(Duration::from_millis(500)).await;
            }
        }
    }

    let _ = child.kill().await;
}

/// Check a render produced a site root; returns the number of files
pub fn verify_output(dir: &Path) -> E2eResult<usize> {
    if !dir.is_dir() {
        return Err(E2eError::Build(format!(
            "output directory missing: {}",
            dir.display()
        )));
    }

    let file_count = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count();

    if file_count == 0 {
        return Err(E2eError::Build(format!(
            "output directory is empty: {}",
            dir.display()
        )));
    }

    if !dir.join(SITE_INDEX).is_file() {
        return Err(E2eError::Build(format!(
            "no {} in {}",
            SITE_INDEX,
            dir.display()
        )));
    }

    debug!("Verified {} files under {}", file_count, dir.display());
    Ok(file_count)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
