//! Wheel builds through `cibuildwheel`.

use super::process::{run_command, CommandSpec};
use super::{BuildTool, WheelBuildRequest};
use crate::errors::BuildError;
use crate::matrix::Platform;
use async_trait::async_trait;

/// Runs `cibuildwheel` through a Python interpreter.
///
/// The pinned tool version is installed once per run by
/// [`BuildTool::prepare`]; each wheel job then only invokes the build with
/// its entry's platform, selector and runtime constraint.
///
/// A host builds its own platform natively. Linux wheels are also
/// buildable from macOS and Windows hosts (cibuildwheel runs them in a
/// container); macOS and Windows wheels need a host of that platform.
#[derive(Debug, Clone)]
pub struct CibuildwheelTool {
    python: String,
    install: bool,
    host: Option<Platform>,
}

impl CibuildwheelTool {
    /// Creates a tool that uses `python` to install and run the builder on
    /// the current host.
    #[must_use]
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            install: true,
            host: Platform::host(),
        }
    }

    /// Skips the `pip install` step (the tool is already provisioned).
    #[must_use]
    pub fn without_install(mut self) -> Self {
        self.install = false;
        self
    }

    /// Overrides the detected host platform.
    #[must_use]
    pub fn with_host(mut self, host: Platform) -> Self {
        self.host = Some(host);
        self
    }

    /// Returns the install command for `tool_version`, unless installing
    /// is disabled.
    #[must_use]
    pub fn install_command(&self, tool_version: &str) -> Option<CommandSpec> {
        self.install.then(|| {
            CommandSpec::new(&self.python)
                .args(["-m", "pip", "install"])
                .arg(format!("cibuildwheel=={tool_version}"))
        })
    }

    /// Returns the build command for `request`.
    #[must_use]
    pub fn build_command(&self, request: &WheelBuildRequest) -> CommandSpec {
        CommandSpec::new(&self.python)
            .args(["-m", "cibuildwheel", "--platform"])
            .arg(request.entry.platform.as_str())
            .arg("--output-dir")
            .arg(request.output_dir.display().to_string())
            .arg(request.project_dir.display().to_string())
            .env("CIBW_BUILD", &request.selector)
            .env("CIBW_PROJECT_REQUIRES_PYTHON", &request.min_runtime)
    }
}

#[async_trait]
impl BuildTool for CibuildwheelTool {
    fn supports(&self, platform: Platform) -> bool {
        match self.host {
            Some(host) => platform == host || platform == Platform::Linux,
            None => false,
        }
    }

    async fn prepare(&self, tool_version: &str) -> Result<(), BuildError> {
        if let Some(command) = self.install_command(tool_version) {
            tracing::info!(version = tool_version, "Installing cibuildwheel");
            run_command(&command).await?;
        }
        Ok(())
    }

    async fn build_wheels(&self, request: &WheelBuildRequest) -> Result<(), BuildError> {
        run_command(&self.build_command(request)).await.map(|_| ())
    }
}
