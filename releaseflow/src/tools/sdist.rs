//! Source distribution builds through `python -m build`.

use super::process::{run_command, CommandSpec};
use super::{SdistBuildRequest, SourceArchiveTool};
use crate::errors::BuildError;
use async_trait::async_trait;

/// Runs the PyPA `build` frontend in sdist-only mode.
#[derive(Debug, Clone)]
pub struct PypaBuildTool {
    python: String,
}

impl PypaBuildTool {
    /// Creates a tool that runs `python -m build`.
    #[must_use]
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    /// Returns the command run for `request`.
    #[must_use]
    pub fn command(&self, request: &SdistBuildRequest) -> CommandSpec {
        CommandSpec::new(&self.python)
            .args(["-m", "build", "--sdist", "--outdir"])
            .arg(request.output_dir.display().to_string())
            .arg(request.project_dir.display().to_string())
    }
}

#[async_trait]
impl SourceArchiveTool for PypaBuildTool {
    async fn build_sdist(&self, request: &SdistBuildRequest) -> Result<(), BuildError> {
        run_command(&self.command(request)).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_command_line() {
        let request = SdistBuildRequest {
            project_dir: PathBuf::from("proj"),
            output_dir: PathBuf::from("work/sdist"),
        };
        assert_eq!(
            PypaBuildTool::new("python3").command(&request).display(),
            "python3 -m build --sdist --outdir work/sdist proj"
        );
    }
}
