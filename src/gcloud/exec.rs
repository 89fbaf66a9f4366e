use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::debug;

use super::Gcloud;
use crate::error::DeployError;
use crate::platform::Probe;

/// Argument list for one `gcloud` call. Flags are rendered as `--name=value`
/// so values that start with `-` are never mistaken for flags.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    args: Vec<String>,
}

impl Invocation {
    pub fn new(parts: &[&str]) -> Self {
        Self {
            args: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn flag(mut self, name: &str, value: impl AsRef<str>) -> Self {
        self.args.push(format!("--{}={}", name, value.as_ref()));
        self
    }

    pub fn switch(mut self, name: &str) -> Self {
        self.args.push(format!("--{}", name));
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

pub struct CmdOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl Gcloud {
    /// Run and capture, whatever the exit status.
    pub async fn run(&self, inv: &Invocation) -> Result<CmdOutput> {
        let line = inv.args().join(" ");
        debug!("[{}] gcloud {}", self.project, line);

        let output = Command::new(&self.binary)
            .args(inv.args())
            .arg(format!("--project={}", self.project))
            .arg("--quiet")
            .output()
            .await
            .with_context(|| format!("Failed to execute gcloud {}", line))?;

        Ok(CmdOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run and return stdout; a non-zero exit is an error.
    pub async fn exec(&self, inv: &Invocation) -> Result<String> {
        let out = self.run(inv).await?;

        if !out.success {
            bail!(
                "gcloud {} failed\nstdout: {}\nstderr: {}",
                inv.args().join(" "),
                out.stdout.trim(),
                out.stderr.trim()
            );
        }

        Ok(out.stdout)
    }

    /// Run a describe call. Only an explicit not-found is `Absent`; any other
    /// failure surfaces as [`DeployError::ProbeUnknown`].
    pub async fn probe(&self, resource: &str, inv: &Invocation) -> Result<Probe<String>> {
        let out = self.run(inv).await?;

        if out.success {
            return Ok(Probe::Present(out.stdout));
        }

        if is_not_found(&out.stderr) {
            debug!("{} not found", resource);
            return Ok(Probe::Absent);
        }

        Err(DeployError::ProbeUnknown {
            resource: resource.to_string(),
            detail: first_error_line(&out.stderr),
        }
        .into())
    }
}

/// Classifies the error line only. Warnings gcloud prints alongside (missing
/// property files, update notices) never make a failure look like absence.
pub fn is_not_found(stderr: &str) -> bool {
    let line = first_error_line(stderr);
    if line.starts_with("WARNING") {
        return false;
    }
    if line.contains("NOT_FOUND") || line.contains("code=404") || line.contains(": 404") {
        return true;
    }
    if line.contains("PERMISSION_DENIED") || line.contains("UNAUTHENTICATED") {
        return false;
    }
    let lower = line.to_lowercase();
    lower.contains("not found") || lower.contains("does not exist")
}

pub fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("ERROR"))
        .or_else(|| stderr.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("no output")
        .to_string()
}
