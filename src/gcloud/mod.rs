pub mod exec;
pub mod platform;

use anyhow::{bail, Result};
use tracing::debug;

/// Handle on the `gcloud` CLI, pinned to one project and region.
pub struct Gcloud {
    binary: String,
    project: String,
    region: String,
}

impl Gcloud {
    pub fn new(project: &str, region: &str) -> Result<Self> {
        let binary = match which::which("gcloud") {
            Ok(path) => path.to_string_lossy().to_string(),
            Err(_) => bail!(
                "gcloud is not installed. Install the Google Cloud SDK from https://cloud.google.com/sdk"
            ),
        };
        debug!("Using gcloud at {}", binary);

        Ok(Self {
            binary,
            project: project.to_string(),
            region: region.to_string(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}
