use chrono::{DateTime, Local};
use std::fmt;

use crate::config::DeployConfig;

/// Artifact Registry address of the service image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub host: String,
    pub project: String,
    pub repository: String,
    pub name: String,
    pub tag: String,
}

impl ImageRef {
    /// Every release overwrites `latest`; there is no versioned tag.
    pub fn latest(region: &str, project: &str, repository: &str, name: &str) -> Self {
        Self {
            host: format!("{}-docker.pkg.dev", region),
            project: project.to_string(),
            repository: repository.to_string(),
            name: name.to_string(),
            tag: "latest".to_string(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}:{}",
            self.host, self.project, self.repository, self.name, self.tag
        )
    }
}

/// One invocation of the orchestrator. The name only labels output.
pub struct Release {
    pub name: String,
    pub started_at: DateTime<Local>,
    pub image: ImageRef,
}

impl Release {
    pub fn new(config: &DeployConfig) -> Self {
        let now = Local::now();
        Self {
            name: now.format("%Y%m%d-%H%M%S").to_string(),
            started_at: now,
            image: ImageRef::latest(
                &config.target.region,
                &config.target.project,
                &config.build.repository,
                &config.target.service,
            ),
        }
    }

    pub fn elapsed_secs(&self) -> i64 {
        (Local::now() - self.started_at).num_seconds()
    }
}
