use thiserror::Error;

/// Failures the orchestrator distinguishes by kind. Everything else travels as
/// a plain `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The platform answered a probe with something other than "not found".
    /// Treating that as absence could send an existing deployment down the
    /// first-deploy path, so the run stops instead.
    #[error("Could not determine whether {resource} exists: {detail}")]
    ProbeUnknown { resource: String, detail: String },

    #[error("Live service is missing required configuration: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("Secret {0} is empty")]
    EmptySecret(String),

    #[error("Secret {0} was not provided and prompting is disabled")]
    SecretUnavailable(String),

    #[error("Migration job {job} failed: {detail}")]
    MigrationFailed { job: String, detail: String },

    #[error("Service {0} has no public URL")]
    NoServiceUrl(String),

    #[error("Invalid service URL '{0}'")]
    InvalidServiceUrl(String),
}
