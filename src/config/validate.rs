use anyhow::{bail, Result};

use super::DeployConfig;

pub fn validate(config: &DeployConfig) -> Result<()> {
    let target = &config.target;
    if target.project.is_empty() {
        bail!("target.project cannot be empty (set GCP_PROJECT_ID or --project)");
    }
    if target.region.is_empty() {
        bail!("target.region cannot be empty (set GCP_REGION or --region)");
    }
    if target.service.is_empty() {
        bail!("target.service cannot be empty");
    }

    if config.app.settings_module.is_empty() {
        bail!("app.settings_module cannot be empty");
    }
    if config.app.service_account.is_empty() {
        bail!("app.service_account cannot be empty");
    }

    if config.build.repository.is_empty() {
        bail!("build.repository cannot be empty");
    }

    if let Some(bucket) = &config.storage.bucket {
        if bucket.is_empty() {
            bail!("storage.bucket cannot be empty when set");
        }
    }

    let svc = &config.service;
    if svc.min_instances > svc.max_instances {
        bail!(
            "service.min_instances ({}) exceeds service.max_instances ({})",
            svc.min_instances,
            svc.max_instances
        );
    }
    if svc.concurrency == 0 {
        bail!("service.concurrency must be at least 1");
    }

    let migration = &config.migration;
    if migration.command.is_empty() {
        bail!("migration.command cannot be empty");
    }
    // Job arguments travel as one comma-separated flag value.
    if let Some(arg) = migration.command.iter().find(|a| a.contains(',')) {
        bail!("migration.command argument '{}' cannot contain a comma", arg);
    }
    if migration.max_retries > 10 {
        bail!(
            "migration.max_retries has invalid value {}. Supported: 0-10",
            migration.max_retries
        );
    }

    Ok(())
}
