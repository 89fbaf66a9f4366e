use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::DeployError;
use crate::output;
use crate::platform::{CloudPlatform, ExecutionStatus, LiveService, Probe};
use crate::reconcile::{self, Action};
use crate::secrets::{RuntimeSecrets, SecretResolver};

use super::context::DeployContext;
use super::DeployReport;

const TOTAL_STEPS: usize = 7;

pub async fn detect_state(platform: &dyn CloudPlatform, ctx: &DeployContext) -> Result<Probe<LiveService>> {
    output::step(1, TOTAL_STEPS, "Detecting deployment state");

    let live = platform.describe_service(&ctx.target.service).await?;

    match &live {
        Probe::Present(svc) => output::success(&format!(
            "Service {} is live{}",
            ctx.target.service,
            svc.url.as_deref().map(|u| format!(" at {}", u)).unwrap_or_default()
        )),
        Probe::Absent => output::info(&format!(
            "Service {} not found, this is a first deploy",
            ctx.target.service
        )),
    }

    Ok(live)
}

pub fn acquire_secrets(first_deploy: bool, resolver: &SecretResolver) -> Result<Option<RuntimeSecrets>> {
    output::step(2, TOTAL_STEPS, "Collecting runtime secrets");

    if !first_deploy {
        output::success("Reusing configuration of the live service");
        return Ok(None);
    }

    let secrets = resolver.resolve()?;
    output::success("Secrets collected");
    Ok(Some(secrets))
}

pub async fn provision(
    platform: &dyn CloudPlatform,
    ctx: &DeployContext,
    report: &mut DeployReport,
) -> Result<()> {
    output::step(3, TOTAL_STEPS, "Provisioning infrastructure");

    // The runtime identity has to exist before the bucket grant names it.
    let account = ctx.service_account_spec();
    let observed = platform.describe_service_account(&account.email).await?;
    let action = reconcile::plan_ensure(account, &observed);
    report.record("service account", action.label());
    match action {
        Action::Create(spec) => {
            platform.create_service_account(&spec).await?;
            output::success(&format!("Service account {} created", spec.email));
        }
        _ => output::success("Service account exists"),
    }

    let repository = ctx.repository_spec();
    let observed = platform.describe_repository(&repository.name).await?;
    let action = reconcile::plan_ensure(repository, &observed);
    report.record("repository", action.label());
    match action {
        Action::Create(spec) => {
            platform.create_repository(&spec).await?;
            output::success(&format!("Repository {} created", spec.name));
        }
        _ => output::success("Repository exists"),
    }

    let bucket = ctx.bucket_spec();
    let observed = platform.describe_bucket(&bucket.name).await?;
    let action = reconcile::plan_ensure(bucket, &observed);
    report.record("bucket", action.label());
    match action {
        Action::Create(spec) => {
            platform.create_bucket(&spec).await?;
            output::success(&format!("Bucket {} created (public read, CORS)", spec.name));
        }
        _ => output::success("Bucket exists (policies left as they are)"),
    }

    // Runs every time, independent of whether the bucket was just created.
    let grant = ctx.bucket_grant();
    platform.grant_bucket_access(&grant).await?;
    debug!("Granted {} to {} on {}", grant.role, grant.member, grant.bucket);
    output::success("Bucket access granted to runtime identity");

    Ok(())
}

pub async fn build_image(platform: &dyn CloudPlatform, ctx: &DeployContext) -> Result<()> {
    output::step(4, TOTAL_STEPS, "Building container image");

    let image = ctx.image();
    let spinner = output::create_spinner(&format!("Building {}", image));
    let result = platform.build_image(&ctx.config.build.source, &image).await;
    spinner.finish_and_clear();
    result?;

    output::success(&format!("Image {} pushed", image));
    Ok(())
}

pub async fn migrate(
    platform: &dyn CloudPlatform,
    ctx: &DeployContext,
    live: &Probe<LiveService>,
    secrets: Option<&RuntimeSecrets>,
    report: &mut DeployReport,
) -> Result<()> {
    output::step(5, TOTAL_STEPS, "Running database migrations");

    let job_name = ctx.config.job_name();
    let observed = platform.describe_job(&job_name).await?;
    let action = reconcile::plan_migration_job(ctx.job_spec(), &observed, live, secrets)
        .with_context(|| format!("Cannot prepare migration job {}", job_name))?;
    report.record("migration job", action.label());

    match action {
        Action::Create(spec) => {
            platform.create_job(&spec).await?;
            output::success(&format!("Job {} created", spec.name));
        }
        Action::Update(update) => {
            platform.update_job(&update).await?;
            output::success(&format!("Job {} updated to {}", update.name, update.image));
        }
        Action::NoOp => {}
    }

    let spinner = output::create_spinner(&format!("Waiting for {} to finish", job_name));
    let execution = platform.execute_job(&job_name).await;
    spinner.finish_and_clear();
    let execution = execution?;

    match execution.status {
        ExecutionStatus::Succeeded => {
            output::success(&format!("Migrations applied ({})", execution.id));
            report.execution = Some(execution.id);
            Ok(())
        }
        ExecutionStatus::Failed(detail) => Err(DeployError::MigrationFailed {
            job: job_name,
            detail,
        }
        .into()),
    }
}

pub async fn release(
    platform: &dyn CloudPlatform,
    ctx: &DeployContext,
    live: &Probe<LiveService>,
    secrets: Option<&RuntimeSecrets>,
    report: &mut DeployReport,
) -> Result<()> {
    output::step(6, TOTAL_STEPS, "Releasing new image");

    let action = reconcile::plan_release(ctx.service_spec(secrets), live);
    report.record("service", action.label());

    match action {
        Action::Create(spec) => {
            let spinner = output::create_spinner(&format!("Creating service {}", spec.name));
            let result = platform.create_service(&spec).await;
            spinner.finish_and_clear();
            result?;
            output::success(&format!("Service {} created", spec.name));
        }
        Action::Update(update) => {
            let spinner = output::create_spinner(&format!("Releasing {}", update.image));
            let result = platform.update_service_image(&update).await;
            spinner.finish_and_clear();
            result?;
            output::success(&format!("Service {} now runs {}", update.service, update.image));
        }
        Action::NoOp => {}
    }

    Ok(())
}

/// Read the service back and, on a first deploy, teach it its own address.
pub async fn self_configure(
    platform: &dyn CloudPlatform,
    ctx: &DeployContext,
    first_deploy: bool,
    report: &mut DeployReport,
) -> Result<Option<String>> {
    output::step(7, TOTAL_STEPS, "Configuring service address");

    let service = &ctx.target.service;
    let live = platform
        .describe_service(service)
        .await?
        .present()
        .with_context(|| format!("Service {} disappeared after release", service))?;

    let action = reconcile::plan_self_config(first_deploy, &live, service)?;
    report.record("service address", action.label());

    match action {
        Action::Update(env) => {
            platform.update_service_env(service, &env).await?;
            output::success(&format!(
                "Recorded {} as allowed host and trusted origin",
                live.url.as_deref().unwrap_or_default()
            ));
        }
        _ => {
            if live.url.is_none() {
                warn!("Service {} reports no URL", service);
            }
            output::success("Service address unchanged");
        }
    }

    Ok(live.url)
}
