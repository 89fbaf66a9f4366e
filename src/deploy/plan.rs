//! Dry run: probe everything, apply nothing.

use anyhow::Result;

use crate::error::DeployError;
use crate::platform::{CloudPlatform, Probe};
use crate::reconcile::{self, Action};

use super::context::DeployContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub resource: String,
    pub action: &'static str,
    pub note: String,
}

impl PlannedChange {
    fn new(resource: String, action: &'static str, note: &str) -> Self {
        Self {
            resource,
            action,
            note: note.to_string(),
        }
    }
}

pub async fn plan(ctx: &DeployContext, platform: &dyn CloudPlatform) -> Result<Vec<PlannedChange>> {
    let mut changes = Vec::new();

    let live = platform.describe_service(&ctx.target.service).await?;
    let first_deploy = !live.is_present();

    let account = ctx.service_account_spec();
    let observed = platform.describe_service_account(&account.email).await?;
    let resource = format!("service account {}", account.email);
    changes.push(PlannedChange::new(
        resource,
        reconcile::plan_ensure(account, &observed).label(),
        "",
    ));

    let repository = ctx.repository_spec();
    let observed = platform.describe_repository(&repository.name).await?;
    let resource = format!("repository {}", repository.name);
    changes.push(PlannedChange::new(
        resource,
        reconcile::plan_ensure(repository, &observed).label(),
        "",
    ));

    let bucket = ctx.bucket_spec();
    let observed = platform.describe_bucket(&bucket.name).await?;
    let resource = format!("bucket {}", bucket.name);
    let action = reconcile::plan_ensure(bucket, &observed);
    let note = match action {
        Action::Create(_) => "public read, CORS",
        _ => "",
    };
    changes.push(PlannedChange::new(resource, action.label(), note));

    let grant = ctx.bucket_grant();
    changes.push(PlannedChange::new(
        format!("bucket access {}", grant.member),
        "update",
        &grant.role,
    ));

    changes.push(PlannedChange::new(
        format!("image {}", ctx.image()),
        "update",
        "build and push",
    ));

    let job_name = ctx.config.job_name();
    let observed = platform.describe_job(&job_name).await?;
    let resource = format!("migration job {}", job_name);
    if observed.is_present() {
        changes.push(PlannedChange::new(resource, "update", "image and command"));
    } else if first_deploy {
        changes.push(PlannedChange::new(resource, "create", "secrets collected at deploy time"));
    } else {
        match reconcile::plan_migration_job(ctx.job_spec(), &observed, &live, None) {
            Ok(action) => changes.push(PlannedChange::new(
                resource,
                action.label(),
                "configuration harvested from live service",
            )),
            Err(err) => match err.downcast_ref::<DeployError>() {
                Some(missing @ DeployError::MissingConfig(_)) => {
                    changes.push(PlannedChange::new(resource, "blocked", &missing.to_string()));
                }
                _ => return Err(err),
            },
        }
    }

    let release = reconcile::plan_release(ctx.service_spec(None), &live);
    let note = match (&release, &live) {
        (Action::Create(_), _) => "full environment, public access",
        (_, Probe::Present(_)) => "image only",
        _ => "",
    };
    changes.push(PlannedChange::new(
        format!("service {}", ctx.target.service),
        release.label(),
        note,
    ));

    let (address, note) = match &live {
        Probe::Absent => ("update", "recorded after release"),
        Probe::Present(svc) if reconcile::self_address_missing(&svc.env) => {
            ("update", "address keys missing from live service")
        }
        Probe::Present(_) => ("no-op", ""),
    };
    changes.push(PlannedChange::new("service address".to_string(), address, note));

    Ok(changes)
}
