//! Pure planning: desired state × observed state → action.
//!
//! Nothing here talks to the platform. The deploy steps probe, call into these
//! functions, and then apply whatever action comes back.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use url::Url;

use crate::error::DeployError;
use crate::platform::{ImageUpdate, JobSpec, JobUpdate, LiveService, MigrationJob, Probe, ServiceSpec};
use crate::secrets::{RuntimeSecrets, DATABASE_URL, SECRET_KEY};

pub const SETTINGS_MODULE: &str = "DJANGO_SETTINGS_MODULE";
pub const BUCKET_NAME: &str = "GS_BUCKET_NAME";
pub const ALLOWED_HOSTS: &str = "ALLOWED_HOSTS";
pub const CSRF_TRUSTED_ORIGINS: &str = "CSRF_TRUSTED_ORIGINS";
pub const ADMIN_BASE_URL: &str = "WAGTAILADMIN_BASE_URL";
pub const SITE_URL: &str = "SITE_URL";

/// Keys a migration job cannot run without. Harvested from the live service
/// when the job has to be recreated on an existing deployment.
pub const REQUIRED_KEYS: [&str; 4] = [SETTINGS_MODULE, SECRET_KEY, DATABASE_URL, BUCKET_NAME];

/// Keys the service learns about itself after its URL is assigned.
pub const SELF_ADDRESS_KEYS: [&str; 4] = [ALLOWED_HOSTS, CSRF_TRUSTED_ORIGINS, ADMIN_BASE_URL, SITE_URL];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<C, U = C> {
    NoOp,
    Create(C),
    Update(U),
}

impl<C, U> Action<C, U> {
    pub fn label(&self) -> &'static str {
        match self {
            Action::NoOp => "no-op",
            Action::Create(_) => "create",
            Action::Update(_) => "update",
        }
    }
}

/// Create-if-absent. An existing resource is never reconciled, so policies
/// attached at creation are not reapplied.
pub fn plan_ensure<D, O>(desired: D, observed: &Probe<O>) -> Action<D> {
    match observed {
        Probe::Present(_) => Action::NoOp,
        Probe::Absent => Action::Create(desired),
    }
}

/// Copy the required keys out of a live environment. Every missing or empty
/// key is reported, not just the first.
pub fn harvest_required(env: &BTreeMap<String, String>) -> Result<BTreeMap<String, String>, DeployError> {
    let mut harvested = BTreeMap::new();
    let mut missing = Vec::new();

    for key in REQUIRED_KEYS {
        match env.get(key).filter(|v| !v.trim().is_empty()) {
            Some(value) => {
                harvested.insert(key.to_string(), value.clone());
            }
            None => missing.push(key.to_string()),
        }
    }

    if missing.is_empty() {
        Ok(harvested)
    } else {
        Err(DeployError::MissingConfig(missing))
    }
}

/// `desired.env` carries only the computed entries (settings module, bucket);
/// secrets are layered on here depending on where they come from.
///
/// - job exists: refresh image and command, leave its environment alone
/// - job missing, first deploy: fresh secrets
/// - job missing, service live: values harvested from the service
pub fn plan_migration_job(
    desired: JobSpec,
    observed: &Probe<MigrationJob>,
    live: &Probe<LiveService>,
    secrets: Option<&RuntimeSecrets>,
) -> Result<Action<JobSpec, JobUpdate>> {
    if observed.is_present() {
        return Ok(Action::Update(JobUpdate {
            name: desired.name,
            image: desired.image,
            command: desired.command,
        }));
    }

    let mut spec = desired;
    match live {
        Probe::Absent => {
            let Some(secrets) = secrets else {
                bail!("Secrets are required to create migration job {} on a first deploy", spec.name);
            };
            spec.env
                .insert(SECRET_KEY.to_string(), secrets.secret_key.expose().to_string());
            spec.env
                .insert(DATABASE_URL.to_string(), secrets.database_url.expose().to_string());
        }
        Probe::Present(service) => {
            spec.env = harvest_required(&service.env)?;
        }
    }

    Ok(Action::Create(spec))
}

/// Full environment on first deploy, image-only afterwards.
pub fn plan_release(desired: ServiceSpec, live: &Probe<LiveService>) -> Action<ServiceSpec, ImageUpdate> {
    match live {
        Probe::Absent => Action::Create(desired),
        Probe::Present(_) => Action::Update(ImageUpdate {
            service: desired.name,
            image: desired.image,
        }),
    }
}

/// The service's own public identity, derived from its assigned URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfAddress {
    /// Host (and port, if any) with scheme and path stripped.
    pub host: String,
    /// The address exactly as the platform reported it.
    pub origin: String,
}

impl SelfAddress {
    pub fn parse(raw: &str) -> Result<Self, DeployError> {
        let raw = raw.trim();
        let parsed = Url::parse(raw).map_err(|_| DeployError::InvalidServiceUrl(raw.to_string()))?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| DeployError::InvalidServiceUrl(raw.to_string()))?;

        let host = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        Ok(Self {
            host,
            origin: raw.to_string(),
        })
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ALLOWED_HOSTS.to_string(), self.host.clone()),
            (CSRF_TRUSTED_ORIGINS.to_string(), self.origin.clone()),
            (ADMIN_BASE_URL.to_string(), self.origin.clone()),
            (SITE_URL.to_string(), self.origin.clone()),
        ])
    }
}

/// True when any self-address key is absent or blank.
pub fn self_address_missing(env: &BTreeMap<String, String>) -> bool {
    SELF_ADDRESS_KEYS
        .iter()
        .any(|k| env.get(*k).map_or(true, |v| v.trim().is_empty()))
}

/// Record the service's address in its own configuration. Runs on a first
/// deploy, and on any later run that finds the address keys missing (a first
/// deploy that stopped after the service was created). Already-recorded
/// values make this a no-op.
pub fn plan_self_config(
    first_deploy: bool,
    live: &LiveService,
    service: &str,
) -> Result<Action<(), BTreeMap<String, String>>> {
    if !first_deploy && !self_address_missing(&live.env) {
        return Ok(Action::NoOp);
    }

    let url = live
        .url
        .as_deref()
        .ok_or_else(|| DeployError::NoServiceUrl(service.to_string()))?;
    let wanted = SelfAddress::parse(url)?.env();

    let settled = wanted.iter().all(|(k, v)| live.env.get(k) == Some(v));
    if settled {
        Ok(Action::NoOp)
    } else {
        Ok(Action::Update(wanted))
    }
}
