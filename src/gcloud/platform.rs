use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use super::exec::{first_error_line, Invocation};
use super::Gcloud;
use crate::platform::{
    BucketGrant, BucketSpec, CloudPlatform, ExecutionStatus, ImageUpdate, JobExecution, JobSpec,
    JobUpdate, LiveService, MigrationJob, Probe, RepositorySpec, ServiceAccountSpec, ServiceSpec,
};

#[async_trait]
impl CloudPlatform for Gcloud {
    async fn describe_service(&self, name: &str) -> Result<Probe<LiveService>> {
        let inv = Invocation::new(&["run", "services", "describe", name])
            .flag("region", self.region())
            .flag("format", "json");

        match self.probe(&format!("service {}", name), &inv).await? {
            Probe::Present(json) => Ok(Probe::Present(parse_service(&json)?)),
            Probe::Absent => Ok(Probe::Absent),
        }
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<()> {
        let env_file = write_json_file("thermo-env-", ".yaml", &spec.env)?;
        let inv = deploy_invocation(spec, self.region(), env_file.path());

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to create service {}", spec.name))?;
        Ok(())
    }

    async fn update_service_image(&self, update: &ImageUpdate) -> Result<()> {
        let inv = Invocation::new(&["run", "deploy", &update.service])
            .flag("image", &update.image)
            .flag("region", self.region());

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to release {} to {}", update.image, update.service))?;
        Ok(())
    }

    async fn update_service_env(&self, name: &str, env: &BTreeMap<String, String>) -> Result<()> {
        let inv = Invocation::new(&["run", "services", "update", name])
            .flag("region", self.region())
            .flag("update-env-vars", env_update_value(env)?);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to update environment of {}", name))?;
        Ok(())
    }

    async fn describe_service_account(&self, email: &str) -> Result<Probe<()>> {
        let inv = Invocation::new(&["iam", "service-accounts", "describe", email]).flag("format", "json");
        Ok(presence(self.probe(&format!("service account {}", email), &inv).await?))
    }

    async fn create_service_account(&self, spec: &ServiceAccountSpec) -> Result<()> {
        let inv = Invocation::new(&["iam", "service-accounts", "create", &spec.name])
            .flag("display-name", &spec.display_name);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to create service account {}", spec.email))?;
        Ok(())
    }

    async fn describe_repository(&self, name: &str) -> Result<Probe<()>> {
        let inv = Invocation::new(&["artifacts", "repositories", "describe", name])
            .flag("location", self.region())
            .flag("format", "json");
        Ok(presence(self.probe(&format!("repository {}", name), &inv).await?))
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> Result<()> {
        let inv = Invocation::new(&["artifacts", "repositories", "create", &spec.name])
            .flag("repository-format", &spec.format)
            .flag("location", &spec.location)
            .flag("description", &spec.description);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to create repository {}", spec.name))?;
        Ok(())
    }

    async fn describe_bucket(&self, name: &str) -> Result<Probe<()>> {
        let inv = Invocation::new(&["storage", "buckets", "describe", &format!("gs://{}", name)])
            .flag("format", "json");
        Ok(presence(self.probe(&format!("bucket {}", name), &inv).await?))
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<()> {
        let url = format!("gs://{}", spec.name);

        let create = Invocation::new(&["storage", "buckets", "create", &url])
            .flag("location", &spec.location)
            .flag("default-storage-class", &spec.storage_class)
            .switch("uniform-bucket-level-access");
        self.exec(&create)
            .await
            .with_context(|| format!("Failed to create bucket {}", spec.name))?;

        if spec.public_read {
            let public = Invocation::new(&["storage", "buckets", "add-iam-policy-binding", &url])
                .flag("member", "allUsers")
                .flag("role", "roles/storage.objectViewer");
            self.exec(&public)
                .await
                .with_context(|| {
                    format!(
                        "Bucket {} was created but is not publicly readable; \
                         grant allUsers objectViewer by hand or delete it and re-run",
                        spec.name
                    )
                })?;
        }

        if !spec.cors.is_empty() {
            let cors_file = write_json_file("thermo-cors-", ".json", &spec.cors)?;
            let cors = Invocation::new(&["storage", "buckets", "update", &url])
                .flag("cors-file", cors_file.path().to_string_lossy());
            self.exec(&cors)
                .await
                .with_context(|| {
                    format!(
                        "Bucket {} was created without its CORS policy; \
                         set it by hand or delete the bucket and re-run",
                        spec.name
                    )
                })?;
        }

        Ok(())
    }

    async fn grant_bucket_access(&self, grant: &BucketGrant) -> Result<()> {
        let inv = Invocation::new(&[
            "storage",
            "buckets",
            "add-iam-policy-binding",
            &format!("gs://{}", grant.bucket),
        ])
        .flag("member", &grant.member)
        .flag("role", &grant.role);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to grant {} on bucket {}", grant.role, grant.bucket))?;
        Ok(())
    }

    async fn build_image(&self, source: &Path, image: &str) -> Result<()> {
        let inv = Invocation::new(&["builds", "submit"])
            .arg(source.to_string_lossy())
            .flag("tag", image);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to build {} from {}", image, source.display()))?;
        Ok(())
    }

    async fn describe_job(&self, name: &str) -> Result<Probe<MigrationJob>> {
        let inv = Invocation::new(&["run", "jobs", "describe", name])
            .flag("region", self.region())
            .flag("format", "json");

        match self.probe(&format!("job {}", name), &inv).await? {
            Probe::Present(json) => Ok(Probe::Present(parse_job(&json)?)),
            Probe::Absent => Ok(Probe::Absent),
        }
    }

    async fn create_job(&self, spec: &JobSpec) -> Result<()> {
        let env_file = write_json_file("thermo-env-", ".yaml", &spec.env)?;

        let inv = Invocation::new(&["run", "jobs", "create", &spec.name])
            .flag("image", &spec.image)
            .flag("region", self.region())
            .flag("service-account", &spec.service_account)
            .flag("max-retries", spec.max_retries.to_string())
            .flag("task-timeout", &spec.task_timeout)
            .flag("env-vars-file", env_file.path().to_string_lossy());
        let inv = with_command(inv, &spec.command);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to create job {}", spec.name))?;
        Ok(())
    }

    async fn update_job(&self, update: &JobUpdate) -> Result<()> {
        let inv = Invocation::new(&["run", "jobs", "update", &update.name])
            .flag("image", &update.image)
            .flag("region", self.region());
        let inv = with_command(inv, &update.command);

        self.exec(&inv)
            .await
            .with_context(|| format!("Failed to update job {}", update.name))?;
        Ok(())
    }

    async fn execute_job(&self, name: &str) -> Result<JobExecution> {
        let inv = Invocation::new(&["run", "jobs", "execute", name])
            .flag("region", self.region())
            .flag("format", "json")
            .switch("wait");

        let out = self.run(&inv).await?;
        if !out.success {
            return Ok(JobExecution {
                id: "unknown".to_string(),
                status: ExecutionStatus::Failed(first_error_line(&out.stderr)),
            });
        }

        let id = serde_json::from_str::<Value>(&out.stdout)
            .ok()
            .and_then(|v| v["metadata"]["name"].as_str().map(String::from))
            .unwrap_or_else(|| "unknown".to_string());

        Ok(JobExecution {
            id,
            status: ExecutionStatus::Succeeded,
        })
    }
}

/// Initial `run deploy` with the full environment, identity and limits.
fn deploy_invocation(spec: &ServiceSpec, region: &str, env_file: &Path) -> Invocation {
    let limits = &spec.limits;

    let inv = Invocation::new(&["run", "deploy", &spec.name])
        .flag("image", &spec.image)
        .flag("region", region)
        .flag("service-account", &spec.service_account)
        .flag("memory", &limits.memory)
        .flag("cpu", &limits.cpu)
        .flag("concurrency", limits.concurrency.to_string())
        .flag("timeout", limits.timeout_secs.to_string())
        .flag("min-instances", limits.min_instances.to_string())
        .flag("max-instances", limits.max_instances.to_string())
        .flag("port", limits.port.to_string())
        .flag("env-vars-file", env_file.to_string_lossy());

    if spec.allow_unauthenticated {
        inv.switch("allow-unauthenticated")
    } else {
        inv.switch("no-allow-unauthenticated")
    }
}

fn presence(probe: Probe<String>) -> Probe<()> {
    match probe {
        Probe::Present(_) => Probe::Present(()),
        Probe::Absent => Probe::Absent,
    }
}

/// First element becomes the entrypoint, the rest its arguments.
fn with_command(inv: Invocation, command: &[String]) -> Invocation {
    match command.split_first() {
        Some((entry, rest)) => {
            let inv = inv.flag("command", entry);
            if rest.is_empty() {
                inv
            } else {
                inv.flag("args", rest.join(","))
            }
        }
        None => inv,
    }
}

/// The env-vars file format is YAML; JSON is a subset of it.
fn write_json_file<T: Serialize + ?Sized>(prefix: &str, suffix: &str, value: &T) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(suffix)
        .tempfile()
        .context("Failed to create temporary file")?;

    let body = serde_json::to_string_pretty(value).context("Failed to serialize payload")?;
    file.write_all(body.as_bytes())
        .context("Failed to write temporary file")?;
    file.flush()?;

    debug!("Wrote {}", file.path().display());
    Ok(file)
}

/// `--update-env-vars` value using gcloud's alternate-delimiter syntax, picking
/// a delimiter that appears in no key or value.
fn env_update_value(env: &BTreeMap<String, String>) -> Result<String> {
    const DELIMITERS: [char; 6] = ['|', '@', '~', '#', ';', '!'];

    let delim = DELIMITERS
        .iter()
        .copied()
        .find(|d| env.iter().all(|(k, v)| !k.contains(*d) && !v.contains(*d)))
        .context("Every delimiter candidate occurs in the environment values")?;

    let pairs = env
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(&delim.to_string());

    Ok(format!("^{}^{}", delim, pairs))
}

fn parse_env(value: &Value) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    for entry in value.as_array().into_iter().flatten() {
        let Some(name) = entry["name"].as_str() else {
            continue;
        };
        match entry["value"].as_str() {
            Some(v) => {
                env.insert(name.to_string(), v.to_string());
            }
            // Secret Manager references carry no readable value.
            None => debug!("Skipping env {} without a literal value", name),
        }
    }
    env
}

fn parse_service(json: &str) -> Result<LiveService> {
    let v: Value = serde_json::from_str(json).context("Failed to parse service description")?;
    let container = &v["spec"]["template"]["spec"]["containers"][0];

    Ok(LiveService {
        url: v["status"]["url"].as_str().map(String::from),
        image: container["image"].as_str().unwrap_or_default().to_string(),
        env: parse_env(&container["env"]),
    })
}

fn parse_job(json: &str) -> Result<MigrationJob> {
    let v: Value = serde_json::from_str(json).context("Failed to parse job description")?;
    let container = &v["spec"]["template"]["spec"]["template"]["spec"]["containers"][0];

    let command = ["command", "args"]
        .iter()
        .flat_map(|field| container[*field].as_array().cloned().unwrap_or_default())
        .filter_map(|a| a.as_str().map(String::from))
        .collect();

    Ok(MigrationJob {
        image: container["image"].as_str().unwrap_or_default().to_string(),
        command,
        env: parse_env(&container["env"]),
    })
}
