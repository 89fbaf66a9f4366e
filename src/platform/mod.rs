//! The seam between release orchestration and the cloud.
//!
//! Every resource is addressed by name; the implementation holds the project
//! and region it operates in. Describe calls return [`Probe::Absent`] only when
//! the platform explicitly reports "not found". Any other failure is an error.

#[cfg(test)]
pub mod mock;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Outcome of a read-only existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Present(T),
    Absent,
}

impl<T> Probe<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Probe::Present(_))
    }

    pub fn present(self) -> Option<T> {
        match self {
            Probe::Present(v) => Some(v),
            Probe::Absent => None,
        }
    }
}

/// Observed state of the serving container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveService {
    pub url: Option<String>,
    pub image: String,
    pub env: BTreeMap<String, String>,
}

/// Observed state of the migration job definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationJob {
    pub image: String,
    pub command: Vec<String>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountSpec {
    pub name: String,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySpec {
    pub name: String,
    pub location: String,
    pub format: String,
    pub description: String,
}

/// One entry of a bucket CORS policy, in the JSON shape the storage API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CorsRule {
    pub origin: Vec<String>,
    pub method: Vec<String>,
    pub response_header: Vec<String>,
    pub max_age_seconds: u32,
}

/// Bucket configuration. `public_read` and `cors` are applied at creation only.
///
/// Creation and the two policy calls are separate operations. If a policy call
/// fails after the bucket exists, later runs see the bucket as present and do
/// not reapply the policy; it has to be fixed by hand or the bucket deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSpec {
    pub name: String,
    pub location: String,
    pub storage_class: String,
    pub public_read: bool,
    pub cors: Vec<CorsRule>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketGrant {
    pub bucket: String,
    pub member: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub service_account: String,
    pub env: BTreeMap<String, String>,
    pub max_retries: u32,
    pub task_timeout: String,
}

/// In-place job refresh. Carries no environment: existing entries stay as they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLimits {
    pub memory: String,
    pub cpu: String,
    pub concurrency: u32,
    pub timeout_secs: u32,
    pub min_instances: u32,
    pub max_instances: u32,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub image: String,
    pub service_account: String,
    pub env: BTreeMap<String, String>,
    pub limits: ServiceLimits,
    pub allow_unauthenticated: bool,
}

/// Image-only release of an existing service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpdate {
    pub service: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobExecution {
    pub id: String,
    pub status: ExecutionStatus,
}

#[async_trait]
pub trait CloudPlatform: Send + Sync {
    async fn describe_service(&self, name: &str) -> Result<Probe<LiveService>>;
    async fn create_service(&self, spec: &ServiceSpec) -> Result<()>;
    async fn update_service_image(&self, update: &ImageUpdate) -> Result<()>;
    /// Merge `env` into the service's environment; other entries are kept.
    async fn update_service_env(&self, name: &str, env: &BTreeMap<String, String>) -> Result<()>;

    async fn describe_service_account(&self, email: &str) -> Result<Probe<()>>;
    async fn create_service_account(&self, spec: &ServiceAccountSpec) -> Result<()>;

    async fn describe_repository(&self, name: &str) -> Result<Probe<()>>;
    async fn create_repository(&self, spec: &RepositorySpec) -> Result<()>;

    async fn describe_bucket(&self, name: &str) -> Result<Probe<()>>;
    async fn create_bucket(&self, spec: &BucketSpec) -> Result<()>;
    async fn grant_bucket_access(&self, grant: &BucketGrant) -> Result<()>;

    async fn build_image(&self, source: &Path, image: &str) -> Result<()>;

    async fn describe_job(&self, name: &str) -> Result<Probe<MigrationJob>>;
    async fn create_job(&self, spec: &JobSpec) -> Result<()>;
    async fn update_job(&self, update: &JobUpdate) -> Result<()>;
    /// Run the job once and wait for it to finish.
    async fn execute_job(&self, name: &str) -> Result<JobExecution>;
}
