//! In-memory platform used by orchestrator tests. Creating something that
//! already exists is an error, so a duplicate create shows up as a failure.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use super::*;
use crate::error::DeployError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBucket {
    pub spec: BucketSpec,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub service: Option<LiveService>,
    /// Full spec the service was created with.
    pub service_spec: Option<ServiceSpec>,
    pub service_account: bool,
    pub repository: bool,
    pub bucket: Option<MockBucket>,
    pub job: Option<MigrationJob>,
    pub grants: Vec<BucketGrant>,
    pub executions: u32,
    pub built: Vec<String>,
    pub calls: Vec<String>,
    /// URL handed out when the service is first created.
    pub assigned_url: Option<String>,
    pub fail_migration: bool,
    /// When set, probing the service fails with something other than "not found".
    pub service_probe_error: Option<String>,
}

#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl MockPlatform {
    pub fn new(state: MockState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        state
    }
}

#[async_trait]
impl CloudPlatform for MockPlatform {
    async fn describe_service(&self, name: &str) -> Result<Probe<LiveService>> {
        let state = self.record("describe_service");
        if let Some(detail) = &state.service_probe_error {
            return Err(DeployError::ProbeUnknown {
                resource: format!("service {}", name),
                detail: detail.clone(),
            }
            .into());
        }
        Ok(match &state.service {
            Some(svc) => Probe::Present(svc.clone()),
            None => Probe::Absent,
        })
    }

    async fn create_service(&self, spec: &ServiceSpec) -> Result<()> {
        let mut state = self.record("create_service");
        if state.service.is_some() {
            bail!("service {} already exists", spec.name);
        }
        state.service = Some(LiveService {
            url: state.assigned_url.clone(),
            image: spec.image.clone(),
            env: spec.env.clone(),
        });
        state.service_spec = Some(spec.clone());
        Ok(())
    }

    async fn update_service_image(&self, update: &ImageUpdate) -> Result<()> {
        let mut state = self.record("update_service_image");
        match state.service.as_mut() {
            Some(svc) => {
                svc.image = update.image.clone();
                Ok(())
            }
            None => bail!("service {} not found", update.service),
        }
    }

    async fn update_service_env(&self, name: &str, env: &BTreeMap<String, String>) -> Result<()> {
        let mut state = self.record("update_service_env");
        match state.service.as_mut() {
            Some(svc) => {
                svc.env.extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            None => bail!("service {} not found", name),
        }
    }

    async fn describe_service_account(&self, _email: &str) -> Result<Probe<()>> {
        let state = self.record("describe_service_account");
        Ok(if state.service_account { Probe::Present(()) } else { Probe::Absent })
    }

    async fn create_service_account(&self, spec: &ServiceAccountSpec) -> Result<()> {
        let mut state = self.record("create_service_account");
        if state.service_account {
            bail!("service account {} already exists", spec.email);
        }
        state.service_account = true;
        Ok(())
    }

    async fn describe_repository(&self, _name: &str) -> Result<Probe<()>> {
        let state = self.record("describe_repository");
        Ok(if state.repository { Probe::Present(()) } else { Probe::Absent })
    }

    async fn create_repository(&self, spec: &RepositorySpec) -> Result<()> {
        let mut state = self.record("create_repository");
        if state.repository {
            bail!("repository {} already exists", spec.name);
        }
        state.repository = true;
        Ok(())
    }

    async fn describe_bucket(&self, _name: &str) -> Result<Probe<()>> {
        let state = self.record("describe_bucket");
        Ok(if state.bucket.is_some() { Probe::Present(()) } else { Probe::Absent })
    }

    async fn create_bucket(&self, spec: &BucketSpec) -> Result<()> {
        let mut state = self.record("create_bucket");
        if state.bucket.is_some() {
            bail!("bucket {} already exists", spec.name);
        }
        state.bucket = Some(MockBucket { spec: spec.clone() });
        Ok(())
    }

    async fn grant_bucket_access(&self, grant: &BucketGrant) -> Result<()> {
        let mut state = self.record("grant_bucket_access");
        if !state.service_account {
            bail!("member {} does not exist", grant.member);
        }
        state.grants.push(grant.clone());
        Ok(())
    }

    async fn build_image(&self, _source: &Path, image: &str) -> Result<()> {
        let mut state = self.record("build_image");
        if !state.repository {
            bail!("repository for {} does not exist", image);
        }
        state.built.push(image.to_string());
        Ok(())
    }

    async fn describe_job(&self, _name: &str) -> Result<Probe<MigrationJob>> {
        let state = self.record("describe_job");
        Ok(match &state.job {
            Some(job) => Probe::Present(job.clone()),
            None => Probe::Absent,
        })
    }

    async fn create_job(&self, spec: &JobSpec) -> Result<()> {
        let mut state = self.record("create_job");
        if state.job.is_some() {
            bail!("job {} already exists", spec.name);
        }
        state.job = Some(MigrationJob {
            image: spec.image.clone(),
            command: spec.command.clone(),
            env: spec.env.clone(),
        });
        Ok(())
    }

    async fn update_job(&self, update: &JobUpdate) -> Result<()> {
        let mut state = self.record("update_job");
        match state.job.as_mut() {
            Some(job) => {
                job.image = update.image.clone();
                job.command = update.command.clone();
                Ok(())
            }
            None => bail!("job {} not found", update.name),
        }
    }

    async fn execute_job(&self, name: &str) -> Result<JobExecution> {
        let mut state = self.record("execute_job");
        if state.job.is_none() {
            bail!("job {} not found", name);
        }
        state.executions += 1;
        let id = format!("{}-{:05}", name, state.executions);
        let status = if state.fail_migration {
            ExecutionStatus::Failed("Task exited with code 1".to_string())
        } else {
            ExecutionStatus::Succeeded
        };
        Ok(JobExecution { id, status })
    }
}
