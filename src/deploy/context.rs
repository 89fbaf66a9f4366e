use std::collections::BTreeMap;

use crate::config::{DeployConfig, Target};
use crate::platform::{
    BucketGrant, BucketSpec, CorsRule, JobSpec, RepositorySpec, ServiceAccountSpec, ServiceLimits,
    ServiceSpec,
};
use crate::reconcile::{BUCKET_NAME, SETTINGS_MODULE};
use crate::release::Release;
use crate::secrets::{RuntimeSecrets, DATABASE_URL, SECRET_KEY};

pub struct DeployContext {
    pub config: DeployConfig,
    pub target: Target,
    pub release: Release,
}

impl DeployContext {
    pub fn new(config: DeployConfig) -> Self {
        let target = config.target();
        let release = Release::new(&config);
        Self {
            config,
            target,
            release,
        }
    }

    pub fn image(&self) -> String {
        self.release.image.to_string()
    }

    pub fn service_account_spec(&self) -> ServiceAccountSpec {
        ServiceAccountSpec {
            name: self.config.app.service_account.clone(),
            email: self.config.service_account_email(),
            display_name: format!("{} runtime", self.target.service),
        }
    }

    pub fn repository_spec(&self) -> RepositorySpec {
        RepositorySpec {
            name: self.config.build.repository.clone(),
            location: self.target.region.clone(),
            format: "docker".to_string(),
            description: format!("Container images for {}", self.target.service),
        }
    }

    pub fn bucket_spec(&self) -> BucketSpec {
        let storage = &self.config.storage;
        BucketSpec {
            name: self.config.bucket_name(),
            location: self.target.region.clone(),
            storage_class: storage.storage_class.clone(),
            public_read: true,
            cors: vec![CorsRule {
                origin: storage.cors_origins.clone(),
                method: vec!["GET".to_string(), "HEAD".to_string()],
                response_header: vec!["Content-Type".to_string()],
                max_age_seconds: storage.cors_max_age,
            }],
        }
    }

    /// Object read/write for the runtime identity on the media bucket.
    pub fn bucket_grant(&self) -> BucketGrant {
        BucketGrant {
            bucket: self.config.bucket_name(),
            member: format!("serviceAccount:{}", self.config.service_account_email()),
            role: "roles/storage.objectAdmin".to_string(),
        }
    }

    /// Settings module and bucket: the entries computed rather than supplied.
    pub fn computed_env(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (SETTINGS_MODULE.to_string(), self.config.app.settings_module.clone()),
            (BUCKET_NAME.to_string(), self.config.bucket_name()),
        ])
    }

    /// Job definition before any secrets are layered on.
    pub fn job_spec(&self) -> JobSpec {
        let migration = &self.config.migration;
        JobSpec {
            name: self.config.job_name(),
            image: self.image(),
            command: migration.command.clone(),
            service_account: self.config.service_account_email(),
            env: self.computed_env(),
            max_retries: migration.max_retries,
            task_timeout: migration.task_timeout.clone(),
        }
    }

    /// Full first-deploy service definition. Without secrets only the computed
    /// entries are present; that form is used for planning, never for creation.
    pub fn service_spec(&self, secrets: Option<&RuntimeSecrets>) -> ServiceSpec {
        let svc = &self.config.service;
        let mut env = self.computed_env();
        if let Some(secrets) = secrets {
            env.insert(SECRET_KEY.to_string(), secrets.secret_key.expose().to_string());
            env.insert(DATABASE_URL.to_string(), secrets.database_url.expose().to_string());
        }

        ServiceSpec {
            name: self.target.service.clone(),
            image: self.image(),
            service_account: self.config.service_account_email(),
            env,
            limits: ServiceLimits {
                memory: svc.memory.clone(),
                cpu: svc.cpu.clone(),
                concurrency: svc.concurrency,
                timeout_secs: svc.timeout,
                min_instances: svc.min_instances,
                max_instances: svc.max_instances,
                port: svc.port,
            },
            allow_unauthenticated: true,
        }
    }
}
