use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

mod validate;

/// Release configuration. Every field has a default, so the file is optional
/// and a bare `thermo-deploy` run targets the stock project.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DeployConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TargetConfig {
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_service")]
    pub service: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            region: default_region(),
            service: default_service(),
        }
    }
}

fn default_project() -> String {
    "thermography-site".to_string()
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_service() -> String {
    "thermography".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_settings_module")]
    pub settings_module: String,
    #[serde(default = "default_service_account")]
    pub service_account: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settings_module: default_settings_module(),
            service_account: default_service_account(),
        }
    }
}

fn default_settings_module() -> String {
    "thermography_site.settings.production".to_string()
}

fn default_service_account() -> String {
    "thermography-run".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BuildConfig {
    #[serde(default = "default_repository")]
    pub repository: String,
    #[serde(default = "default_source")]
    pub source: PathBuf,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            repository: default_repository(),
            source: default_source(),
        }
    }
}

fn default_repository() -> String {
    "thermography".to_string()
}

fn default_source() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Defaults to `{project}-media`.
    pub bucket: Option<String>,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub cors_max_age: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            storage_class: default_storage_class(),
            cors_origins: default_cors_origins(),
            cors_max_age: default_cors_max_age(),
        }
    }
}

fn default_storage_class() -> String {
    "STANDARD".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_cors_max_age() -> u32 {
    3600
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_cpu")]
    pub cpu: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u32,
    #[serde(default)]
    pub min_instances: u32,
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            memory: default_memory(),
            cpu: default_cpu(),
            concurrency: default_concurrency(),
            timeout: default_timeout(),
            min_instances: 0,
            max_instances: default_max_instances(),
            port: default_port(),
        }
    }
}

fn default_memory() -> String {
    "512Mi".to_string()
}
fn default_cpu() -> String {
    "1".to_string()
}
fn default_concurrency() -> u32 {
    80
}
fn default_timeout() -> u32 {
    300
}
fn default_max_instances() -> u32 {
    3
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MigrationConfig {
    /// Defaults to `{service}-migrate`.
    pub job: Option<String>,
    #[serde(default = "default_migrate_command")]
    pub command: Vec<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_task_timeout")]
    pub task_timeout: String,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            job: None,
            command: default_migrate_command(),
            max_retries: default_max_retries(),
            task_timeout: default_task_timeout(),
        }
    }
}

fn default_migrate_command() -> Vec<String> {
    ["python", "manage.py", "migrate", "--noinput"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_retries() -> u32 {
    1
}

fn default_task_timeout() -> String {
    "600s".to_string()
}

/// Stable key for every lookup the orchestrator makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub project: String,
    pub region: String,
    pub service: String,
}

impl DeployConfig {
    /// Load `path` if it exists, otherwise start from the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply environment/CLI overrides, then validate the merged result.
    pub fn with_overrides(mut self, project: Option<String>, region: Option<String>) -> Result<Self> {
        if let Some(project) = project {
            self.target.project = project;
        }
        if let Some(region) = region {
            self.target.region = region;
        }

        validate::validate(&self)?;
        Ok(self)
    }

    pub fn target(&self) -> Target {
        Target {
            project: self.target.project.clone(),
            region: self.target.region.clone(),
            service: self.target.service.clone(),
        }
    }

    pub fn bucket_name(&self) -> String {
        self.storage
            .bucket
            .clone()
            .unwrap_or_else(|| format!("{}-media", self.target.project))
    }

    pub fn job_name(&self) -> String {
        self.migration
            .job
            .clone()
            .unwrap_or_else(|| format!("{}-migrate", self.target.service))
    }

    pub fn service_account_email(&self) -> String {
        format!(
            "{}@{}.iam.gserviceaccount.com",
            self.app.service_account, self.target.project
        )
    }
}
