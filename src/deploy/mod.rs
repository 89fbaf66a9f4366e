pub mod context;
pub mod plan;
pub mod steps;

use anyhow::Result;

use crate::output;
use crate::platform::CloudPlatform;
use crate::secrets::SecretResolver;

use context::DeployContext;

/// What a run did, step by step.
#[derive(Debug, Default)]
pub struct DeployReport {
    pub first_deploy: bool,
    pub actions: Vec<(String, &'static str)>,
    pub execution: Option<String>,
    pub url: Option<String>,
}

impl DeployReport {
    fn record(&mut self, resource: &str, action: &'static str) {
        self.actions.push((resource.to_string(), action));
    }

    #[cfg(test)]
    pub fn action(&self, resource: &str) -> Option<&'static str> {
        self.actions
            .iter()
            .find(|(r, _)| r == resource)
            .map(|(_, a)| *a)
    }
}

/// Detect → secrets → provision → build → migrate → release → self-configure.
/// Any failure stops the run where it is; re-running resumes from there.
pub async fn run(
    ctx: &DeployContext,
    platform: &dyn CloudPlatform,
    resolver: &SecretResolver,
) -> Result<DeployReport> {
    output::header(&format!(
        "Deploying {} to {}/{} (release {})",
        ctx.target.service, ctx.target.project, ctx.target.region, ctx.release.name
    ));

    let live = steps::detect_state(platform, ctx).await?;
    let first_deploy = !live.is_present();

    let secrets = steps::acquire_secrets(first_deploy, resolver)?;

    let mut report = DeployReport {
        first_deploy,
        ..Default::default()
    };

    steps::provision(platform, ctx, &mut report).await?;
    steps::build_image(platform, ctx).await?;
    steps::migrate(platform, ctx, &live, secrets.as_ref(), &mut report).await?;
    steps::release(platform, ctx, &live, secrets.as_ref(), &mut report).await?;
    report.url = steps::self_configure(platform, ctx, first_deploy, &mut report).await?;

    print_summary(&report);
    output::success(&format!(
        "Deploy complete in {}s! {} is live{}",
        ctx.release.elapsed_secs(),
        ctx.target.service,
        report
            .url
            .as_deref()
            .map(|u| format!(" at {}", u))
            .unwrap_or_default()
    ));
    Ok(report)
}

fn print_summary(report: &DeployReport) {
    let kind = if report.first_deploy { "First deploy" } else { "Update" };
    output::header(&format!("{} summary", kind));
    for (resource, action) in &report.actions {
        output::planned(action, resource, "");
    }
    if let Some(execution) = &report.execution {
        output::field("Migrations", execution);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::DeployConfig;
    use crate::error::DeployError;
    use crate::platform::mock::{MockPlatform, MockState};
    use crate::platform::{LiveService, MigrationJob, ServiceLimits};
    use crate::reconcile::{
        ADMIN_BASE_URL, ALLOWED_HOSTS, BUCKET_NAME, CSRF_TRUSTED_ORIGINS, REQUIRED_KEYS,
        SELF_ADDRESS_KEYS, SETTINGS_MODULE, SITE_URL,
    };
    use crate::secrets::{StaticSource, DATABASE_URL, SECRET_KEY};

    const URL: &str = "https://thermography-abc-uc.a.run.app";

    fn ctx() -> DeployContext {
        DeployContext::new(DeployConfig::default())
    }

    fn resolver() -> SecretResolver {
        StaticSource::resolver(&[
            (SECRET_KEY, "first-run-key"),
            (DATABASE_URL, "postgresql://u:p@db.neon.tech/site?sslmode=require"),
        ])
    }

    fn live_env() -> BTreeMap<String, String> {
        BTreeMap::from([
            (SETTINGS_MODULE.to_string(), "thermography_site.settings.production".to_string()),
            (SECRET_KEY.to_string(), "live-key".to_string()),
            (DATABASE_URL.to_string(), "postgresql://live?sslmode=require".to_string()),
            (BUCKET_NAME.to_string(), "thermography-site-media".to_string()),
            (ALLOWED_HOSTS.to_string(), "thermography-abc-uc.a.run.app".to_string()),
            (CSRF_TRUSTED_ORIGINS.to_string(), URL.to_string()),
            (ADMIN_BASE_URL.to_string(), URL.to_string()),
            (SITE_URL.to_string(), URL.to_string()),
        ])
    }

    fn provisioned() -> MockState {
        MockState {
            service_account: true,
            repository: true,
            bucket: Some(crate::platform::mock::MockBucket {
                spec: ctx().bucket_spec(),
            }),
            ..Default::default()
        }
    }

    fn existing_deployment(with_job: bool) -> MockState {
        let mut state = provisioned();
        state.service = Some(LiveService {
            url: Some(URL.to_string()),
            image: "old-image".to_string(),
            env: live_env(),
        });
        if with_job {
            state.job = Some(MigrationJob {
                image: "old-image".to_string(),
                command: vec!["python".to_string(), "manage.py".to_string()],
                env: BTreeMap::from([("JOB_ONLY".to_string(), "kept".to_string())]),
            });
        }
        state
    }

    #[tokio::test]
    async fn first_deploy_provisions_everything() {
        let platform = MockPlatform::new(MockState {
            assigned_url: Some(URL.to_string()),
            ..Default::default()
        });
        let ctx = ctx();

        let report = run(&ctx, &platform, &resolver()).await.unwrap();

        assert!(report.first_deploy);
        assert_eq!(report.action("service account"), Some("create"));
        assert_eq!(report.action("repository"), Some("create"));
        assert_eq!(report.action("bucket"), Some("create"));
        assert_eq!(report.action("migration job"), Some("create"));
        assert_eq!(report.action("service"), Some("create"));
        assert_eq!(report.action("service address"), Some("update"));
        assert_eq!(report.url.as_deref(), Some(URL));

        let state = platform.state();
        let bucket = state.bucket.as_ref().unwrap();
        assert!(bucket.spec.public_read);
        assert_eq!(bucket.spec.cors.len(), 1);
        assert_eq!(state.grants.len(), 1);
        assert_eq!(state.executions, 1);

        let job = state.job.as_ref().unwrap();
        assert_eq!(job.env[SECRET_KEY], "first-run-key");
        assert_eq!(job.env[BUCKET_NAME], "thermography-site-media");

        let svc = state.service.as_ref().unwrap();
        for key in REQUIRED_KEYS {
            assert!(svc.env.contains_key(key), "service missing {}", key);
        }
        assert_eq!(svc.env[ALLOWED_HOSTS], "thermography-abc-uc.a.run.app");
        assert_eq!(svc.env[CSRF_TRUSTED_ORIGINS], URL);
        assert_eq!(svc.env[ADMIN_BASE_URL], URL);
        assert_eq!(svc.image, ctx.image());

        let created = state.service_spec.as_ref().unwrap();
        assert!(created.allow_unauthenticated);
        assert_eq!(created.service_account, ctx.config.service_account_email());
        assert_eq!(
            created.limits,
            ServiceLimits {
                memory: "512Mi".to_string(),
                cpu: "1".to_string(),
                concurrency: 80,
                timeout_secs: 300,
                min_instances: 0,
                max_instances: 3,
                port: 8080,
            }
        );
    }

    #[tokio::test]
    async fn first_deploy_step_order() {
        let platform = MockPlatform::new(MockState {
            assigned_url: Some(URL.to_string()),
            ..Default::default()
        });

        run(&ctx(), &platform, &resolver()).await.unwrap();

        let calls = platform.calls();
        let pos = |name: &str| calls.iter().position(|c| c == name).unwrap();
        assert!(pos("create_service_account") < pos("grant_bucket_access"));
        assert!(pos("create_repository") < pos("build_image"));
        assert!(pos("build_image") < pos("create_job"));
        assert!(pos("execute_job") < pos("create_service"));
        assert!(pos("create_service") < pos("update_service_env"));
    }

    #[tokio::test]
    async fn update_preserves_environments() {
        let platform = MockPlatform::new(existing_deployment(true));
        let ctx = ctx();

        let report = run(&ctx, &platform, &SecretResolver::new(vec![])).await.unwrap();

        assert!(!report.first_deploy);
        assert_eq!(report.action("migration job"), Some("update"));
        assert_eq!(report.action("service"), Some("update"));
        assert_eq!(report.action("service address"), Some("no-op"));

        assert_eq!(platform.count("create_service"), 0);
        assert_eq!(platform.count("update_service_env"), 0);
        // Bucket exists, but access is still granted every run.
        assert_eq!(platform.count("create_bucket"), 0);
        assert_eq!(platform.count("grant_bucket_access"), 1);

        let state = platform.state();
        let job = state.job.as_ref().unwrap();
        assert_eq!(job.image, ctx.image());
        assert_eq!(job.command, ctx.config.migration.command);
        assert_eq!(job.env, BTreeMap::from([("JOB_ONLY".to_string(), "kept".to_string())]));

        let svc = state.service.as_ref().unwrap();
        assert_eq!(svc.image, ctx.image());
        assert_eq!(svc.env, live_env());
    }

    #[tokio::test]
    async fn interrupted_first_deploy_gets_its_address_on_rerun() {
        // Service created, but the run stopped before recording its address.
        let mut state = existing_deployment(true);
        if let Some(svc) = state.service.as_mut() {
            for key in SELF_ADDRESS_KEYS {
                svc.env.remove(key);
            }
        }
        let platform = MockPlatform::new(state);

        let report = run(&ctx(), &platform, &SecretResolver::new(vec![])).await.unwrap();

        assert!(!report.first_deploy);
        assert_eq!(report.action("service address"), Some("update"));
        assert_eq!(platform.count("update_service_env"), 1);

        let state = platform.state();
        let svc = state.service.as_ref().unwrap();
        assert_eq!(svc.env[ALLOWED_HOSTS], "thermography-abc-uc.a.run.app");
        assert_eq!(svc.env[CSRF_TRUSTED_ORIGINS], URL);
        assert_eq!(svc.env[ADMIN_BASE_URL], URL);
        assert_eq!(svc.env[SITE_URL], URL);
        assert_eq!(svc.env[SECRET_KEY], "live-key");
    }

    #[tokio::test]
    async fn missing_job_is_rebuilt_from_live_service() {
        let platform = MockPlatform::new(existing_deployment(false));

        let report = run(&ctx(), &platform, &SecretResolver::new(vec![])).await.unwrap();
        assert_eq!(report.action("migration job"), Some("create"));

        let state = platform.state();
        let job = state.job.as_ref().unwrap();
        assert_eq!(job.env[SECRET_KEY], "live-key");
        assert_eq!(job.env.len(), REQUIRED_KEYS.len());
    }

    #[tokio::test]
    async fn missing_job_with_incomplete_service_aborts() {
        for key in REQUIRED_KEYS {
            let mut state = existing_deployment(false);
            if let Some(svc) = state.service.as_mut() {
                svc.env.insert(key.to_string(), String::new());
            }
            let platform = MockPlatform::new(state);

            let err = run(&ctx(), &platform, &SecretResolver::new(vec![])).await.unwrap_err();
            match err.downcast_ref::<DeployError>() {
                Some(DeployError::MissingConfig(keys)) => assert_eq!(keys, &vec![key.to_string()]),
                other => panic!("expected MissingConfig for {}, got {:?}", key, other),
            }
            assert_eq!(platform.count("create_job"), 0);
            assert_eq!(platform.count("execute_job"), 0);
            assert_eq!(platform.count("update_service_image"), 0);
        }
    }

    #[tokio::test]
    async fn failed_migration_blocks_release() {
        let mut state = existing_deployment(true);
        state.fail_migration = true;
        let platform = MockPlatform::new(state);

        let err = run(&ctx(), &platform, &SecretResolver::new(vec![])).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::MigrationFailed { .. })
        ));
        assert_eq!(platform.count("execute_job"), 1);
        assert_eq!(platform.count("update_service_image"), 0);
        assert_eq!(platform.count("create_service"), 0);
        assert_eq!(platform.state().service.as_ref().unwrap().image, "old-image");
    }

    #[tokio::test]
    async fn ambiguous_probe_stops_before_any_mutation() {
        let platform = MockPlatform::new(MockState {
            service_probe_error: Some("PERMISSION_DENIED".to_string()),
            ..Default::default()
        });

        let err = run(&ctx(), &platform, &resolver()).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::ProbeUnknown { .. })
        ));
        assert_eq!(platform.calls(), vec!["describe_service".to_string()]);
    }

    #[tokio::test]
    async fn first_deploy_without_secrets_stops_before_provisioning() {
        let platform = MockPlatform::new(MockState::default());

        let err = run(&ctx(), &platform, &SecretResolver::new(vec![])).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::SecretUnavailable(_))
        ));
        assert_eq!(platform.calls(), vec!["describe_service".to_string()]);
    }

    #[tokio::test]
    async fn provisioning_twice_is_harmless() {
        let platform = MockPlatform::new(provisioned());
        let ctx = ctx();

        for _ in 0..2 {
            let mut report = DeployReport::default();
            steps::provision(&platform, &ctx, &mut report).await.unwrap();
            assert_eq!(report.action("service account"), Some("no-op"));
            assert_eq!(report.action("repository"), Some("no-op"));
            assert_eq!(report.action("bucket"), Some("no-op"));
        }

        assert_eq!(platform.count("create_service_account"), 0);
        assert_eq!(platform.count("create_repository"), 0);
        assert_eq!(platform.count("create_bucket"), 0);
        assert_eq!(platform.count("grant_bucket_access"), 2);
    }

    #[tokio::test]
    async fn rerun_after_first_deploy_is_an_update() {
        let platform = MockPlatform::new(MockState {
            assigned_url: Some(URL.to_string()),
            ..Default::default()
        });
        let ctx = ctx();

        run(&ctx, &platform, &resolver()).await.unwrap();
        let second = run(&ctx, &platform, &SecretResolver::new(vec![])).await.unwrap();

        assert!(!second.first_deploy);
        assert_eq!(second.action("bucket"), Some("no-op"));
        assert_eq!(second.action("migration job"), Some("update"));
        assert_eq!(platform.count("create_bucket"), 1);
        assert_eq!(platform.state().executions, 2);
    }
}
