use anyhow::Result;
use std::collections::BTreeMap;

use crate::config::DeployConfig;
use crate::gcloud::Gcloud;
use crate::output;
use crate::platform::{CloudPlatform, Probe};
use crate::reconcile::REQUIRED_KEYS;

pub async fn run(config: DeployConfig, reveal: bool) -> Result<()> {
    let target = config.target();
    let platform = Gcloud::new(&target.project, &target.region)?;

    output::header(&format!(
        "{} in {}/{}",
        target.service, target.project, target.region
    ));

    match platform.describe_service(&target.service).await? {
        Probe::Present(svc) => {
            output::field("URL", svc.url.as_deref().unwrap_or("(not assigned)"));
            output::field("Image", &svc.image);
            print_env(&svc.env, reveal);

            let missing: Vec<&str> = REQUIRED_KEYS
                .iter()
                .copied()
                .filter(|k| svc.env.get(*k).map_or(true, |v| v.is_empty()))
                .collect();
            if !missing.is_empty() {
                output::warning(&format!("Missing required configuration: {}", missing.join(", ")));
            }
        }
        Probe::Absent => {
            output::info("Service not deployed yet. Run `thermo-deploy` to create it.");
        }
    }

    let job_name = config.job_name();
    match platform.describe_job(&job_name).await? {
        Probe::Present(job) => {
            output::field("Job", &job_name);
            output::field("Job image", &job.image);
            output::field("Job command", &job.command.join(" "));
        }
        Probe::Absent => output::field("Job", "(absent)"),
    }

    let bucket = config.bucket_name();
    let state = if platform.describe_bucket(&bucket).await?.is_present() {
        bucket
    } else {
        format!("{} (absent)", bucket)
    };
    output::field("Bucket", &state);

    Ok(())
}

fn print_env(env: &BTreeMap<String, String>, reveal: bool) {
    if env.is_empty() {
        output::field("Env", "(none)");
        return;
    }
    println!("  Env:");
    for (key, value) in env {
        let shown = if reveal { value.clone() } else { output::mask(value) };
        println!("    {}={}", key, shown);
    }
}
