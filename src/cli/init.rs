use anyhow::{bail, Context, Result};
use dialoguer::{Input, Select};
use minijinja::Environment;
use std::path::Path;

const TEMPLATE: &str = include_str!("../../templates/deploy.toml.j2");

const REGIONS: [&str; 5] = [
    "us-central1",
    "us-east1",
    "europe-west1",
    "europe-west4",
    "asia-northeast1",
];

pub fn run(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        bail!("{} already exists", config_path.display());
    }

    let default_project = detect_gcloud_project().unwrap_or_else(|| "thermography-site".to_string());

    let project: String = Input::new()
        .with_prompt("Google Cloud project")
        .default(default_project)
        .interact_text()?;

    let region_idx = Select::new()
        .with_prompt("Region")
        .items(&REGIONS)
        .default(0)
        .interact()?;
    let region = REGIONS[region_idx].to_string();

    let service: String = Input::new()
        .with_prompt("Service name")
        .default("thermography".to_string())
        .interact_text()?;

    let bucket: String = Input::new()
        .with_prompt("Media bucket")
        .default(format!("{}-media", project))
        .interact_text()?;

    let content = render(&project, &region, &service, &bucket)?;
    std::fs::write(config_path, content)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    crate::output::success(&format!("Created {}", config_path.display()));
    crate::output::info("Review resource limits, then run `thermo-deploy plan`.");

    Ok(())
}

fn render(project: &str, region: &str, service: &str, bucket: &str) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("deploy.toml", TEMPLATE)?;
    let tmpl = env.get_template("deploy.toml")?;
    let content = tmpl.render(minijinja::context! {
        project => project,
        region => region,
        service => service,
        bucket => bucket,
    })?;
    Ok(content)
}

fn detect_gcloud_project() -> Option<String> {
    let output = std::process::Command::new("gcloud")
        .args(["config", "get-value", "project"])
        .output()
        .ok()?;

    let project = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if output.status.success() && !project.is_empty() && project != "(unset)" {
        Some(project)
    } else {
        None
    }
}
