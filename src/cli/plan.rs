use anyhow::Result;

use crate::config::DeployConfig;
use crate::deploy::context::DeployContext;
use crate::deploy::plan;
use crate::gcloud::Gcloud;
use crate::output;

pub async fn run(config: DeployConfig) -> Result<()> {
    let ctx = DeployContext::new(config);
    let platform = Gcloud::new(&ctx.target.project, &ctx.target.region)?;

    let spinner = output::create_spinner("Probing cloud resources");
    let changes = plan::plan(&ctx, &platform).await;
    spinner.finish_and_clear();
    let changes = changes?;

    output::header(&format!(
        "Plan for {} in {}/{}",
        ctx.target.service, ctx.target.project, ctx.target.region
    ));
    for change in &changes {
        output::planned(change.action, &change.resource, &change.note);
    }

    println!();
    if changes.iter().any(|c| c.action == "blocked") {
        output::warning("A deploy would stop at the blocked step");
    } else {
        output::info("Run `thermo-deploy deploy` to apply");
    }
    Ok(())
}
