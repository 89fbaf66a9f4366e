use anyhow::Result;

use crate::config::DeployConfig;
use crate::deploy;
use crate::deploy::context::DeployContext;
use crate::gcloud::Gcloud;
use crate::output;
use crate::secrets::SecretResolver;

pub async fn run(config: DeployConfig, non_interactive: bool) -> Result<()> {
    let ctx = DeployContext::new(config);
    let platform = Gcloud::new(&ctx.target.project, &ctx.target.region)?;
    let resolver = SecretResolver::standard(!non_interactive);

    if let Err(e) = deploy::run(&ctx, &platform, &resolver).await {
        output::error("Deploy stopped. Resources created so far are kept; re-run to resume.");
        return Err(e);
    }
    Ok(())
}
