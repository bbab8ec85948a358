use async_trait::async_trait;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::server::ServerFlavor;
use crate::core::version::vendors::PAPER_API_BASE;

use super::context::{FinalizeContext, ResolveContext};
use super::installer::{
    finalize_server_jar, vendor_error, Finalized, FlavorHandler, ResolvedArtifact,
};

/// PaperMC: newest build of the requested version.
pub struct PaperHandler;

pub fn paper_download_url(version: &str, build: &str) -> String {
    format!(
        "{}/versions/{}/builds/{}/downloads/paper-{}-{}.jar",
        PAPER_API_BASE, version, build, version, build
    )
}

#[async_trait]
impl FlavorHandler for PaperHandler {
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact> {
        let listing = ctx
            .catalog
            .paper_version(ctx.version)
            .await
            .map_err(|e| vendor_error(e, ServerFlavor::Paper, ctx.version))?;
        let build = listing
            .builds
            .iter()
            .max()
            .map(u64::to_string)
            .ok_or_else(|| LauncherError::NoBuilds {
                flavor: ServerFlavor::Paper.to_string(),
                version: ctx.version.to_string(),
            })?;
        info!("Paper {} resolved to build {}", ctx.version, build);
        ResolvedArtifact::parse(&paper_download_url(ctx.version, &build), Some(build))
    }

    async fn finalize(&self, ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized> {
        finalize_server_jar(ctx).await
    }
}
