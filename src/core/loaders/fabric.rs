use async_trait::async_trait;
use tracing::info;

use crate::core::error::LauncherResult;
use crate::core::server::ServerFlavor;
use crate::core::version::vendors::FABRIC_META_BASE;

use super::context::{FinalizeContext, ResolveContext};
use super::installer::{finalize_server_jar, newest, Finalized, FlavorHandler, ResolvedArtifact};

pub const DEFAULT_FABRIC_INSTALLER_VERSION: &str = "1.0.0";

/// Fabric: the meta server bundles loader and installer into a launchable jar.
pub struct FabricHandler {
    installer_version: String,
}

impl FabricHandler {
    pub fn new(installer_version: &str) -> Self {
        Self {
            installer_version: installer_version.to_string(),
        }
    }
}

pub fn fabric_server_jar_url(game_version: &str, loader: &str, installer: &str) -> String {
    format!(
        "{}/versions/loader/{}/{}/{}/server/jar",
        FABRIC_META_BASE, game_version, loader, installer
    )
}

#[async_trait]
impl FlavorHandler for FabricHandler {
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact> {
        let loader = newest(
            ctx.catalog.fabric_stable_loaders().await,
            ServerFlavor::Fabric,
            ctx.version,
        )?;
        info!(
            "Fabric {} resolved to loader {} (installer {})",
            ctx.version, loader, self.installer_version
        );

        let url = fabric_server_jar_url(ctx.version, &loader, &self.installer_version);
        ResolvedArtifact::parse(&url, Some(loader))
    }

    async fn finalize(&self, ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized> {
        finalize_server_jar(ctx).await
    }
}
