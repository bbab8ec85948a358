use async_trait::async_trait;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::server::ServerFlavor;
use crate::core::version::vendors::PURPUR_API_BASE;

use super::context::{FinalizeContext, ResolveContext};
use super::installer::{
    finalize_server_jar, vendor_error, Finalized, FlavorHandler, ResolvedArtifact,
};

/// Purpur: the build the API marks as latest.
pub struct PurpurHandler;

pub fn purpur_download_url(version: &str, build: &str) -> String {
    format!("{}/{}/{}/download", PURPUR_API_BASE, version, build)
}

#[async_trait]
impl FlavorHandler for PurpurHandler {
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact> {
        let listing = ctx
            .catalog
            .purpur_version(ctx.version)
            .await
            .map_err(|e| vendor_error(e, ServerFlavor::Purpur, ctx.version))?;

        // older listings lack the marker
        let build = listing
            .builds
            .latest
            .or_else(|| listing.builds.all.last().cloned())
            .ok_or_else(|| LauncherError::NoBuilds {
                flavor: ServerFlavor::Purpur.to_string(),
                version: ctx.version.to_string(),
            })?;

        info!("Purpur {} resolved to build {}", ctx.version, build);
        ResolvedArtifact::parse(&purpur_download_url(ctx.version, &build), Some(build))
    }

    async fn finalize(&self, ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized> {
        finalize_server_jar(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::http::testing::FakeTransport;
    use crate::core::loaders::installer::testing::catalog;

    async fn resolve(builds: serde_json::Value) -> LauncherResult<ResolvedArtifact> {
        let catalog = catalog(FakeTransport::new().with_json(
            &format!("{PURPUR_API_BASE}/1.20.4"),
            json!({"project": "purpur", "version": "1.20.4", "builds": builds}),
        ));
        PurpurHandler
            .resolve(&ResolveContext {
                version: "1.20.4",
                catalog: &catalog,
            })
            .await
    }

    #[tokio::test]
    async fn latest_marker_is_used() {
        let artifact = resolve(json!({"latest": "2176", "all": ["2175", "2176", "2177"]}))
            .await
            .unwrap();
        assert_eq!(
            artifact.url.as_str(),
            "https://api.purpurmc.org/v2/purpur/1.20.4/2176/download"
        );
    }

    #[tokio::test]
    async fn falls_back_to_last_listed_build() {
        let artifact = resolve(json!({"all": ["2175", "2176"]})).await.unwrap();
        assert_eq!(artifact.build.as_deref(), Some("2176"));

        let err = resolve(json!({"all": []})).await.unwrap_err();
        assert!(matches!(err, LauncherError::NoBuilds { .. }));
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let catalog =
            catalog(FakeTransport::new().with_status(&format!("{PURPUR_API_BASE}/0.0.1"), 404));
        let err = PurpurHandler
            .resolve(&ResolveContext {
                version: "0.0.1",
                catalog: &catalog,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound { .. }));
    }
}
