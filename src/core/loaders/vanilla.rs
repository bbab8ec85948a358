use async_trait::async_trait;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::server::ServerFlavor;

use super::context::{FinalizeContext, ResolveContext};
use super::installer::{finalize_server_jar, Finalized, FlavorHandler, ResolvedArtifact};

/// Mojang's server jar, found through the version manifest.
pub struct VanillaHandler;

fn unavailable(err: impl ToString) -> LauncherError {
    LauncherError::CatalogUnavailable {
        flavor: ServerFlavor::Vanilla.to_string(),
        reason: err.to_string(),
    }
}

#[async_trait]
impl FlavorHandler for VanillaHandler {
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact> {
        info!("Resolving Vanilla {}", ctx.version);

        // 1. Version manifest
        let manifest = ctx.catalog.vanilla_manifest().await.map_err(unavailable)?;

        // 2. Matching entry
        let entry = manifest
            .find_version(ctx.version)
            .ok_or_else(|| LauncherError::VersionNotFound {
                flavor: ServerFlavor::Vanilla.to_string(),
                version: ctx.version.to_string(),
            })?;

        // 3. Per-version details hold the server download
        let details = ctx
            .catalog
            .vanilla_details(&entry.url)
            .await
            .map_err(unavailable)?;
        let server = details.downloads.server.ok_or_else(|| {
            LauncherError::Unsupported(format!(
                "Minecraft {} has no dedicated server download",
                ctx.version
            ))
        })?;

        Ok(ResolvedArtifact::parse(&server.url, None)?.with_sha1(server.sha1))
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
    use crate::core::version::manifest::VERSION_MANIFEST_URL;

    fn manifest_transport() -> FakeTransport {
        FakeTransport::new()
            .with_json(
                VERSION_MANIFEST_URL,
                json!({"versions": [
                    {"id": "1.20.4", "type": "release", "url": "https://meta.test/1.20.4.json"},
                    {"id": "1.2.5", "type": "release", "url": "https://meta.test/1.2.5.json"}
                ]}),
            )
            .with_json(
                "https://meta.test/1.20.4.json",
                json!({"downloads": {"server": {
                    "url": "https://piston-data.mojang.com/v1/objects/abc/server.jar",
                    "sha1": "0e1fb2a3a5fd1e4b1ee5bd0b2e8e4b2c4c7dd3f5",
                    "size": 49150256
                }}}),
            )
            .with_json(
                "https://meta.test/1.2.5.json",
                json!({"downloads": {"client": {"url": "https://x/client.jar"}}}),
            )
    }

    #[tokio::test]
    async fn follows_manifest_to_server_jar() {
        let catalog = catalog(manifest_transport());
        let artifact = VanillaHandler
            .resolve(&ResolveContext {
                version: "1.20.4",
                catalog: &catalog,
            })
            .await
            .unwrap();
        assert_eq!(
            artifact.url.as_str(),
            "https://piston-data.mojang.com/v1/objects/abc/server.jar"
        );
        assert_eq!(
            artifact.sha1.as_deref(),
            Some("0e1fb2a3a5fd1e4b1ee5bd0b2e8e4b2c4c7dd3f5")
        );
    }

    #[tokio::test]
    async fn unknown_version_is_not_found() {
        let catalog = catalog(manifest_transport());
        let err = VanillaHandler
            .resolve(&ResolveContext {
                version: "9.9.9",
                catalog: &catalog,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn versions_without_server_are_unsupported() {
        let catalog = catalog(manifest_transport());
        let err = VanillaHandler
            .resolve(&ResolveContext {
                version: "1.2.5",
                catalog: &catalog,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::Unsupported(_)));
    }
}
