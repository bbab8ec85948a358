use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Url;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::FetchExhausted;
use crate::core::server::files::{self, LaunchTarget, ScriptKind, StartScript};
use crate::core::server::ServerFlavor;
use crate::core::version::Lookup;

use super::{
    context::{FinalizeContext, ResolveContext},
    fabric::FabricHandler,
    forge::ForgeHandler,
    paper::PaperHandler,
    purpur::PurpurHandler,
    vanilla::VanillaHandler,
};

/// Where the server artifact for a `{flavor, version}` comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedArtifact {
    pub url: Url,
    /// Build or loader the URL points at, for logs and progress text.
    pub build: Option<String>,
    /// Expected SHA-1 of the download, when the vendor publishes one.
    pub sha1: Option<String>,
}

impl ResolvedArtifact {
    pub fn parse(url: &str, build: Option<String>) -> LauncherResult<Self> {
        let url = Url::parse(url)
            .map_err(|e| LauncherError::Other(format!("invalid download URL {url}: {e}")))?;
        Ok(Self {
            url,
            build,
            sha1: None,
        })
    }

    pub fn with_sha1(mut self, sha1: Option<String>) -> Self {
        self.sha1 = sha1;
        self
    }
}

/// Outcome of flavor finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    /// What the server launches from: the jar, or an args file.
    pub launch_file: PathBuf,
    pub start_script: Option<PathBuf>,
}

#[async_trait]
pub trait FlavorHandler: Send + Sync {
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact>;

    async fn finalize(&self, ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized>;
}

/// Dispatcher without Box<dyn>, picked once per installation.
pub enum FlavorInstaller {
    Vanilla(VanillaHandler),
    Paper(PaperHandler),
    Purpur(PurpurHandler),
    Fabric(FabricHandler),
    Forge(ForgeHandler),
}

impl FlavorInstaller {
    pub fn new(flavor: ServerFlavor, fabric_installer_version: &str) -> Self {
        match flavor {
            ServerFlavor::Vanilla => Self::Vanilla(VanillaHandler),
            ServerFlavor::Paper => Self::Paper(PaperHandler),
            ServerFlavor::Purpur => Self::Purpur(PurpurHandler),
            ServerFlavor::Fabric => Self::Fabric(FabricHandler::new(fabric_installer_version)),
            ServerFlavor::Forge => Self::Forge(ForgeHandler::forge()),
            ServerFlavor::NeoForge => Self::Forge(ForgeHandler::neoforge()),
        }
    }

    pub async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact> {
        match self {
            FlavorInstaller::Vanilla(h) => h.resolve(ctx).await,
            FlavorInstaller::Paper(h) => h.resolve(ctx).await,
            FlavorInstaller::Purpur(h) => h.resolve(ctx).await,
            FlavorInstaller::Fabric(h) => h.resolve(ctx).await,
            FlavorInstaller::Forge(h) => h.resolve(ctx).await,
        }
    }

    pub async fn finalize(&self, ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized> {
        match self {
            FlavorInstaller::Vanilla(h) => h.finalize(ctx).await,
            FlavorInstaller::Paper(h) => h.finalize(ctx).await,
            FlavorInstaller::Purpur(h) => h.finalize(ctx).await,
            FlavorInstaller::Fabric(h) => h.finalize(ctx).await,
            FlavorInstaller::Forge(h) => h.finalize(ctx).await,
        }
    }
}

/// Finalization shared by flavors whose download already is the server jar.
pub(super) async fn finalize_server_jar(ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized> {
    let start_script = if ctx.options.create_start_script {
        ctx.progress.report("Writing start script...", 50);
        let jar_name = ctx
            .artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "server.jar".to_string());
        let script = StartScript {
            kind: ScriptKind::native(),
            java: files::script_java_path(ctx.install_dir, ctx.java),
            memory_mb: ctx.options.memory_mb,
            gui: ctx.options.gui,
            target: LaunchTarget::Jar(jar_name),
        };
        Some(files::write_start_script(ctx.install_dir, &script).await?)
    } else {
        None
    };

    ctx.progress.report("Server jar in place", 100);
    Ok(Finalized {
        launch_file: ctx.artifact.to_path_buf(),
        start_script,
    })
}

/// First entry of a catalog lookup, or the matching resolution error.
pub(super) fn newest<T>(
    lookup: Lookup<T>,
    flavor: ServerFlavor,
    version: &str,
) -> LauncherResult<T> {
    match lookup {
        Lookup::Available(items) => items.into_iter().next().ok_or(LauncherError::NoBuilds {
            flavor: flavor.to_string(),
            version: version.to_string(),
        }),
        Lookup::Unavailable { reason } => Err(LauncherError::CatalogUnavailable {
            flavor: flavor.to_string(),
            reason,
        }),
    }
}

/// A vendor 404 on a per-version endpoint means the version does not exist.
/// Anything else is an outage.
pub(super) fn vendor_error(err: FetchExhausted, flavor: ServerFlavor, version: &str) -> LauncherError {
    if err.is_not_found() {
        LauncherError::VersionNotFound {
            flavor: flavor.to_string(),
            version: version.to_string(),
        }
    } else {
        LauncherError::CatalogUnavailable {
            flavor: flavor.to_string(),
            reason: err.to_string(),
        }
    }
}
