use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::{is_benign_log_noise, JarInvocation, OutputLine, OutputStream};
use crate::core::progress::ProgressReporter;
use crate::core::server::files::{self, LaunchTarget, ScriptKind, StartScript};
use crate::core::server::ServerFlavor;
use crate::core::version::vendors::{forge_installer_url, neoforge_installer_url};

use super::context::{FinalizeContext, ResolveContext};
use super::installer::{Finalized, FlavorHandler, ResolvedArtifact};

/// Most recent stderr lines kept for the failure report.
const MAX_DIAGNOSTICS: usize = 20;

/// Files the installer leaves behind once a start script exists.
const INSTALLER_LEFTOVERS: [&str; 5] = [
    "forge-installer.jar",
    "forge-installer.jar.log",
    "installer.log",
    "run.bat",
    "run.sh",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Forge,
    NeoForge,
}

/// Forge and NeoForge: the download is an installer that has to run locally
/// with `--installServer` before a server exists.
pub struct ForgeHandler {
    family: Family,
}

impl ForgeHandler {
    pub fn forge() -> Self {
        Self {
            family: Family::Forge,
        }
    }

    pub fn neoforge() -> Self {
        Self {
            family: Family::NeoForge,
        }
    }

    fn flavor(&self) -> ServerFlavor {
        match self.family {
            Family::Forge => ServerFlavor::Forge,
            Family::NeoForge => ServerFlavor::NeoForge,
        }
    }

    /// Name prefix of the server jar older installers produce.
    fn jar_prefix(&self) -> &'static str {
        match self.family {
            Family::Forge => "forge-",
            Family::NeoForge => "neoforge-",
        }
    }
}

/// How the installed server is launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchFiles {
    /// `@libraries/.../{win,unix}_args.txt`, relative to the install directory.
    ArgsFile(String),
    /// A runnable jar in the install directory.
    Jar(String),
}

#[async_trait]
impl FlavorHandler for ForgeHandler {
    async fn resolve(&self, ctx: &ResolveContext<'_>) -> LauncherResult<ResolvedArtifact> {
        let flavor = self.flavor();
        let not_found = || LauncherError::VersionNotFound {
            flavor: flavor.to_string(),
            version: ctx.version.to_string(),
        };
        let unavailable = |reason: String| LauncherError::CatalogUnavailable {
            flavor: flavor.to_string(),
            reason,
        };

        let (build, url) = match self.family {
            Family::Forge => {
                let promotion = ctx
                    .catalog
                    .forge_promotion(ctx.version)
                    .await
                    .map_err(|e| unavailable(e.to_string()))?;
                let build = promotion.preferred().ok_or_else(not_found)?.to_string();
                let url = forge_installer_url(ctx.version, &build);
                (build, url)
            }
            Family::NeoForge => {
                let build = ctx
                    .catalog
                    .list_builds(flavor, ctx.version)
                    .await
                    .into_result()
                    .map_err(unavailable)?
                    .into_iter()
                    .next()
                    .ok_or_else(not_found)?;
                let url = neoforge_installer_url(&build);
                (build, url)
            }
        };

        info!("{} {} resolved to installer {}", flavor, ctx.version, build);
        ResolvedArtifact::parse(&url, Some(build))
    }

    async fn finalize(&self, ctx: &FinalizeContext<'_>) -> LauncherResult<Finalized> {
        let flavor = self.flavor();
        let java = ctx
            .java
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("java"));

        ctx.progress
            .report(format!("Running the {flavor} installer..."), 5);
        let invocation = JarInvocation {
            java,
            jar: ctx.artifact.to_path_buf(),
            args: vec!["--installServer".to_string()],
            working_dir: ctx.install_dir.to_path_buf(),
        };

        let diagnostics = Mutex::new(Vec::new());
        let on_line = |line: OutputLine| {
            debug!("[installer] {}", line.text);
            match line.stream {
                OutputStream::Stdout => report_installer_hint(ctx.progress, &line.text),
                OutputStream::Stderr if !is_benign_log_noise(&line.text) => {
                    if let Ok(mut kept) = diagnostics.lock() {
                        if kept.len() == MAX_DIAGNOSTICS {
                            kept.remove(0);
                        }
                        kept.push(line.text);
                    }
                }
                OutputStream::Stderr => {}
            }
        };
        let code = ctx.runner.run_jar(&invocation, &on_line).await?;

        if code != Some(0) {
            let diagnostics = diagnostics.into_inner().unwrap_or_default();
            warn!("{} installer exited with {:?}", flavor, code);
            return Err(LauncherError::InstallerExit { code, diagnostics });
        }
        ctx.progress
            .report(format!("{flavor} installer finished"), 90);

        let kind = ScriptKind::native();
        let launch = detect_launch_files(ctx.install_dir, kind, self.jar_prefix()).await?;
        info!("{} launch files: {:?}", flavor, launch);

        let (target, launch_file) = match &launch {
            LaunchFiles::ArgsFile(args) => {
                files::write_user_jvm_args(ctx.install_dir, ctx.options.memory_mb).await?;
                (
                    LaunchTarget::ArgsFile(args.clone()),
                    ctx.install_dir.join(args),
                )
            }
            LaunchFiles::Jar(jar) => (LaunchTarget::Jar(jar.clone()), ctx.install_dir.join(jar)),
        };

        let script = StartScript {
            kind,
            java: files::script_java_path(ctx.install_dir, ctx.java),
            memory_mb: ctx.options.memory_mb,
            gui: ctx.options.gui,
            target,
        };
        let start_script = files::write_start_script(ctx.install_dir, &script).await?;
        remove_leftovers(ctx.install_dir).await;

        ctx.progress.report(format!("{flavor} server ready"), 100);
        Ok(Finalized {
            launch_file,
            start_script: Some(start_script),
        })
    }
}

/// Maps installer chatter to coarse progress. The installer prints no
/// structured progress, so these are hints only.
fn report_installer_hint(progress: &ProgressReporter, line: &str) {
    let lower = line.to_ascii_lowercase();
    if lower.contains("processor") || lower.contains("processing") {
        progress.report("Running installer processors...", 70);
    } else if lower.contains("download") {
        progress.report("Downloading server libraries...", 30);
    }
}

/// Inspects what the installer generated: an args-file launch referenced from
/// `run.bat` / `run.sh`, else a `<prefix>*.jar` that is not the installer.
pub async fn detect_launch_files(
    install_dir: &Path,
    kind: ScriptKind,
    jar_prefix: &str,
) -> LauncherResult<LaunchFiles> {
    let preferred = match kind {
        ScriptKind::Batch => ["run.bat", "run.sh"],
        ScriptKind::Shell => ["run.sh", "run.bat"],
    };

    for script in preferred {
        let Ok(contents) = tokio::fs::read_to_string(install_dir.join(script)).await else {
            continue;
        };
        if let Some(reference) = find_args_reference(&contents) {
            return Ok(LaunchFiles::ArgsFile(
                native_args_file(install_dir, &reference, kind).await,
            ));
        }
    }

    if let Some(jar) = find_server_jar(install_dir, jar_prefix).await? {
        return Ok(LaunchFiles::Jar(jar));
    }

    Err(LauncherError::LaunchFilesNotFound(install_dir.to_path_buf()))
}

/// `libraries/.../win_args.txt` out of a line like
/// `java @user_jvm_args.txt @libraries/.../win_args.txt %*`.
fn find_args_reference(script: &str) -> Option<String> {
    script
        .split_whitespace()
        .map(|token| token.trim_matches('"'))
        .filter_map(|token| token.strip_prefix('@'))
        .find(|path| path.starts_with("libraries") && path.ends_with("_args.txt"))
        .map(|path| path.replace('\\', "/"))
}

/// Swaps to the sibling args file for this platform when it exists.
async fn native_args_file(install_dir: &Path, reference: &str, kind: ScriptKind) -> String {
    let wanted = match kind {
        ScriptKind::Batch => "win_args.txt",
        ScriptKind::Shell => "unix_args.txt",
    };
    let Some((dir, _)) = reference.rsplit_once('/') else {
        return reference.to_string();
    };
    let candidate = format!("{dir}/{wanted}");
    let exists = tokio::fs::metadata(install_dir.join(&candidate))
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);
    if exists {
        candidate
    } else {
        reference.to_string()
    }
}

async fn find_server_jar(install_dir: &Path, prefix: &str) -> LauncherResult<Option<String>> {
    let mut entries = tokio::fs::read_dir(install_dir)
        .await
        .map_err(|e| LauncherError::io(install_dir, e))?;
    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LauncherError::io(install_dir, e))?
    {
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) && name.ends_with(".jar") && !name.contains("installer") {
            candidates.push(name);
        }
    }
    candidates.sort();
    Ok(candidates.into_iter().next())
}

async fn remove_leftovers(install_dir: &Path) {
    for name in INSTALLER_LEFTOVERS {
        let path = install_dir.join(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!("Removed installer leftover {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {:?}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::http::testing::FakeTransport;
    use crate::core::launch::testing::ScriptedRunner;
    use crate::core::loaders::installer::testing::{catalog, reporter, touch};
    use crate::core::server::InstallOptions;
    use crate::core::version::vendors::{FORGE_PROMOTIONS_URL, NEOFORGE_VERSIONS_URL};

    const ARGS_DIR: &str = "libraries/net/minecraftforge/forge/1.20.1-47.2.0";

    fn modern_installer() -> ScriptedRunner {
        ScriptedRunner::exiting(0)
            .stdout("Downloading libraries")
            .stdout("Processor: net.minecraftforge:installertools")
            .stderr("SLF4J: No SLF4J providers were found.")
            .creates(
                "run.bat",
                &format!("@echo off\r\njava @user_jvm_args.txt @{ARGS_DIR}/win_args.txt %*\r\npause\r\n"),
            )
            .creates(
                "run.sh",
                &format!("#!/usr/bin/env sh\njava @user_jvm_args.txt @{ARGS_DIR}/unix_args.txt \"$@\"\n"),
            )
            .creates(&format!("{ARGS_DIR}/win_args.txt"), "-p ...")
            .creates(&format!("{ARGS_DIR}/unix_args.txt"), "-p ...")
            .creates("installer.log", "log")
    }

    async fn finalize_with(
        runner: &ScriptedRunner,
        handler: ForgeHandler,
        dir: &Path,
    ) -> LauncherResult<Finalized> {
        let artifact = dir.join("forge-installer.jar");
        touch(&artifact);
        let options = InstallOptions::default();
        let progress = reporter();
        handler
            .finalize(&FinalizeContext {
                version: "1.20.1",
                install_dir: dir,
                artifact: &artifact,
                java: None,
                options: &options,
                runner,
                progress: &progress,
            })
            .await
    }

    #[tokio::test]
    async fn forge_prefers_recommended_build() {
        let catalog = catalog(FakeTransport::new().with_json(
            FORGE_PROMOTIONS_URL,
            json!({"promos": {"1.20.1-latest": "47.2.20", "1.20.1-recommended": "47.2.0"}}),
        ));
        let artifact = ForgeHandler::forge()
            .resolve(&ResolveContext {
                version: "1.20.1",
                catalog: &catalog,
            })
            .await
            .unwrap();
        assert_eq!(
            artifact.url.as_str(),
            "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar"
        );

        let err = ForgeHandler::forge()
            .resolve(&ResolveContext {
                version: "1.99",
                catalog: &catalog,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn neoforge_uses_newest_matching_release() {
        let catalog = catalog(FakeTransport::new().with_json(
            NEOFORGE_VERSIONS_URL,
            json!({"versions": ["20.4.79-beta", "20.4.80-beta", "21.0.167"]}),
        ));
        let artifact = ForgeHandler::neoforge()
            .resolve(&ResolveContext {
                version: "1.20.4",
                catalog: &catalog,
            })
            .await
            .unwrap();
        assert_eq!(
            artifact.url.as_str(),
            "https://maven.neoforged.net/releases/net/neoforged/neoforge/20.4.80-beta/neoforge-20.4.80-beta-installer.jar"
        );
    }

    #[test]
    fn args_reference_is_found_in_either_script() {
        assert_eq!(
            find_args_reference(
                "java @user_jvm_args.txt @libraries/net/neoforged/neoforge/20.4.80-beta/unix_args.txt \"$@\""
            )
            .as_deref(),
            Some("libraries/net/neoforged/neoforge/20.4.80-beta/unix_args.txt")
        );
        assert_eq!(
            find_args_reference("java @user_jvm_args.txt @libraries\\a\\win_args.txt %*")
                .as_deref(),
            Some("libraries/a/win_args.txt")
        );
        assert_eq!(find_args_reference("java -jar forge.jar"), None);
    }

    #[tokio::test]
    async fn modern_installer_gets_args_file_launch() {
        let dir = tempfile::tempdir().unwrap();
        let runner = modern_installer();

        let done = finalize_with(&runner, ForgeHandler::forge(), dir.path())
            .await
            .unwrap();

        let invocation = &runner.invocations()[0];
        assert_eq!(invocation.args, vec!["--installServer"]);
        assert_eq!(invocation.working_dir, dir.path());

        let script = std::fs::read_to_string(done.start_script.unwrap()).unwrap();
        let native = match ScriptKind::native() {
            ScriptKind::Batch => "win_args.txt",
            ScriptKind::Shell => "unix_args.txt",
        };
        assert!(script.contains(&format!("\"java\" @user_jvm_args.txt @{ARGS_DIR}/{native}")));
        assert!(dir.path().join("user_jvm_args.txt").is_file());
        for leftover in INSTALLER_LEFTOVERS {
            assert!(!dir.path().join(leftover).exists(), "{leftover} left behind");
        }
    }

    #[tokio::test]
    async fn legacy_installer_falls_back_to_jar() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::exiting(0)
            .creates("forge-1.16.5-36.2.39.jar", "jar")
            .creates("minecraft_server.1.16.5.jar", "jar");

        let done = finalize_with(&runner, ForgeHandler::forge(), dir.path())
            .await
            .unwrap();

        assert_eq!(done.launch_file, dir.path().join("forge-1.16.5-36.2.39.jar"));
        let script = std::fs::read_to_string(done.start_script.unwrap()).unwrap();
        assert!(script.contains("-jar forge-1.16.5-36.2.39.jar nogui"));
        assert!(!dir.path().join("forge-installer.jar").exists());
    }

    #[tokio::test]
    async fn server_jar_lookup_skips_installers_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("forge-0-dir.jar")).unwrap();
        std::fs::write(dir.path().join("forge-1.16.5-36.2.39-installer.jar"), b"i").unwrap();
        std::fs::write(dir.path().join("forge-1.16.5-36.2.39.jar"), b"j").unwrap();

        assert_eq!(
            find_server_jar(dir.path(), "forge-").await.unwrap().as_deref(),
            Some("forge-1.16.5-36.2.39.jar")
        );
        assert_eq!(find_server_jar(dir.path(), "neoforge-").await.unwrap(), None);
        assert!(find_server_jar(&dir.path().join("gone"), "forge-").await.is_err());
    }

    #[tokio::test]
    async fn missing_launch_files_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::exiting(0);

        let err = finalize_with(&runner, ForgeHandler::neoforge(), dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, LauncherError::LaunchFilesNotFound(_)));
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_real_diagnostics_only() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ScriptedRunner::exiting(1)
            .stderr("SLF4J: Defaulting to no-operation (NOP) logger implementation")
            .stderr("java.net.UnknownHostException: maven.minecraftforge.net");

        let err = finalize_with(&runner, ForgeHandler::forge(), dir.path())
            .await
            .unwrap_err();
        match err {
            LauncherError::InstallerExit { code, diagnostics } => {
                assert_eq!(code, Some(1));
                assert_eq!(
                    diagnostics,
                    vec!["java.net.UnknownHostException: maven.minecraftforge.net"]
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
