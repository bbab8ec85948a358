// ─── Server Installer ───
// Drives one installation: directory, Java runtime, resolution, download,
// flavor finalization, then EULA / properties. Strictly sequential.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, instrument};

use crate::core::downloader::{DownloadRequest, Downloader};
use crate::core::error::{InstallPhase, LauncherError, LauncherResult};
use crate::core::java::{required_java_for_minecraft_version, RuntimeProvisioner};
use crate::core::launch::JarRunner;
use crate::core::loaders::{
    FinalizeContext, FlavorInstaller, ResolveContext, DEFAULT_FABRIC_INSTALLER_VERSION,
};
use crate::core::progress::{scaled_percent, EventSink, ProgressReporter};
use crate::core::version::VersionCatalog;

use super::files;
use super::model::{InstallConfig, InstallResult};

pub struct ServerInstaller {
    catalog: Arc<VersionCatalog>,
    downloader: Arc<Downloader>,
    provisioner: Arc<RuntimeProvisioner>,
    runner: Arc<dyn JarRunner>,
    fabric_installer_version: String,
}

impl ServerInstaller {
    pub fn new(
        catalog: Arc<VersionCatalog>,
        downloader: Arc<Downloader>,
        provisioner: Arc<RuntimeProvisioner>,
        runner: Arc<dyn JarRunner>,
    ) -> Self {
        Self {
            catalog,
            downloader,
            provisioner,
            runner,
            fabric_installer_version: DEFAULT_FABRIC_INSTALLER_VERSION.to_string(),
        }
    }

    pub fn with_fabric_installer_version(mut self, version: impl Into<String>) -> Self {
        self.fabric_installer_version = version.into();
        self
    }

    /// Runs the whole pipeline. Failures carry the phase they happened in.
    /// Nothing is rolled back: a failed run may leave a partially configured
    /// install directory behind.
    #[instrument(skip(self, config, sink), fields(flavor = %config.flavor, version = %config.version))]
    pub async fn install(
        &self,
        config: &InstallConfig,
        sink: Arc<dyn EventSink>,
    ) -> LauncherResult<InstallResult> {
        let reporter = |phase| ProgressReporter::new(sink.clone(), phase);

        // 1. Install directory
        let progress = reporter(InstallPhase::PrepareDirectory);
        progress.report("Preparing install directory...", 0);
        let install_dir = prepare_install_dir(&config.install_path)
            .await
            .map_err(|e| e.in_phase(InstallPhase::PrepareDirectory))?;
        progress.report(format!("Installing into {}", install_dir.display()), 100);

        // 2. Java runtime
        let java = if config.options.auto_provision_java {
            let major = required_java_for_minecraft_version(&config.version);
            let progress = reporter(InstallPhase::ProvisionJava);
            let java = self
                .provisioner
                .ensure_runtime(&install_dir, major, &progress)
                .await
                .map_err(|e| e.in_phase(InstallPhase::ProvisionJava))?;
            Some(java)
        } else {
            None
        };

        // 3. Download URL
        let handler = FlavorInstaller::new(config.flavor, &self.fabric_installer_version);
        let progress = reporter(InstallPhase::ResolveArtifact);
        progress.report(
            format!("Resolving {} {}...", config.flavor, config.version),
            0,
        );
        let artifact = handler
            .resolve(&ResolveContext {
                version: &config.version,
                catalog: &self.catalog,
            })
            .await
            .map_err(|e| e.in_phase(InstallPhase::ResolveArtifact))?;
        progress.report(format!("Resolved {}", artifact.url), 100);

        // 4. Artifact, moved to its fixed name
        let progress = reporter(InstallPhase::DownloadArtifact);
        let file_name = config.flavor.artifact_file_name();
        progress.report(format!("Downloading {file_name}..."), 0);
        let downloaded = self
            .downloader
            .download_observed(
                DownloadRequest::new(artifact.url.as_str(), file_name)
                    .with_sha1(artifact.sha1.clone()),
                sink.as_ref(),
                &|done: u64, total: Option<u64>| {
                    progress.report(
                        format!("Downloading {file_name}..."),
                        scaled_percent(done, total, 100),
                    );
                },
            )
            .await
            .map_err(|e| e.in_phase(InstallPhase::DownloadArtifact))?;
        let artifact_path = downloaded
            .persist_to(&install_dir.join(file_name))
            .await
            .map_err(|e| e.in_phase(InstallPhase::DownloadArtifact))?;
        progress.report(format!("{file_name} downloaded"), 100);

        // 5. Flavor finalization
        let progress = reporter(InstallPhase::Finalize);
        let finalized = handler
            .finalize(&FinalizeContext {
                version: &config.version,
                install_dir: &install_dir,
                artifact: &artifact_path,
                java: java.as_deref(),
                options: &config.options,
                runner: self.runner.as_ref(),
                progress: &progress,
            })
            .await
            .map_err(|e| e.in_phase(InstallPhase::Finalize))?;

        // 6. EULA and properties
        let progress = reporter(InstallPhase::WriteServerFiles);
        write_server_files(&install_dir, config, &progress)
            .await
            .map_err(|e| e.in_phase(InstallPhase::WriteServerFiles))?;

        info!(
            "{} {} installed into {:?}",
            config.flavor, config.version, install_dir
        );
        Ok(InstallResult {
            install_path: install_dir,
            jar: finalized.launch_file,
            java,
            start_script: finalized.start_script,
        })
    }
}

async fn prepare_install_dir(path: &Path) -> LauncherResult<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| LauncherError::io(path, e))?
            .join(path)
    };
    tokio::fs::create_dir_all(&absolute)
        .await
        .map_err(|e| LauncherError::io(&absolute, e))?;
    Ok(absolute)
}

async fn write_server_files(
    install_dir: &Path,
    config: &InstallConfig,
    progress: &ProgressReporter,
) -> LauncherResult<()> {
    if config.options.accept_eula {
        progress.report("Accepting EULA...", 30);
        files::write_eula(install_dir).await?;
    }
    if !config.options.server_properties.is_empty() {
        progress.report("Writing server.properties...", 60);
        files::write_server_properties(install_dir, &config.options.server_properties).await?;
    }
    progress.report("Installation complete", 100);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use serde_json::json;
    use zip::write::SimpleFileOptions;

    use super::*;
    use crate::core::http::testing::{no_backoff, FakeTransport};
    use crate::core::java::runtime::{java_exe, RUNTIME_DIR_NAME};
    use crate::core::launch::testing::ScriptedRunner;
    use crate::core::progress::{ChannelSink, InstallerEvent, NullSink};
    use crate::core::server::files::ScriptKind;
    use crate::core::server::model::{InstallOptions, ServerFlavor, ServerProperties};
    use crate::core::version::manifest::VERSION_MANIFEST_URL;
    use crate::core::version::vendors::{FORGE_PROMOTIONS_URL, PAPER_API_BASE};

    const RUNTIME_TEMPLATE: &str = "https://runtime.test/jre-{major}.zip";
    const PAPER_JAR_URL: &str = "https://api.papermc.io/v2/projects/paper/versions/1.20.4/builds/499/downloads/paper-1.20.4-499.jar";
    const FORGE_INSTALLER_URL: &str = "https://maven.minecraftforge.net/net/minecraftforge/forge/1.20.1-47.2.0/forge-1.20.1-47.2.0-installer.jar";
    const ARGS_DIR: &str = "libraries/net/minecraftforge/forge/1.20.1-47.2.0";

    struct Harness {
        installer: ServerInstaller,
        transport: Arc<FakeTransport>,
        runner: Arc<ScriptedRunner>,
        root: tempfile::TempDir,
    }

    impl Harness {
        fn new(transport: FakeTransport, runner: ScriptedRunner) -> Self {
            let root = tempfile::tempdir().unwrap();
            let transport = Arc::new(transport);
            let runner = Arc::new(runner);
            let downloader = Arc::new(Downloader::new(
                transport.clone(),
                root.path().join("work"),
            ));
            let installer = ServerInstaller::new(
                Arc::new(VersionCatalog::new(transport.clone(), no_backoff())),
                downloader.clone(),
                Arc::new(RuntimeProvisioner::new(downloader, RUNTIME_TEMPLATE)),
                runner.clone(),
            );
            Self {
                installer,
                transport,
                runner,
                root,
            }
        }

        fn config(&self, flavor: ServerFlavor, version: &str, options: InstallOptions) -> InstallConfig {
            InstallConfig {
                flavor,
                version: version.to_string(),
                install_path: self.root.path().join("server"),
                options,
            }
        }

        fn install_dir(&self) -> PathBuf {
            self.root.path().join("server")
        }
    }

    fn runtime_zip() -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        zip.start_file(format!("jdk-17/bin/{}", java_exe()), SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"#!/bin/sh\n").unwrap();
        zip.finish().unwrap().into_inner()
    }

    fn paper_transport() -> FakeTransport {
        FakeTransport::new()
            .with_json(
                &format!("{PAPER_API_BASE}/versions/1.20.4"),
                json!({"builds": [496, 497, 499]}),
            )
            .with_bytes(PAPER_JAR_URL, b"paper-server-jar".to_vec())
    }

    #[tokio::test]
    async fn paper_install_writes_jar_eula_and_script() {
        let harness = Harness::new(paper_transport(), ScriptedRunner::exiting(0));
        let config = harness.config(
            ServerFlavor::Paper,
            "1.20.4",
            InstallOptions {
                accept_eula: true,
                create_start_script: true,
                ..InstallOptions::default()
            },
        );

        let result = harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap();

        let dir = harness.install_dir();
        assert_eq!(result.install_path, dir);
        assert_eq!(result.jar, dir.join("server.jar"));
        assert_eq!(std::fs::read(dir.join("server.jar")).unwrap(), b"paper-server-jar");
        assert_eq!(
            std::fs::read_to_string(dir.join("eula.txt")).unwrap(),
            "eula=true\n"
        );

        let script_path = result.start_script.unwrap();
        assert_eq!(
            script_path,
            dir.join(ScriptKind::native().file_name())
        );
        let script = std::fs::read_to_string(script_path).unwrap();
        assert!(script.contains("-Xms4096M -Xmx4096M -jar server.jar nogui"));
        assert!(!dir.join("server.properties").exists());
        assert!(harness.runner.invocations().is_empty());
    }

    #[tokio::test]
    async fn unknown_vanilla_version_fails_before_writing_anything() {
        let harness = Harness::new(
            FakeTransport::new().with_json(
                VERSION_MANIFEST_URL,
                json!({"versions": [
                    {"id": "1.20.4", "type": "release", "url": "https://meta.test/1.20.4.json"}
                ]}),
            ),
            ScriptedRunner::exiting(0),
        );
        let config = harness.config(
            ServerFlavor::Vanilla,
            "9.9.9",
            InstallOptions {
                accept_eula: true,
                ..InstallOptions::default()
            },
        );

        let err = harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(InstallPhase::ResolveArtifact));
        assert!(matches!(
            err.root_cause(),
            LauncherError::VersionNotFound { .. }
        ));
        assert!(err
            .to_string()
            .starts_with("Installation failed while resolving the server download"));
        assert!(!harness.install_dir().join("server.jar").exists());
        assert!(!harness.install_dir().join("eula.txt").exists());
    }

    #[tokio::test]
    async fn forge_install_runs_installer_with_provisioned_java() {
        let runner = ScriptedRunner::exiting(0)
            .stdout("Downloading libraries")
            .stdout("Processor: net.minecraftforge:binarypatcher")
            .creates(
                "run.bat",
                &format!("@echo off\r\njava @user_jvm_args.txt @{ARGS_DIR}/win_args.txt %*\r\n"),
            )
            .creates(
                "run.sh",
                &format!("#!/usr/bin/env sh\njava @user_jvm_args.txt @{ARGS_DIR}/unix_args.txt \"$@\"\n"),
            )
            .creates(&format!("{ARGS_DIR}/win_args.txt"), "-p x")
            .creates(&format!("{ARGS_DIR}/unix_args.txt"), "-p x");
        let transport = FakeTransport::new()
            .with_json(
                FORGE_PROMOTIONS_URL,
                json!({"promos": {"1.20.1-recommended": "47.2.0", "1.20.1-latest": "47.2.20"}}),
            )
            .with_bytes(FORGE_INSTALLER_URL, b"forge-installer".to_vec())
            .with_bytes("https://runtime.test/jre-17.zip", runtime_zip());
        let harness = Harness::new(transport, runner);
        let config = harness.config(
            ServerFlavor::Forge,
            "1.20.1",
            InstallOptions {
                auto_provision_java: true,
                ..InstallOptions::default()
            },
        );

        let result = harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap();

        let dir = harness.install_dir();
        let java = dir
            .join(RUNTIME_DIR_NAME)
            .join("jdk-17")
            .join("bin")
            .join(java_exe());
        assert_eq!(result.java.as_deref(), Some(java.as_path()));

        let invocation = &harness.runner.invocations()[0];
        assert_eq!(invocation.java, java);
        assert_eq!(invocation.jar, dir.join("forge-installer.jar"));
        assert_eq!(invocation.args, vec!["--installServer"]);

        let native_args = match ScriptKind::native() {
            ScriptKind::Batch => "win_args.txt",
            ScriptKind::Shell => "unix_args.txt",
        };
        let relative_java = Path::new(RUNTIME_DIR_NAME)
            .join("jdk-17")
            .join("bin")
            .join(java_exe());
        let script = std::fs::read_to_string(result.start_script.unwrap()).unwrap();
        assert!(script.contains(&format!(
            "\"{}\" @user_jvm_args.txt @{ARGS_DIR}/{native_args} nogui",
            relative_java.display()
        )));
        assert!(std::fs::read_to_string(dir.join("user_jvm_args.txt"))
            .unwrap()
            .contains("-Xmx4096M"));
        for leftover in ["forge-installer.jar", "run.bat", "run.sh"] {
            assert!(!dir.join(leftover).exists(), "{leftover} left behind");
        }
        assert_eq!(harness.transport.hits("https://runtime.test/jre-17.zip"), 1);
    }

    #[tokio::test]
    async fn properties_are_written_in_caller_order() {
        let harness = Harness::new(paper_transport(), ScriptedRunner::exiting(0));
        let properties: ServerProperties =
            [("motd", "My Server"), ("max-players", "5"), ("difficulty", "hard")]
                .into_iter()
                .collect();
        let config = harness.config(
            ServerFlavor::Paper,
            "1.20.4",
            InstallOptions {
                server_properties: properties,
                ..InstallOptions::default()
            },
        );

        harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(harness.install_dir().join("server.properties")).unwrap(),
            "motd=My Server\nmax-players=5\ndifficulty=hard\n"
        );
    }

    fn vanilla_transport(jar: &[u8], sha1: &str) -> FakeTransport {
        FakeTransport::new()
            .with_json(
                VERSION_MANIFEST_URL,
                json!({"versions": [
                    {"id": "1.20.4", "type": "release", "url": "https://meta.test/1.20.4.json"}
                ]}),
            )
            .with_json(
                "https://meta.test/1.20.4.json",
                json!({"downloads": {"server": {
                    "url": "https://piston-data.test/server.jar",
                    "sha1": sha1
                }}}),
            )
            .with_bytes("https://piston-data.test/server.jar", jar.to_vec())
    }

    #[tokio::test]
    async fn vanilla_jar_is_checked_against_manifest_sha1() {
        use sha1::{Digest, Sha1};

        let jar = b"vanilla-server-jar";
        let good = hex::encode(Sha1::digest(jar));
        let harness = Harness::new(vanilla_transport(jar, &good), ScriptedRunner::exiting(0));
        let config = harness.config(ServerFlavor::Vanilla, "1.20.4", InstallOptions::default());
        let result = harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap();
        assert_eq!(std::fs::read(result.jar).unwrap(), jar);

        let harness = Harness::new(
            vanilla_transport(jar, "0000000000000000000000000000000000000000"),
            ScriptedRunner::exiting(0),
        );
        let config = harness.config(ServerFlavor::Vanilla, "1.20.4", InstallOptions::default());
        let err = harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap_err();
        assert_eq!(err.phase(), Some(InstallPhase::DownloadArtifact));
        assert!(matches!(
            err.root_cause(),
            LauncherError::Sha1Mismatch { actual, .. } if *actual == good
        ));
        assert!(!harness.install_dir().join("server.jar").exists());
    }

    #[tokio::test]
    async fn download_failure_is_wrapped_and_not_rolled_back() {
        let harness = Harness::new(
            FakeTransport::new()
                .with_json(
                    &format!("{PAPER_API_BASE}/versions/1.20.4"),
                    json!({"builds": [499]}),
                )
                .with_status(PAPER_JAR_URL, 502),
            ScriptedRunner::exiting(0),
        );
        let config = harness.config(ServerFlavor::Paper, "1.20.4", InstallOptions::default());

        let err = harness
            .installer
            .install(&config, Arc::new(NullSink))
            .await
            .unwrap_err();

        assert_eq!(err.phase(), Some(InstallPhase::DownloadArtifact));
        assert!(matches!(
            err.root_cause(),
            LauncherError::DownloadFailed { status: 502, .. }
        ));
        assert!(harness.install_dir().is_dir());
        assert!(!harness.install_dir().join("server.jar").exists());
    }

    #[tokio::test]
    async fn progress_is_monotonic_within_each_phase() {
        let harness = Harness::new(paper_transport(), ScriptedRunner::exiting(0));
        let config = harness.config(
            ServerFlavor::Paper,
            "1.20.4",
            InstallOptions {
                accept_eula: true,
                create_start_script: true,
                ..InstallOptions::default()
            },
        );
        let (sink, mut rx) = ChannelSink::new();

        harness
            .installer
            .install(&config, Arc::new(sink))
            .await
            .unwrap();

        let mut last: Option<(InstallPhase, u8)> = None;
        let mut phases = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let InstallerEvent::Install(p) = event {
                if let Some((phase, percent)) = last {
                    if phase == p.phase {
                        assert!(p.percent >= percent, "{:?} went backwards", p.phase);
                    }
                }
                if phases.last() != Some(&p.phase) {
                    phases.push(p.phase);
                }
                last = Some((p.phase, p.percent));
            }
        }
        assert_eq!(
            phases,
            vec![
                InstallPhase::PrepareDirectory,
                InstallPhase::ResolveArtifact,
                InstallPhase::DownloadArtifact,
                InstallPhase::Finalize,
                InstallPhase::WriteServerFiles,
            ]
        );
    }
}
