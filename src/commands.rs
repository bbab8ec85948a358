// ─── Commands ───
// Command-line surface over the installer core. Each subcommand maps to one
// core operation; progress is drained from a channel sink into a bar.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::{
    detect_system_java, inspect_java_binary, required_java_for_minecraft_version, JavaInstallation,
};
use crate::core::loaders::{FlavorInstaller, ResolveContext};
use crate::core::progress::{ChannelSink, DownloadEvent, InstallerEvent};
use crate::core::server::{InstallConfig, InstallReport, ServerFlavor, ServerProperties};
use crate::core::state::{AppState, InstallerSettings};
use crate::core::version::{Lookup, VersionDetail};

#[derive(Debug, Parser)]
#[command(
    name = "server-installer",
    version,
    about = "Installs Minecraft servers (Vanilla, Paper, Purpur, Fabric, Forge, NeoForge)"
)]
pub struct Cli {
    /// Settings file. Defaults to the user config directory.
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the game versions a flavor supports, newest first.
    Versions {
        flavor: ServerFlavor,
        /// Print the built-in list when the catalog is unreachable.
        #[arg(long)]
        fallback: bool,
        #[arg(long)]
        json: bool,
    },
    /// List builds (or loader versions) for a game version, newest first.
    Builds {
        flavor: ServerFlavor,
        version: String,
        #[arg(long)]
        json: bool,
    },
    /// Print the download URL an install would use.
    Resolve {
        flavor: ServerFlavor,
        version: String,
    },
    /// Java major version a game version needs.
    JavaRequirement { version: String },
    /// Probe a Java binary, or look for one on JAVA_HOME / PATH.
    CheckJava { path: Option<PathBuf> },
    /// Install a server.
    Install(InstallArgs),
}

#[derive(Debug, Args)]
struct InstallArgs {
    /// JSON install config; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long)]
    flavor: Option<ServerFlavor>,
    #[arg(long)]
    version: Option<String>,
    #[arg(long, value_name = "DIR")]
    path: Option<PathBuf>,
    #[arg(long)]
    accept_eula: bool,
    #[arg(long)]
    start_script: bool,
    /// Heap size in MB, used for both -Xms and -Xmx.
    #[arg(long, value_name = "MB")]
    memory: Option<u32>,
    #[arg(long)]
    gui: bool,
    /// Download a private Java runtime into the install directory.
    #[arg(long)]
    provision_java: bool,
    /// `server.properties` entry, repeatable.
    #[arg(long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    properties: Vec<(String, String)>,
    /// Print the result as JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

impl InstallArgs {
    fn into_config(self) -> LauncherResult<(InstallConfig, bool)> {
        let base = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| LauncherError::io(path, e))?;
                Some(serde_json::from_str::<InstallConfig>(&raw)?)
            }
            None => None,
        };

        let flavor = self
            .flavor
            .or(base.as_ref().map(|c| c.flavor))
            .ok_or_else(|| missing("--flavor"))?;
        let version = self
            .version
            .or_else(|| base.as_ref().map(|c| c.version.clone()))
            .ok_or_else(|| missing("--version"))?;
        let install_path = self
            .path
            .or_else(|| base.as_ref().map(|c| c.install_path.clone()))
            .ok_or_else(|| missing("--path"))?;

        let mut options = base.map(|c| c.options).unwrap_or_default();
        options.accept_eula |= self.accept_eula;
        options.create_start_script |= self.start_script;
        options.gui |= self.gui;
        options.auto_provision_java |= self.provision_java;
        if let Some(memory) = self.memory {
            options.memory_mb = memory;
        }
        if !self.properties.is_empty() {
            let mut merged = ServerProperties::new();
            for (key, value) in options.server_properties.iter() {
                if !self.properties.iter().any(|(k, _)| k == key) {
                    merged.push(key, value);
                }
            }
            for (key, value) in self.properties {
                merged.push(key, value);
            }
            options.server_properties = merged;
        }

        Ok((
            InstallConfig {
                flavor,
                version,
                install_path,
                options,
            },
            self.json,
        ))
    }
}

fn missing(flag: &str) -> LauncherError {
    LauncherError::Other(format!("{flag} is required when no --config provides it"))
}

/// Runs one parsed command. Returns whether it succeeded.
pub async fn execute(cli: Cli) -> LauncherResult<bool> {
    let settings_path = cli
        .settings
        .clone()
        .unwrap_or_else(InstallerSettings::default_path);
    let settings = InstallerSettings::load(&settings_path);
    debug!("Using settings {:?}", settings);

    match cli.command {
        Command::JavaRequirement { version } => {
            println!("{}", required_java_for_minecraft_version(&version));
            Ok(true)
        }
        Command::CheckJava { path } => Ok(check_java(path).await),
        command => {
            let state = AppState::from_settings(settings)?;
            let outcome = run_networked(&state, command).await;
            state.shutdown().await;
            outcome
        }
    }
}

async fn run_networked(state: &AppState, command: Command) -> LauncherResult<bool> {
    match command {
        Command::Versions {
            flavor,
            fallback: true,
            json,
        } => {
            let versions = state.catalog.versions_or_fallback(flavor).await;
            if json {
                print_json(&versions)?;
            } else {
                versions.iter().for_each(|v| println!("{v}"));
            }
            Ok(true)
        }
        Command::Versions { flavor, json, .. } => match state.catalog.list_versions(flavor).await {
            Lookup::Available(versions) => {
                if json {
                    print_json(&versions)?;
                } else {
                    for version in &versions {
                        println!("{}{}", version.id, describe_detail(&version.detail));
                    }
                }
                Ok(true)
            }
            Lookup::Unavailable { reason } => Err(LauncherError::CatalogUnavailable {
                flavor: flavor.to_string(),
                reason: format!("{reason} (pass --fallback for the built-in version list)"),
            }),
        },
        Command::Builds {
            flavor,
            version,
            json,
        } => {
            let builds = state
                .catalog
                .list_builds(flavor, &version)
                .await
                .into_result()
                .map_err(|reason| LauncherError::CatalogUnavailable {
                    flavor: flavor.to_string(),
                    reason,
                })?;
            if json {
                print_json(&builds)?;
            } else if builds.is_empty() {
                println!("{flavor} {version} has no separate builds");
            } else {
                builds.iter().for_each(|b| println!("{b}"));
            }
            Ok(true)
        }
        Command::Resolve { flavor, version } => {
            let handler = FlavorInstaller::new(flavor, &state.settings.fabric_installer_version);
            let artifact = handler
                .resolve(&ResolveContext {
                    version: &version,
                    catalog: &state.catalog,
                })
                .await?;
            match artifact.build {
                Some(build) => println!("{} (build {build})", artifact.url),
                None => println!("{}", artifact.url),
            }
            Ok(true)
        }
        Command::Install(args) => {
            let (config, json) = args.into_config()?;
            install(state, config, json).await
        }
        Command::JavaRequirement { .. } | Command::CheckJava { .. } => Ok(true),
    }
}

async fn install(state: &AppState, config: InstallConfig, json: bool) -> LauncherResult<bool> {
    if !config.options.auto_provision_java {
        warn_if_system_java_too_old(&config.version).await;
    }

    let (sink, events) = ChannelSink::new();
    let bar = if json {
        ProgressBar::hidden()
    } else {
        progress_bar()
    };
    let drain = drain_events(events, bar.clone());

    let result = state.installer.install(&config, Arc::new(sink)).await;
    // every sender is gone once install returns, so the drain finishes
    let _ = drain.await;
    bar.finish_and_clear();

    let success = result.is_ok();
    if json {
        print_json(&InstallReport::from(result))?;
        return Ok(success);
    }

    let installed = result?;
    println!(
        "Installed {} {} into {}",
        config.flavor,
        config.version,
        installed.install_path.display()
    );
    println!("  launch file: {}", installed.jar.display());
    if let Some(java) = &installed.java {
        println!("  java:        {}", java.display());
    }
    if let Some(script) = &installed.start_script {
        println!("  start with:  {}", script.display());
    }
    if !config.options.accept_eula {
        println!("  the EULA was not accepted; edit eula.txt before the first start");
    }
    Ok(true)
}

/// Minimum Java the currently supported game versions run on.
const MIN_SYSTEM_JAVA: u32 = 17;

/// Best-effort probe. A missing system Java is only a warning; an explicit
/// path that is not a Java binary fails.
async fn check_java(path: Option<PathBuf>) -> bool {
    let explicit = path.is_some();
    let found: Option<JavaInstallation> = match &path {
        Some(path) => inspect_java_binary(path).await,
        None => detect_system_java().await,
    };
    match found {
        Some(java) => {
            println!(
                "{} {} (major {}, {}, {})",
                java.path.display(),
                java.version,
                java.major,
                java.vendor,
                if java.is_64bit { "64-bit" } else { "32-bit" }
            );
            if java.major < MIN_SYSTEM_JAVA {
                warn!(
                    "Java {} is older than {}; use --provision-java when installing",
                    java.major, MIN_SYSTEM_JAVA
                );
            }
            true
        }
        None if explicit => {
            if let Some(path) = path {
                println!("{} is not a usable Java binary", path.display());
            }
            false
        }
        None => {
            warn!("No Java found on JAVA_HOME or PATH; use --provision-java when installing");
            true
        }
    }
}

/// Soft pre-install check when the server will run on the system Java.
async fn warn_if_system_java_too_old(version: &str) {
    let required = required_java_for_minecraft_version(version);
    match detect_system_java().await {
        Some(java) if java.major >= required => {
            debug!("System Java {} satisfies Java {}", java.major, required);
        }
        Some(java) => warn!(
            "System Java {} is older than the Java {} {} needs",
            java.major, required, version
        ),
        None => warn!(
            "No system Java found; {} needs Java {} to run",
            version, required
        ),
    }
}

fn describe_detail(detail: &VersionDetail) -> String {
    match detail {
        VersionDetail::Manifest { .. } | VersionDetail::Project | VersionDetail::Fabric => {
            String::new()
        }
        VersionDetail::Forge {
            promotion_recommended,
            promotion_latest,
        } => match (promotion_recommended, promotion_latest) {
            (Some(rec), _) => format!("  recommended {rec}"),
            (None, Some(latest)) => format!("  latest {latest}"),
            (None, None) => String::new(),
        },
        VersionDetail::NeoForge { newest_build } => format!("  newest {newest_build}"),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> LauncherResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ── Progress display ────────────────────────────────────

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn drain_events(mut events: UnboundedReceiver<InstallerEvent>, bar: ProgressBar) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                InstallerEvent::Install(progress) => {
                    bar.set_position(u64::from(progress.percent));
                    bar.set_message(format!("{}: {}", progress.phase, progress.message));
                }
                InstallerEvent::Download(DownloadEvent::Error { filename, reason, .. }) => {
                    bar.println(format!("download of {filename} failed: {reason}"));
                }
                InstallerEvent::Download(event) => {
                    debug!("download event: {:?}", event);
                }
            }
        }
    })
}
