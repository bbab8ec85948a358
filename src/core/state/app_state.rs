use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::downloader::{Downloader, DEFAULT_IDLE_TIMEOUT};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::{HttpTransport, ReqwestTransport, RetryPolicy, APP_USER_AGENT};
use crate::core::java::{RuntimeProvisioner, DEFAULT_RUNTIME_URL_TEMPLATE};
use crate::core::launch::{JarRunner, JavaProcessRunner};
use crate::core::loaders::DEFAULT_FABRIC_INSTALLER_VERSION;
use crate::core::server::ServerInstaller;
use crate::core::version::VersionCatalog;

const APP_DIR_NAME: &str = "server-installer";
const SETTINGS_FILE: &str = "installer_settings.json";

/// Tunables read from `installer_settings.json`. Every field is optional on
/// disk; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerSettings {
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub download_concurrency: usize,
    /// A download that receives nothing for this long fails.
    pub download_idle_timeout_secs: u64,
    /// Per-download temp directories are created here.
    pub work_dir: PathBuf,
    /// `{major}`, `{os}` and `{arch}` are substituted.
    pub runtime_url_template: String,
    pub fabric_installer_version: String,
}

impl Default for InstallerSettings {
    fn default() -> Self {
        Self {
            user_agent: APP_USER_AGENT.to_string(),
            retry: RetryPolicy::default(),
            download_concurrency: 4,
            download_idle_timeout_secs: DEFAULT_IDLE_TIMEOUT.as_secs(),
            work_dir: std::env::temp_dir().join("mc-server-installer"),
            runtime_url_template: DEFAULT_RUNTIME_URL_TEMPLATE.to_string(),
            fabric_installer_version: DEFAULT_FABRIC_INSTALLER_VERSION.to_string(),
        }
    }
}

impl InstallerSettings {
    /// `<config dir>/server-installer/installer_settings.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join(SETTINGS_FILE)
    }

    /// Settings at `path`, or the defaults when the file is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        match load_settings_from_disk(path) {
            Some(settings) => {
                debug!("Loaded installer settings from {:?}", path);
                settings
            }
            None => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| LauncherError::io(path, e))
    }
}

fn load_settings_from_disk(path: &Path) -> Option<InstallerSettings> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Ignoring malformed settings file {:?}: {}", path, e);
            None
        }
    }
}

/// The wired-up installer services for one process.
pub struct AppState {
    pub settings: InstallerSettings,
    pub catalog: Arc<VersionCatalog>,
    pub downloader: Arc<Downloader>,
    pub provisioner: Arc<RuntimeProvisioner>,
    pub installer: ServerInstaller,
}

impl AppState {
    pub fn from_settings(settings: InstallerSettings) -> LauncherResult<Self> {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(&settings.user_agent)?);
        Ok(Self::with_transport(
            settings,
            transport,
            Arc::new(JavaProcessRunner),
        ))
    }

    pub fn with_transport(
        settings: InstallerSettings,
        transport: Arc<dyn HttpTransport>,
        runner: Arc<dyn JarRunner>,
    ) -> Self {
        let catalog = Arc::new(VersionCatalog::new(transport.clone(), settings.retry));
        let downloader = Arc::new(
            Downloader::new(transport, settings.work_dir.clone())
                .with_concurrency(settings.download_concurrency)
                .with_idle_timeout(Duration::from_secs(settings.download_idle_timeout_secs)),
        );
        let provisioner = Arc::new(RuntimeProvisioner::new(
            downloader.clone(),
            settings.runtime_url_template.clone(),
        ));
        let installer = ServerInstaller::new(
            catalog.clone(),
            downloader.clone(),
            provisioner.clone(),
            runner,
        )
        .with_fabric_installer_version(settings.fabric_installer_version.clone());

        Self {
            settings,
            catalog,
            downloader,
            provisioner,
            installer,
        }
    }

    /// Sweeps download dirs abandoned by earlier runs.
    pub async fn shutdown(&self) {
        if let Err(e) = self.downloader.cleanup().await {
            warn!("Failed to clean download work dir: {}", e);
        }
    }
}
