use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::downloader::{DownloadRequest, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::progress::{scaled_percent, ProgressReporter};
use crate::core::version::GameVersion;

pub const DEFAULT_RUNTIME_URL_TEMPLATE: &str =
    "https://api.adoptium.net/v3/binary/latest/{major}/ga/{os}/{arch}/jre/hotspot/normal/eclipse";

/// Hidden directory under the install path holding the provisioned runtime.
pub const RUNTIME_DIR_NAME: &str = ".runtime";
const RUNTIME_RECORD_FILE: &str = "runtime.json";
const RUNTIME_ARCHIVE_NAME: &str = "java-runtime.archive";

/// Download share of the provisioning progress; extraction starts at this mark.
const DOWNLOAD_CEILING: u8 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JavaInstallation {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
    pub vendor: String,
}

/// Marker persisted next to a provisioned runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeRecord {
    pub java_major: u32,
    pub installed_at: String,
    pub source_url: String,
    /// Java executable, relative to the runtime directory.
    pub java_bin_rel: PathBuf,
}

pub fn runtime_dir(install_path: &Path) -> PathBuf {
    install_path.join(RUNTIME_DIR_NAME)
}

// ── Version mapping ─────────────────────────────────────

/// Java major version a Minecraft version needs.
///
/// `>= 1.20.5` -> 21, `1.17 ..= 1.20.4` -> 17, older -> 8. Weekly snapshots
/// map by year (24wXXa and later -> 21). Classic, indev, infdev, alpha and
/// beta ids get 8. Other unparseable ids get 17.
pub fn required_java_for_minecraft_version(minecraft_version: &str) -> u32 {
    if is_pre_release_era(minecraft_version) {
        return 8;
    }
    if let Some(year) = GameVersion::snapshot_year(minecraft_version) {
        return if year >= 24 { 21 } else { 17 };
    }

    match GameVersion::parse(minecraft_version) {
        Some(v) if v.major > 1 || v >= GameVersion::new(1, 20, 5) => 21,
        Some(v) if v >= GameVersion::new(1, 17, 0) => 17,
        Some(_) => 8,
        None => 17,
    }
}

/// `rd-132211`, `c0.30_01c`, `in-20100223`, `inf-20100618`, `a1.2.6`, `b1.7.3`
fn is_pre_release_era(id: &str) -> bool {
    if ["rd-", "in-", "inf-"].iter().any(|prefix| id.starts_with(prefix)) {
        return true;
    }
    let mut chars = id.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('a' | 'b' | 'c'), Some(d)) if d.is_ascii_digit()
    )
}

// ── Provisioner ─────────────────────────────────────────

/// Provisions a private JRE per install directory.
pub struct RuntimeProvisioner {
    downloader: Arc<Downloader>,
    url_template: String,
}

impl RuntimeProvisioner {
    pub fn new(downloader: Arc<Downloader>, url_template: impl Into<String>) -> Self {
        Self {
            downloader,
            url_template: url_template.into(),
        }
    }

    /// Archive URL for `major` on the current platform.
    pub fn runtime_url(&self, major: u32) -> String {
        self.url_template
            .replace("{major}", &major.to_string())
            .replace("{os}", platform::platform_os())
            .replace("{arch}", &platform::platform_arch())
    }

    pub async fn read_record(&self, install_path: &Path) -> Option<RuntimeRecord> {
        let path = runtime_dir(install_path).join(RUNTIME_RECORD_FILE);
        let raw = tokio::fs::read_to_string(&path).await.ok()?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!("Ignoring unreadable runtime record {:?}: {}", path, err);
                None
            }
        }
    }

    /// Java executable of a cached runtime matching `major`, if any.
    pub async fn cached_java(&self, install_path: &Path, major: u32) -> Option<PathBuf> {
        let record = self.read_record(install_path).await?;
        if record.java_major != major {
            debug!(
                "Cached runtime is Java {}, Java {} required",
                record.java_major, major
            );
            return None;
        }
        let java = runtime_dir(install_path).join(&record.java_bin_rel);
        is_file(&java).await.then_some(java)
    }

    /// Returns a java executable for `major`, downloading and unpacking a
    /// runtime into `<install_path>/.runtime` unless a matching one is cached.
    #[instrument(skip(self, progress))]
    pub async fn ensure_runtime(
        &self,
        install_path: &Path,
        major: u32,
        progress: &ProgressReporter,
    ) -> LauncherResult<PathBuf> {
        if let Some(java) = self.cached_java(install_path, major).await {
            info!("Java {} runtime cache hit: {:?}", major, java);
            progress.report(
                format!("Java {major} runtime already present, skipping download"),
                100,
            );
            return Ok(java);
        }

        let root = runtime_dir(install_path);
        if tokio::fs::try_exists(&root).await.unwrap_or(false) {
            info!("Removing stale runtime at {:?}", root);
            tokio::fs::remove_dir_all(&root)
                .await
                .map_err(|e| LauncherError::io(&root, e))?;
        }
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| LauncherError::io(&root, e))?;

        let url = self.runtime_url(major);
        info!("Downloading Java {} runtime from {}", major, url);
        progress.report(format!("Downloading Java {major} runtime..."), 0);

        let archive = self
            .downloader
            .download_observed(
                DownloadRequest::new(&url, RUNTIME_ARCHIVE_NAME),
                progress.sink(),
                &|done, total| {
                    let percent = scaled_percent(done, total, DOWNLOAD_CEILING);
                    progress.report(format!("Downloading Java runtime... {percent}%"), percent);
                },
            )
            .await?;

        progress.report("Extracting Java runtime...", DOWNLOAD_CEILING);
        let archive_path = archive.path().to_path_buf();
        let target = root.clone();
        tokio::task::spawn_blocking(move || extract::unpack_archive(&archive_path, &target))
            .await
            .map_err(|e| LauncherError::Other(format!("runtime extraction task failed: {e}")))??;
        // archive is deleted with its scoped directory
        drop(archive);

        let java = locate_java_binary(&root)
            .await
            .ok_or_else(|| LauncherError::JavaNotFound(root.clone()))?;
        make_executable(&java).await?;

        let record = RuntimeRecord {
            java_major: major,
            installed_at: Utc::now().to_rfc3339(),
            source_url: url,
            java_bin_rel: java.strip_prefix(&root).unwrap_or(&java).to_path_buf(),
        };
        write_record(&root, &record).await?;

        info!("Java {} runtime ready: {:?}", major, java);
        progress.report(format!("Java {major} runtime ready"), 100);
        Ok(java)
    }
}

async fn write_record(root: &Path, record: &RuntimeRecord) -> LauncherResult<()> {
    let path = root.join(RUNTIME_RECORD_FILE);
    let payload = serde_json::to_string_pretty(record)?;
    tokio::fs::write(&path, payload)
        .await
        .map_err(|e| LauncherError::io(&path, e))
}

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// `bin/java` directly under `root`, else under one nested root folder.
async fn locate_java_binary(root: &Path) -> Option<PathBuf> {
    let direct = root.join("bin").join(java_exe());
    if is_file(&direct).await {
        return Some(direct);
    }

    let mut entries = tokio::fs::read_dir(root).await.ok()?;
    let mut nested = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            nested.push(entry.path());
        }
    }
    nested.sort();

    for dir in nested {
        let candidate = dir.join("bin").join(java_exe());
        if is_file(&candidate).await {
            return Some(candidate);
        }
    }
    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn make_executable(java: &Path) -> LauncherResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(java, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| LauncherError::io(java, e))?;
    }
    #[cfg(not(unix))]
    let _ = java;
    Ok(())
}

// ── System Java detection ───────────────────────────────

pub async fn inspect_java_binary(path: &Path) -> Option<JavaInstallation> {
    probe::probe_java(path).await
}

/// Java from `JAVA_HOME`, then whatever `java` resolves to on `PATH`.
pub async fn detect_system_java() -> Option<JavaInstallation> {
    if let Some(home) = std::env::var_os("JAVA_HOME") {
        let path = PathBuf::from(home).join("bin").join(java_exe());
        if is_file(&path).await {
            if let Some(java) = probe::probe_java(&path).await {
                return Some(java);
            }
        }
    }
    probe::probe_java(Path::new("java")).await
}

fn parse_major_version(version: &str) -> u32 {
    let first_part = version.split('.').next().unwrap_or("0");
    let major: u32 = first_part.parse().unwrap_or(0);

    // legacy "1.8.0_392" numbering
    if major == 1 {
        version
            .split('.')
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(major)
    } else {
        major
    }
}

mod platform {
    /// Architecture name as used in Adoptium URLs.
    pub fn platform_arch() -> String {
        match std::env::consts::ARCH {
            "x86_64" => "x64".to_string(),
            "aarch64" => "aarch64".to_string(),
            "x86" => "x86".to_string(),
            other => other.to_string(),
        }
    }

    pub fn platform_os() -> &'static str {
        match std::env::consts::OS {
            "windows" => "windows",
            "macos" => "mac",
            _ => "linux",
        }
    }
}

mod probe {
    use super::*;

    use tokio::process::Command;

    #[instrument]
    pub async fn probe_java(path: &Path) -> Option<JavaInstallation> {
        let output = Command::new(path)
            .args(["-XshowSettings:properties", "-version"])
            .kill_on_drop(true)
            .output()
            .await
            .ok()?;

        parse_output(path, &output.stdout, &output.stderr)
    }

    pub(super) fn parse_output(path: &Path, stdout: &[u8], stderr: &[u8]) -> Option<JavaInstallation> {
        let version_output = format!(
            "{}\n{}",
            String::from_utf8_lossy(stderr),
            String::from_utf8_lossy(stdout)
        );
        debug!(
            "Probing {:?}: {}",
            path,
            version_output.lines().next().unwrap_or("")
        );

        let version_str = parse_version_string(&version_output)?;
        let major = parse_major_version(&version_str);
        let lower_output = version_output.to_ascii_lowercase();
        let is_64bit = lower_output.contains("sun.arch.data.model = 64")
            || lower_output.contains("os.arch = amd64")
            || lower_output.contains("os.arch = x86_64")
            || lower_output.contains("os.arch = aarch64");

        Some(JavaInstallation {
            path: path.to_path_buf(),
            version: version_str,
            major,
            is_64bit,
            vendor: parse_vendor(&version_output),
        })
    }

    fn parse_version_string(output: &str) -> Option<String> {
        output.lines().find_map(|line| {
            let start = line.find('"')?;
            let end = line[start + 1..].find('"')?;
            Some(line[start + 1..start + 1 + end].to_string())
        })
    }

    fn parse_vendor(output: &str) -> String {
        for needle in ["Temurin", "Adoptium", "Zulu", "Microsoft", "OpenJDK"] {
            if output.contains(needle) {
                return needle.to_string();
            }
        }
        "unknown".to_string()
    }
}

mod extract {
    use std::io::Read;

    use super::*;

    /// Unpacks a zip or tar.gz archive into `dest`, keeping its layout.
    pub fn unpack_archive(archive: &Path, dest: &Path) -> LauncherResult<()> {
        let mut magic = [0u8; 4];
        let read = std::fs::File::open(archive)
            .and_then(|mut file| file.read(&mut magic))
            .map_err(|e| LauncherError::io(archive, e))?;

        match &magic[..read] {
            [b'P', b'K', 0x03, 0x04] => unpack_zip(archive, dest),
            [0x1f, 0x8b, ..] => unpack_tar_gz(archive, dest),
            _ => Err(LauncherError::UnknownArchive(archive.to_path_buf())),
        }
    }

    fn unpack_zip(archive: &Path, dest: &Path) -> LauncherResult<()> {
        let file = std::fs::File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
        let mut zip = zip::ZipArchive::new(file)?;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index)?;
            let rel_path = entry
                .enclosed_name()
                .ok_or_else(|| LauncherError::Other("Invalid zip entry path".into()))?;
            let out_path = dest.join(rel_path);

            if entry.is_dir() {
                std::fs::create_dir_all(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
                continue;
            }

            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LauncherError::io(parent, e))?;
            }
            let mut out =
                std::fs::File::create(&out_path).map_err(|e| LauncherError::io(&out_path, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| LauncherError::io(&out_path, e))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode))
                    .map_err(|e| LauncherError::io(&out_path, e))?;
            }
        }

        Ok(())
    }

    fn unpack_tar_gz(archive: &Path, dest: &Path) -> LauncherResult<()> {
        let file = std::fs::File::open(archive).map_err(|e| LauncherError::io(archive, e))?;
        let decoder = flate2::read::GzDecoder::new(file);
        tar::Archive::new(decoder)
            .unpack(dest)
            .map_err(|e| LauncherError::io(dest, e))
    }
}
