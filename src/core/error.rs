use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Step of the installation pipeline that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallPhase {
    PrepareDirectory,
    ProvisionJava,
    ResolveArtifact,
    DownloadArtifact,
    Finalize,
    WriteServerFiles,
}

impl fmt::Display for InstallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstallPhase::PrepareDirectory => "preparing the install directory",
            InstallPhase::ProvisionJava => "provisioning the Java runtime",
            InstallPhase::ResolveArtifact => "resolving the server download",
            InstallPhase::DownloadArtifact => "downloading the server artifact",
            InstallPhase::Finalize => "finalizing the server installation",
            InstallPhase::WriteServerFiles => "writing server configuration files",
        };
        f.write_str(label)
    }
}

/// Central error type for the installer backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("Download {id} was cancelled")]
    Cancelled { id: uuid::Uuid },

    #[error("Download of {url} stalled: no data for {idle_secs}s")]
    Stalled { url: String, idle_secs: u64 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {url}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        url: String,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Resolution ──────────────────────────────────────
    #[error("{flavor} version {version} not found")]
    VersionNotFound { flavor: String, version: String },

    #[error("no {flavor} builds available for {version}")]
    NoBuilds { flavor: String, version: String },

    #[error("{flavor} catalog unavailable: {reason}")]
    CatalogUnavailable { flavor: String, reason: String },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    // ── Java ────────────────────────────────────────────
    #[error("Java executable not found under {0:?}")]
    JavaNotFound(PathBuf),

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Server installer subprocess ─────────────────────
    #[error("server installer exited with code {code:?}{}", format_diagnostics(.diagnostics))]
    InstallerExit {
        code: Option<i32>,
        diagnostics: Vec<String>,
    },

    #[error("launch files not found in {0:?} after running the installer")]
    LaunchFilesNotFound(PathBuf),

    // ── Archive ─────────────────────────────────────────
    #[error("Zip extraction error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Unrecognized archive format: {0:?}")]
    UnknownArchive(PathBuf),

    // ── Pipeline ────────────────────────────────────────
    #[error("Installation failed while {phase}: {source}")]
    Phase {
        phase: InstallPhase,
        source: Box<LauncherError>,
    },

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl LauncherError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LauncherError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wraps `self` with the pipeline phase it failed in.
    pub fn in_phase(self, phase: InstallPhase) -> Self {
        LauncherError::Phase {
            phase,
            source: Box::new(self),
        }
    }

    /// Strips every `Phase` wrapper.
    pub fn root_cause(&self) -> &LauncherError {
        let mut current = self;
        while let LauncherError::Phase { source, .. } = current {
            current = source;
        }
        current
    }

    /// Phase the error was raised in, if it went through the pipeline.
    pub fn phase(&self) -> Option<InstallPhase> {
        match self {
            LauncherError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

fn format_diagnostics(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!("\n{}", lines.join("\n"))
    }
}

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// ── Serialization for IPC / JSON reports ─────────────────
// Front-ends only ever show the message, so the error flattens to a string.
impl serde::Serialize for LauncherError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
