// ─── Server Files ───
// Files written into the install directory next to the server artifact.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};

use super::model::ServerProperties;

pub const EULA_FILE: &str = "eula.txt";
pub const PROPERTIES_FILE: &str = "server.properties";
pub const USER_JVM_ARGS_FILE: &str = "user_jvm_args.txt";

async fn write_file(path: PathBuf, contents: String) -> LauncherResult<PathBuf> {
    tokio::fs::write(&path, contents)
        .await
        .map_err(|e| LauncherError::io(&path, e))?;
    debug!("Wrote {:?}", path);
    Ok(path)
}

pub async fn write_eula(dir: &Path) -> LauncherResult<PathBuf> {
    write_file(dir.join(EULA_FILE), "eula=true\n".to_string()).await
}

/// Writes the entries verbatim, in order, one `key=value` per line.
pub async fn write_server_properties(
    dir: &Path,
    properties: &ServerProperties,
) -> LauncherResult<PathBuf> {
    write_file(dir.join(PROPERTIES_FILE), properties.render()).await
}

/// Memory bounds for launches that go through `@user_jvm_args.txt`.
pub async fn write_user_jvm_args(dir: &Path, memory_mb: u32) -> LauncherResult<PathBuf> {
    let contents = format!(
        "# JVM arguments for the server, one per line.\n-Xms{memory_mb}M\n-Xmx{memory_mb}M\n"
    );
    write_file(dir.join(USER_JVM_ARGS_FILE), contents).await
}

// ── Start scripts ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptKind {
    Batch,
    Shell,
}

impl ScriptKind {
    pub fn native() -> Self {
        if cfg!(windows) {
            ScriptKind::Batch
        } else {
            ScriptKind::Shell
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            ScriptKind::Batch => "start.bat",
            ScriptKind::Shell => "start.sh",
        }
    }
}

/// What the start script hands to java.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchTarget {
    /// `-Xms/-Xmx -jar <jar>`, jar relative to the install directory.
    Jar(String),
    /// `@user_jvm_args.txt @<args file>`, as generated by modern Forge.
    ArgsFile(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartScript {
    pub kind: ScriptKind,
    pub java: String,
    pub memory_mb: u32,
    pub gui: bool,
    pub target: LaunchTarget,
}

impl StartScript {
    pub fn render(&self) -> String {
        let mut command = format!("\"{}\"", self.java);
        match &self.target {
            LaunchTarget::Jar(jar) => {
                command.push_str(&format!(
                    " -Xms{m}M -Xmx{m}M -jar {jar}",
                    m = self.memory_mb
                ));
            }
            LaunchTarget::ArgsFile(args_file) => {
                command.push_str(&format!(" @{USER_JVM_ARGS_FILE} @{args_file}"));
            }
        }
        if !self.gui {
            command.push_str(" nogui");
        }

        match self.kind {
            ScriptKind::Batch => format!("@echo off\r\ncd /d \"%~dp0\"\r\n{command}\r\npause\r\n"),
            ScriptKind::Shell => {
                format!("#!/usr/bin/env sh\ncd \"$(dirname \"$0\")\"\nexec {command} \"$@\"\n")
            }
        }
    }
}

/// Java path as the start script should spell it: relative when it lives
/// inside the install directory, `java` from `PATH` when none was provisioned.
pub fn script_java_path(install_dir: &Path, java: Option<&Path>) -> String {
    match java {
        Some(java) => match java.strip_prefix(install_dir) {
            Ok(relative) => relative.display().to_string(),
            Err(_) => java.display().to_string(),
        },
        None => "java".to_string(),
    }
}

pub async fn write_start_script(dir: &Path, script: &StartScript) -> LauncherResult<PathBuf> {
    let path = write_file(dir.join(script.kind.file_name()), script.render()).await?;

    #[cfg(unix)]
    if script.kind == ScriptKind::Shell {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .await
            .map_err(|e| LauncherError::io(&path, e))?;
    }

    Ok(path)
}
