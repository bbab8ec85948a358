// ─── Jar Runner ───
// Runs `java -jar <jar> <args>` as a supervised child process and streams
// its output back line by line.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// What to run and where.
#[derive(Debug, Clone)]
pub struct JarInvocation {
    pub java: PathBuf,
    pub jar: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

#[async_trait]
pub trait JarRunner: Send + Sync {
    /// Runs the jar to completion, calling `on_line` for every output line.
    /// Returns the exit code (`None` when killed by a signal).
    async fn run_jar(
        &self,
        invocation: &JarInvocation,
        on_line: &(dyn Fn(OutputLine) + Send + Sync),
    ) -> LauncherResult<Option<i32>>;
}

/// `JarRunner` backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JavaProcessRunner;

#[async_trait]
impl JarRunner for JavaProcessRunner {
    async fn run_jar(
        &self,
        invocation: &JarInvocation,
        on_line: &(dyn Fn(OutputLine) + Send + Sync),
    ) -> LauncherResult<Option<i32>> {
        let mut cmd = Command::new(&invocation.java);
        cmd.arg("-jar")
            .arg(&invocation.jar)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        configure_platform_spawn(&mut cmd);

        debug!("Command (copy/paste): {}", format_command_for_logs(invocation));
        let mut child = cmd.spawn().map_err(|e| {
            LauncherError::JavaExecution(format!(
                "failed to start {}: {}",
                invocation.java.display(),
                e
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LauncherError::JavaExecution("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| LauncherError::JavaExecution("stderr not captured".into()))?;
        // Raw byte lines: installers print paths in the platform code page,
        // and a pipe that stops being drained blocks the child forever.
        let mut out = BufReader::new(stdout);
        let mut err = BufReader::new(stderr);
        let (mut out_buf, mut err_buf) = (Vec::new(), Vec::new());
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                read = out.read_until(b'\n', &mut out_buf), if !out_done => {
                    out_done = forward_line(read, &mut out_buf, OutputStream::Stdout, on_line);
                }
                read = err.read_until(b'\n', &mut err_buf), if !err_done => {
                    err_done = forward_line(read, &mut err_buf, OutputStream::Stderr, on_line);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| LauncherError::JavaExecution(format!("failed to wait for child: {e}")))?;
        info!("{} exited with {}", invocation.jar.display(), status);
        Ok(status.code())
    }
}

/// Hands a completed line to `on_line`. Returns true once the pipe is finished.
fn forward_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    stream: OutputStream,
    on_line: &(dyn Fn(OutputLine) + Send + Sync),
) -> bool {
    match read {
        Ok(0) => true,
        Ok(_) => {
            let text = decode_line(buf);
            buf.clear();
            on_line(OutputLine { stream, text });
            false
        }
        Err(e) => {
            debug!("{:?} pipe closed: {}", stream, e);
            true
        }
    }
}

/// Strips the line ending and replaces invalid UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    let _ = cmd;
}

/// Chatter from logging frameworks that installers print to stderr even on
/// success.
pub fn is_benign_log_noise(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.is_empty()
        || trimmed.starts_with("SLF4J:")
        || trimmed.contains("StatusLogger")
        || trimmed.starts_with("log4j:")
        || trimmed.contains("No SLF4J providers were found")
        || trimmed.contains("Defaulting to no-operation")
}

fn format_command_for_logs(invocation: &JarInvocation) -> String {
    let mut parts = vec![
        shell_escape(&invocation.java.to_string_lossy()),
        "-jar".to_string(),
        shell_escape(&invocation.jar.to_string_lossy()),
    ];
    parts.extend(invocation.args.iter().map(|arg| shell_escape(arg)));
    parts.join(" ")
}

fn shell_escape(raw: &str) -> String {
    if raw.is_empty() {
        return "\"\"".to_string();
    }

    if raw.chars().all(|ch| {
        ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '/' | ':' | '\\' | '=')
    }) {
        return raw.to_string();
    }

    format!("\"{}\"", raw.replace('"', "\\\""))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted `JarRunner` for installer tests.

    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedRunner {
        exit_code: Option<i32>,
        lines: Vec<OutputLine>,
        /// Files created relative to the working directory, as an installer would.
        files: Vec<(String, String)>,
        invocations: Mutex<Vec<JarInvocation>>,
    }

    impl ScriptedRunner {
        pub fn exiting(code: i32) -> Self {
            Self {
                exit_code: Some(code),
                ..Self::default()
            }
        }

        pub fn stdout(mut self, text: &str) -> Self {
            self.lines.push(OutputLine {
                stream: OutputStream::Stdout,
                text: text.to_string(),
            });
            self
        }

        pub fn stderr(mut self, text: &str) -> Self {
            self.lines.push(OutputLine {
                stream: OutputStream::Stderr,
                text: text.to_string(),
            });
            self
        }

        pub fn creates(mut self, rel_path: &str, contents: &str) -> Self {
            self.files.push((rel_path.to_string(), contents.to_string()));
            self
        }

        pub fn invocations(&self) -> Vec<JarInvocation> {
            self.invocations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JarRunner for ScriptedRunner {
        async fn run_jar(
            &self,
            invocation: &JarInvocation,
            on_line: &(dyn Fn(OutputLine) + Send + Sync),
        ) -> LauncherResult<Option<i32>> {
            self.invocations.lock().unwrap().push(invocation.clone());
            for (rel_path, contents) in &self.files {
                let path = invocation.working_dir.join(rel_path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(&path, contents).unwrap();
            }
            for line in &self.lines {
                on_line(line.clone());
            }
            Ok(self.exit_code)
        }
    }
}
