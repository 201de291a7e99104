//! Spawn transport: a child process's stdin/stdout become the stream
//!
//! The child's stderr is inherited so its own error output surfaces the
//! normal way instead of corrupting the framed stream.

use std::path::{Path, PathBuf};
use std::process::Stdio;

#[cfg(unix)]
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

use tokio::process::Command;

use crate::common::{Error, Result};

use super::{ByteChannel, TransportKind};

/// What to launch
#[derive(Debug)]
pub struct SpawnConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment variables for the child
    pub env: Vec<(String, String)>,
    /// Descriptors handed to the child at fixed numbers: (ours, number in child)
    #[cfg(unix)]
    pub pass_fds: Vec<(OwnedFd, RawFd)>,
}

impl SpawnConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            #[cfg(unix)]
            pass_fds: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Make `fd` available to the child as descriptor number `target`
    #[cfg(unix)]
    pub fn pass_fd(mut self, fd: impl Into<OwnedFd>, target: RawFd) -> Self {
        self.pass_fds.push((fd.into(), target));
        self
    }
}

/// Resolve a bare program name through PATH; paths are used as given
fn resolve_program(program: &Path) -> Result<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return Ok(program.to_path_buf());
    }

    which::which(program)
        .map_err(|e| Error::spawn_failed(&program.display().to_string(), e))
}

/// Launch the child and wrap its stdio as a byte channel
pub fn spawn(config: SpawnConfig) -> Result<ByteChannel> {
    let program = resolve_program(&config.program)?;
    let shown = program.display().to_string();

    let mut cmd = Command::new(&program);
    cmd.args(&config.args)
        .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true);

    #[cfg(unix)]
    if !config.pass_fds.is_empty() {
        let mappings: Vec<(RawFd, RawFd)> = config
            .pass_fds
            .iter()
            .map(|(fd, target)| (fd.as_raw_fd(), *target))
            .collect();

        // SAFETY: only async-signal-safe libc calls run between fork and exec
        unsafe {
            cmd.pre_exec(move || {
                for &(source, target) in &mappings {
                    if source == target {
                        let flags = libc::fcntl(source, libc::F_GETFD);
                        if flags < 0
                            || libc::fcntl(source, libc::F_SETFD, flags & !libc::FD_CLOEXEC) < 0
                        {
                            return Err(std::io::Error::last_os_error());
                        }
                    } else if libc::dup2(source, target) < 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }
    }

    let mut child = cmd.spawn().map_err(|e| Error::spawn_failed(&shown, e))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::spawn_failed(&shown, "child stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::spawn_failed(&shown, "child stdout was not piped"))?;

    tracing::debug!(program = %shown, args = ?config.args, pid = ?child.id(), "Spawned child channel");

    // Our copies of passed descriptors close here; the child keeps its own
    drop(config);

    Ok(ByteChannel::new(stdout, stdin, TransportKind::Spawned).with_child(child))
}
