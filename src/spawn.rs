//! External process execution
//!
//! Triggers that shell out (ldconfig) go through the [`Spawner`] capability
//! rather than `std::process` directly, so tests and embedding applications
//! can substitute their own runner.
//!
//! A spawn request is an argv plus a map of child fd to parent fd. Only the
//! standard streams are understood: a child fd of 0, 1 or 2 mapped to parent
//! fd 0, 1 or 2 is connected to that parent stream (stdin only to stdin);
//! standard streams left out of the map are connected to `/dev/null`.

use std::collections::BTreeMap;
use std::io;
use std::process::{Command, Stdio};

use log::debug;

use crate::error::{Error, Result};

/// Child fd -> parent fd.
pub type FdRedirects = BTreeMap<i32, i32>;

/// Redirects that pass the child's stdout and stderr straight through.
pub fn passthrough_stdio() -> FdRedirects {
    FdRedirects::from([(1, 1), (2, 2)])
}

/// Capability to run an external command and wait for its exit code.
pub trait Spawner {
    fn spawn(&self, argv: &[String], fd_pipes: &FdRedirects) -> Result<i32>;
}

/// Runs commands with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSpawner;

impl ProcessSpawner {
    pub fn new() -> Self {
        Self
    }
}

fn parent_stream(command: &str, child_fd: i32, fd_pipes: &FdRedirects) -> Result<Stdio> {
    match fd_pipes.get(&child_fd) {
        None => Ok(Stdio::null()),
        Some(1) => Ok(Stdio::from(io::stdout())),
        Some(2) => Ok(Stdio::from(io::stderr())),
        Some(other) => Err(Error::Spawn {
            command: command.to_string(),
            message: format!("cannot redirect fd {} to parent fd {}", child_fd, other),
        }),
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, argv: &[String], fd_pipes: &FdRedirects) -> Result<i32> {
        let (program, args) = argv.split_first().ok_or_else(|| Error::Spawn {
            command: String::new(),
            message: "empty argv".to_string(),
        })?;

        if let Some(fd) = fd_pipes.keys().find(|fd| !(0..=2).contains(*fd)) {
            return Err(Error::Spawn {
                command: program.clone(),
                message: format!("only the standard streams can be redirected, got fd {}", fd),
            });
        }
        // Stdin is only passed through when explicitly mapped to the parent's stdin.
        let stdin = match fd_pipes.get(&0) {
            Some(0) => Stdio::inherit(),
            Some(other) => {
                return Err(Error::Spawn {
                    command: program.clone(),
                    message: format!("cannot redirect fd 0 to parent fd {}", other),
                })
            }
            None => Stdio::null(),
        };

        debug!("spawning {}", argv.join(" "));
        let status = Command::new(program)
            .args(args)
            .stdin(stdin)
            .stdout(parent_stream(program, 1, fd_pipes)?)
            .stderr(parent_stream(program, 2, fd_pipes)?)
            .status()
            .map_err(|e| Error::Spawn {
                command: program.clone(),
                message: e.to_string(),
            })?;

        Ok(exit_code(status))
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
