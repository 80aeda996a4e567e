// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Blocking subprocess execution.
//!
//! Every external tool (openssl, nginx, certbot, the package manager, sudo)
//! is reached through [`CommandRunner`] so flows can be exercised without
//! touching the host. Commands run one at a time and are never timed out.

use crate::error::{Error, Result, Stage};
use crate::host::Privilege;
use std::fmt;
use std::io::Write;
use std::process::{Command, Stdio};
use zeroize::Zeroizing;

/// A fully constructed external command.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Extra environment; values may be secrets and are never printed.
    pub env: Vec<(String, Zeroizing<String>)>,
    /// Bytes fed to the child's stdin.
    pub stdin: Option<Vec<u8>>,
    /// Attach the child to the operator's terminal instead of capturing output.
    pub interactive: bool,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            stdin: None,
            interactive: false,
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

    pub fn secret_env(mut self, key: impl Into<String>, value: &str) -> Self {
        self.env
            .push((key.into(), Zeroizing::new(value.to_string())));
        self
    }

    pub fn stdin_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Prefix with `sudo` unless already running as root.
    pub fn elevated(self, privilege: Privilege) -> Self {
        match privilege {
            Privilege::Root => self,
            Privilege::Sudo => {
                let mut args = Vec::with_capacity(self.args.len() + 1);
                args.push(self.program);
                args.extend(self.args);
                Self {
                    program: "sudo".into(),
                    args,
                    ..self
                }
            }
        }
    }

    /// True if `needle` appears as an argument.
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Value following `flag`, e.g. the path after `-out`.
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolCommand")
            .field("program", &self.program)
            .field("args", &self.args)
            .field(
                "env",
                &self.env.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(),
            )
            .field("stdin", &self.stdin.as_ref().map(Vec::len))
            .field("interactive", &self.interactive)
            .finish()
    }
}

/// What a finished command reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// The most useful diagnostic text the tool printed.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Turn a non-zero exit into a stage-tagged [`Error::Subprocess`].
    pub fn check(self, stage: Stage, command: &ToolCommand) -> Result<ToolOutput> {
        if self.success {
            return Ok(self);
        }
        let diagnostic = self.diagnostic();
        if command.program == "sudo" && is_sudo_auth_failure(&diagnostic) {
            return Err(Error::PrivilegeUnavailable {
                reason: diagnostic,
            });
        }
        Err(Error::Subprocess {
            stage,
            command: command.to_string(),
            stderr: diagnostic,
        })
    }
}

pub trait CommandRunner {
    /// Run to completion. Spawn failures are errors; a non-zero exit is not.
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput>;

    /// Run and fail with [`Error::Subprocess`] on non-zero exit.
    fn run_checked(&self, stage: Stage, command: &ToolCommand) -> Result<ToolOutput> {
        tracing::debug!(%stage, command = %command, "running");
        self.run(command)?.check(stage, command)
    }

    /// True iff the command could be spawned and exited successfully.
    fn probe(&self, command: &ToolCommand) -> bool {
        match self.run(command) {
            Ok(output) => output.success,
            Err(e) => {
                tracing::debug!(command = %command, error = %e, "probe failed");
                false
            }
        }
    }
}

/// Runs commands on the host with `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value.as_str());
        }

        let spawn_err = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::CommandNotFound {
                    command: command.program.clone(),
                    hint: install_hint(&command.program),
                }
            } else {
                Error::Spawn {
                    command: command.to_string(),
                    source: e,
                }
            }
        };

        if command.interactive {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(spawn_err)?;
            return Ok(ToolOutput {
                success: status.success(),
                code: status.code(),
                ..ToolOutput::default()
            });
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        // sudo may need to prompt for a password on the terminal
        cmd.stdin(if command.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = cmd.spawn().map_err(spawn_err)?;
        let feed = child.stdin.take().zip(command.stdin.as_deref());
        #[cfg(unix)]
        let _sigpipe = feed.is_some().then(SigpipeIgnored::new);

        let (output, fed) = std::thread::scope(|scope| {
            let writer = feed.map(|(mut stdin, bytes)| scope.spawn(move || stdin.write_all(bytes)));
            let output = child.wait_with_output();
            let fed = match writer {
                Some(writer) => writer
                    .join()
                    .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked"))),
                None => Ok(()),
            };
            (output, fed)
        });
        let output = output.map_err(spawn_err)?;

        // A child that exits without reading its input reports its own failure
        if let Err(e) = fed {
            if e.kind() != std::io::ErrorKind::BrokenPipe || output.status.success() {
                return Err(spawn_err(e));
            }
            tracing::debug!(command = %command, "child exited before reading all of stdin");
        }

        Ok(ToolOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Ignores SIGPIPE until dropped, so a child closing its stdin early
/// surfaces as `BrokenPipe` instead of terminating the process.
#[cfg(unix)]
struct SigpipeIgnored(libc::sighandler_t);

#[cfg(unix)]
impl SigpipeIgnored {
    fn new() -> Self {
        // SAFETY: swaps the process-wide SIGPIPE disposition; restored on drop
        Self(unsafe { libc::signal(libc::SIGPIPE, libc::SIG_IGN) })
    }
}

#[cfg(unix)]
impl Drop for SigpipeIgnored {
    fn drop(&mut self) {
        // SAFETY: reinstates the disposition saved in `new`
        unsafe {
            libc::signal(libc::SIGPIPE, self.0);
        }
    }
}

/// Installation hint for a missing command.
pub fn install_hint(command: &str) -> String {
    match command {
        "openssl" => "Install OpenSSL: sudo apt-get install openssl (Debian/Ubuntu), \
                      sudo dnf install openssl (Fedora/RHEL), brew install openssl (macOS)"
            .to_string(),
        "nginx" => "Run 'certpilot setup-nginx' to install it, or: sudo apt-get install nginx"
            .to_string(),
        "certbot" => {
            "Run 'certpilot setup-nginx' to install it, or: sudo apt-get install certbot"
                .to_string()
        }
        "sudo" => "Sudo is required for system changes. Install sudo or run as root.".to_string(),
        "systemctl" => "systemd is required to reload nginx. Reload it manually instead."
            .to_string(),
        _ => format!("Please install the '{}' command", command),
    }
}

/// Check if sudo output indicates an authentication failure.
fn is_sudo_auth_failure(stderr: &str) -> bool {
    stderr.contains("sudo: no password was provided")
        || stderr.contains("sudo: a password is required")
        || stderr.contains("Sorry, try again")
        || stderr.contains("incorrect password attempts")
        || stderr.contains("is not in the sudoers file")
        || stderr.contains("Authentication failure")
}
