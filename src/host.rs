// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Host environment probing.
//!
//! Nothing here is cached between runs: every invocation resolves a fresh
//! [`HostProfile`] and hands it to the provisioning and proxy steps.

use crate::error::{Error, Result, Stage};
use crate::exec::{CommandRunner, ToolCommand};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxDistro {
    Debian, // Ubuntu, Mint, Pop!_OS, etc.
    Fedora, // RHEL, CentOS, Rocky, Alma
    Arch,   // Manjaro, EndeavourOS
    Unknown,
}

impl LinuxDistro {
    pub fn detect() -> Self {
        if let Ok(content) = std::fs::read_to_string("/etc/os-release") {
            let distro = Self::from_os_release(&content);
            if distro != LinuxDistro::Unknown {
                return distro;
            }
        }

        // Fallback: check for trust update commands
        if Path::new("/usr/sbin/update-ca-certificates").exists() {
            return LinuxDistro::Debian;
        }
        if Path::new("/usr/bin/update-ca-trust").exists() {
            return LinuxDistro::Fedora;
        }
        if Path::new("/usr/bin/trust").exists() {
            return LinuxDistro::Arch;
        }

        LinuxDistro::Unknown
    }

    pub fn from_os_release(content: &str) -> Self {
        let content = content.to_lowercase();

        if content.contains("debian")
            || content.contains("ubuntu")
            || content.contains("mint")
            || content.contains("pop!_os")
        {
            return LinuxDistro::Debian;
        }

        if content.contains("fedora")
            || content.contains("rhel")
            || content.contains("centos")
            || content.contains("rocky")
            || content.contains("alma")
        {
            return LinuxDistro::Fedora;
        }

        if content.contains("arch") || content.contains("manjaro") || content.contains("endeavour")
        {
            return LinuxDistro::Arch;
        }

        LinuxDistro::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Linux(LinuxDistro),
    MacOs,
    Windows,
    Other(String),
}

impl Platform {
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux(LinuxDistro::detect()),
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            other => Platform::Other(other.to_string()),
        }
    }

    /// Production setup needs nginx's `sites-available`/`sites-enabled`
    /// layout, which only the Debian-family package ships.
    pub fn supports_production(&self) -> bool {
        matches!(self, Platform::Linux(LinuxDistro::Debian))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Linux(LinuxDistro::Debian) => f.write_str("Linux (Debian/Ubuntu)"),
            Platform::Linux(LinuxDistro::Fedora) => f.write_str("Linux (Fedora/RHEL/CentOS)"),
            Platform::Linux(LinuxDistro::Arch) => f.write_str("Linux (Arch)"),
            Platform::Linux(LinuxDistro::Unknown) => f.write_str("Linux (unknown distribution)"),
            Platform::MacOs => f.write_str("macOS"),
            Platform::Windows => f.write_str("Windows"),
            Platform::Other(name) => f.write_str(name),
        }
    }
}

/// Tools installed by production setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Nginx,
    Certbot,
}

impl Tool {
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Nginx => "nginx",
            Tool::Certbot => "certbot",
        }
    }

    /// The tool's version query, used as its presence probe.
    pub fn version_command(self) -> ToolCommand {
        match self {
            Tool::Nginx => ToolCommand::new("nginx").arg("-v"),
            Tool::Certbot => ToolCommand::new("certbot").arg("--version"),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    AptGet,
    Yum,
    Dnf,
}

impl PackageManager {
    /// Probe order when several are installed.
    pub const DETECTION_ORDER: [PackageManager; 3] =
        [PackageManager::AptGet, PackageManager::Yum, PackageManager::Dnf];

    pub fn executable(self) -> &'static str {
        match self {
            PackageManager::AptGet => "apt-get",
            PackageManager::Yum => "yum",
            PackageManager::Dnf => "dnf",
        }
    }

    /// First manager in [`Self::DETECTION_ORDER`] for which `is_installed` holds.
    pub fn detect_with(is_installed: impl Fn(&str) -> bool) -> Option<Self> {
        Self::DETECTION_ORDER
            .into_iter()
            .find(|pm| is_installed(pm.executable()))
    }

    pub fn detect() -> Option<Self> {
        Self::detect_with(|exe| which::which(exe).is_ok())
    }

    pub fn package_name(self, tool: Tool) -> &'static str {
        match (self, tool) {
            (_, Tool::Nginx) => "nginx",
            (PackageManager::AptGet, Tool::Certbot) => "certbot",
            // Fedora/RHEL ship certbot from EPEL under the same name
            (PackageManager::Yum | PackageManager::Dnf, Tool::Certbot) => "certbot",
        }
    }

    pub fn refresh_command(self) -> ToolCommand {
        match self {
            PackageManager::AptGet => ToolCommand::new("apt-get").arg("update"),
            PackageManager::Yum => ToolCommand::new("yum").arg("makecache"),
            PackageManager::Dnf => ToolCommand::new("dnf").arg("makecache"),
        }
    }

    pub fn install_command(self, tool: Tool) -> ToolCommand {
        ToolCommand::new(self.executable()).args(["install", "-y", self.package_name(tool)])
    }
}

/// How privileged commands are run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Already root; run commands directly.
    Root,
    /// Prefix commands with `sudo`.
    Sudo,
}

impl Privilege {
    #[cfg(unix)]
    fn current() -> Self {
        // SAFETY: geteuid has no preconditions and cannot fail
        if unsafe { libc::geteuid() } == 0 {
            Privilege::Root
        } else {
            Privilege::Sudo
        }
    }

    #[cfg(not(unix))]
    fn current() -> Self {
        Privilege::Sudo
    }
}

/// Platform, package manager and privilege, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    pub platform: Platform,
    pub package_manager: Option<PackageManager>,
    pub privilege: Privilege,
}

impl HostProfile {
    /// Probe the running host. Fails on unsupported platforms and when
    /// elevated privileges cannot be obtained.
    pub fn detect(runner: &dyn CommandRunner) -> Result<Self> {
        let platform = Platform::current();
        let privilege = Privilege::current();
        Self::resolve(
            platform,
            PackageManager::detect(),
            privilege,
            runner,
        )
    }

    /// Validate already-probed facts, confirming privilege with a no-op command.
    pub fn resolve(
        platform: Platform,
        package_manager: Option<PackageManager>,
        privilege: Privilege,
        runner: &dyn CommandRunner,
    ) -> Result<Self> {
        if !platform.supports_production() {
            return Err(Error::UnsupportedPlatform {
                detected: platform.to_string(),
            });
        }

        if privilege == Privilege::Sudo {
            let probe = ToolCommand::new("true").elevated(Privilege::Sudo);
            match runner.run_checked(Stage::PrivilegeProbe, &probe) {
                Ok(_) => {}
                Err(Error::CommandNotFound { .. }) => {
                    return Err(Error::PrivilegeUnavailable {
                        reason: "not running as root and 'sudo' is not installed".into(),
                    });
                }
                Err(Error::Subprocess { stderr, .. }) => {
                    return Err(Error::PrivilegeUnavailable { reason: stderr });
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            %platform,
            package_manager = ?package_manager,
            privilege = ?privilege,
            "resolved host profile"
        );

        Ok(Self {
            platform,
            package_manager,
            privilege,
        })
    }
}
