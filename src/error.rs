// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The step of a flow that invoked an external tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CaKey,
    CaCertificate,
    DomainKey,
    DomainCsr,
    DomainSign,
    PrivilegeProbe,
    PackageIndex,
    PackageInstall,
    ProxyWrite,
    ProxyEnable,
    ProxyValidate,
    ProxyReload,
    Issuance,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::CaKey => "CA key generation",
            Stage::CaCertificate => "CA certificate generation",
            Stage::DomainKey => "domain key generation",
            Stage::DomainCsr => "CSR generation",
            Stage::DomainSign => "certificate signing",
            Stage::PrivilegeProbe => "privilege check",
            Stage::PackageIndex => "package index refresh",
            Stage::PackageInstall => "package installation",
            Stage::ProxyWrite => "nginx site file write",
            Stage::ProxyEnable => "nginx site enablement",
            Stage::ProxyValidate => "nginx configuration test",
            Stage::ProxyReload => "nginx reload",
            Stage::Issuance => "certificate issuance",
        };
        f.write_str(name)
    }
}

/// Coarse classification callers can branch on instead of message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ToolMissing,
    PermissionDenied,
    PreconditionUnmet,
    SubprocessFailure,
    ValidationFailure,
    Io,
}

impl ErrorKind {
    /// Process exit status for this kind. 2 is left to clap usage errors.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Io => 1,
            ErrorKind::ToolMissing => 3,
            ErrorKind::PermissionDenied => 4,
            ErrorKind::PreconditionUnmet => 5,
            ErrorKind::SubprocessFailure => 6,
            ErrorKind::ValidationFailure => 7,
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("CA not found in {dir}. Run 'certpilot create-local-ca' first.")]
    CaNotInitialized { dir: PathBuf },

    #[error("Command '{command}' not found.\n{hint}")]
    CommandNotFound { command: String, hint: String },

    #[error("{tool} is not installed.\n{hint}")]
    ToolMissing { tool: String, hint: String },

    #[error("No supported package manager found (looked for apt-get, yum, dnf)")]
    NoPackageManager,

    #[error("Unsupported platform: {detected}.\nProduction setup supports Debian or Ubuntu Linux only.")]
    UnsupportedPlatform { detected: String },

    #[error("Elevated privileges are required: {reason}\nRun as root or make sure 'sudo' works for your user.")]
    PrivilegeUnavailable { reason: String },

    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("{stage} failed: {command}\n{stderr}")]
    Subprocess {
        stage: Stage,
        command: String,
        stderr: String,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid domain '{domain}': {reason}")]
    InvalidDomain { domain: String, reason: String },

    #[error("Invalid email address '{email}': {reason}")]
    InvalidEmail { email: String, reason: String },

    #[error("Invalid port '{port}': must be a number between 1 and 65535")]
    InvalidPort { port: String },

    #[error("Invalid validity period: {0}")]
    InvalidDays(String),

    #[error("Invalid path (non-UTF8): {0}")]
    InvalidPath(PathBuf),

    #[error("Invalid password: {0}")]
    Password(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read input: {0}")]
    Prompt(String),

    #[error("Failed to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("Failed to parse certificate: {0}")]
    CertParse(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::CommandNotFound { .. } | Error::ToolMissing { .. } | Error::NoPackageManager => {
                ErrorKind::ToolMissing
            }
            Error::PrivilegeUnavailable { .. } => ErrorKind::PermissionDenied,
            Error::CaNotInitialized { .. } | Error::UnsupportedPlatform { .. } => {
                ErrorKind::PreconditionUnmet
            }
            Error::Subprocess { .. } => ErrorKind::SubprocessFailure,
            Error::Spawn { source, .. } => {
                if source.kind() == std::io::ErrorKind::PermissionDenied {
                    ErrorKind::PermissionDenied
                } else {
                    ErrorKind::SubprocessFailure
                }
            }
            Error::CreateDir { source, .. }
            | Error::Remove { source, .. }
            | Error::ReadFile { source, .. }
            | Error::WriteFile { source, .. } => {
                if source.kind() == std::io::ErrorKind::PermissionDenied {
                    ErrorKind::PermissionDenied
                } else {
                    ErrorKind::Io
                }
            }
            Error::InvalidDomain { .. }
            | Error::InvalidEmail { .. }
            | Error::InvalidPort { .. }
            | Error::InvalidDays(_)
            | Error::InvalidPath(_)
            | Error::Password(_)
            | Error::Config(_) => ErrorKind::ValidationFailure,
            Error::Prompt(_) | Error::Output(_) | Error::CertParse(_) => ErrorKind::Io,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
