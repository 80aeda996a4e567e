// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Certificate lifecycle for development and first production deploys.
//!
//! Locally, a CA is bootstrapped with OpenSSL and used to sign per-domain
//! certificates. In production, nginx and certbot are installed, a reverse
//! proxy site is written, and a publicly trusted certificate is obtained
//! through a DNS-01 challenge.
//!
//! ```rust,no_run
//! use certpilot::{Config, Orchestrator, Output, Paths, SystemRunner, TerminalPrompter};
//!
//! let paths = Paths::new()?;
//! let config = Config::load(&paths.config)?;
//! let runner = SystemRunner;
//! let prompter = TerminalPrompter::new();
//!
//! let orchestrator = Orchestrator::new(paths, config, &runner, &prompter, Output::default());
//! orchestrator.create_local_ca()?;
//! orchestrator.create_cert("myapp.test")?;
//! # Ok::<(), certpilot::Error>(())
//! ```

/// DNS-01 issuance through certbot.
pub mod acme;
/// Certificate Authority bootstrap.
pub mod ca;
/// Domain certificate issuance.
pub mod cert;
/// Configuration handling.
pub mod config;
/// Error types.
pub mod error;
/// Subprocess execution.
pub mod exec;
/// Filesystem utilities.
pub mod fs;
/// Host platform, package manager and privilege detection.
pub mod host;
/// nginx site configuration.
pub mod nginx;
/// Command sequencing.
pub mod orchestrator;
pub mod output;
/// Operator confirmations and input.
pub mod prompt;
/// nginx and certbot installation.
pub mod provision;
/// OpenSSL commands.
pub mod toolkit;
/// CA install guidance.
pub mod trust;
/// X.509 certificate parsing.
pub mod x509;

#[cfg(test)]
pub(crate) mod testing;

pub use acme::{run_issuance, IssuanceSession, IssuanceState, LiveCertificate};
pub use ca::{create_ca, CaFiles};
pub use cert::{issue_domain_certificate, validate_domain, IssuedCertificate};
pub use config::{Config, DomainPaths, NginxConfig, Paths};
pub use error::{Error, ErrorKind, Result, Stage};
pub use exec::{CommandRunner, SystemRunner, ToolCommand, ToolOutput};
pub use host::{HostProfile, LinuxDistro, PackageManager, Platform, Privilege, Tool};
pub use nginx::{configure_proxy, ProxySiteConfig, SiteFiles};
pub use orchestrator::{Orchestrator, ProductionSite};
pub use output::Output;
pub use prompt::{Confirmation, ConfirmationKind, Outcome, Prompter, TerminalPrompter};
pub use provision::ensure_proxy_and_issuance_client;
pub use x509::{parse_cert_file, parse_cert_pem, CertInfo};
