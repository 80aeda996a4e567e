// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Sequencing of the top-level commands.
//!
//! Local path: OpenSSL check, storage directory, then CA bootstrap or
//! domain issuance. Production path: host profile, nginx and certbot
//! provisioning, proxy site, then DNS-01 issuance. The first failing
//! stage ends the run; nothing is retried or resumed.

use crate::acme::{self, LiveCertificate};
use crate::ca::{self, CaFiles};
use crate::cert::{self, IssuedCertificate};
use crate::config::{Config, Paths};
use crate::error::{Error, Result};
use crate::exec::CommandRunner;
use crate::host::{HostProfile, Platform};
use crate::nginx::{self, ProxySiteConfig, SiteFiles};
use crate::output::Output;
use crate::prompt::{Outcome, Prompter};
use crate::provision;
use crate::toolkit;
use crate::trust;

/// What a completed production setup left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductionSite {
    pub domain: String,
    pub upstream_port: u16,
    pub site: SiteFiles,
    pub certificate: LiveCertificate,
}

pub struct Orchestrator<'a> {
    paths: Paths,
    config: Config,
    runner: &'a dyn CommandRunner,
    prompter: &'a dyn Prompter,
    out: Output,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        paths: Paths,
        config: Config,
        runner: &'a dyn CommandRunner,
        prompter: &'a dyn Prompter,
        out: Output,
    ) -> Self {
        Self {
            paths,
            config,
            runner,
            prompter,
            out,
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Shared preconditions of both local flows.
    fn prepare_local(&self) -> Result<()> {
        toolkit::require(self.runner)?;
        self.paths.ensure_dir()
    }

    pub fn check_openssl(&self) -> Result<String> {
        let version = toolkit::version(self.runner)?;
        self.out.print(&format!("OpenSSL is available: {}", version));
        Ok(version)
    }

    pub fn create_local_ca(&self) -> Result<Outcome<CaFiles>> {
        self.prepare_local()?;

        self.out.print(&format!(
            "Creating local CA in {}",
            self.paths.base.display()
        ));
        let outcome = ca::create_ca(
            &self.paths,
            &self.config,
            self.runner,
            self.prompter,
            &self.out,
        )?;

        if let Outcome::Completed(files) = &outcome {
            self.out.print("");
            self.out.print("CA created:");
            self.out.print(&format!("  Key:         {}", files.key.display()));
            self.out.print(&format!("  Certificate: {}", files.cert.display()));
            self.print_trust_guidance(files);
        }
        Ok(outcome)
    }

    fn print_trust_guidance(&self, files: &CaFiles) {
        self.out.print("");
        self.out.print("Trust the CA so browsers accept certificates it signs:");
        for section in trust::install_guidance(&files.cert, &Platform::current()) {
            let marker = if section.current { " (this machine)" } else { "" };
            self.out.print("");
            self.out.print(&format!("{}{}", section.title, marker));
            for step in &section.steps {
                self.out.print(&format!("  {}", step));
            }
        }
    }

    pub fn create_cert(&self, domain: &str) -> Result<Outcome<IssuedCertificate>> {
        let domain = cert::validate_domain(domain)?;
        self.prepare_local()?;

        if !self.paths.ca_exists() {
            return Err(Error::CaNotInitialized {
                dir: self.paths.base.clone(),
            });
        }

        self.out.print(&format!("Issuing certificate for {}", domain));
        let outcome = cert::issue_domain_certificate(
            &self.paths,
            &self.config,
            &domain,
            self.runner,
            self.prompter,
            &self.out,
        )?;

        if let Outcome::Completed(issued) = &outcome {
            self.print_issued(issued);
        }
        Ok(outcome)
    }

    /// Domain issuance with the domain asked for interactively.
    pub fn create_cert_prompted(&self) -> Result<Outcome<IssuedCertificate>> {
        let domain = self.prompter.input("Domain for the certificate (e.g. myapp.test)")?;
        self.create_cert(&domain)
    }

    fn print_issued(&self, issued: &IssuedCertificate) {
        self.out.print("");
        self.out.print(&format!("Certificate for {}:", issued.domain));
        self.out.print(&format!("  Key:         {}", issued.key.display()));
        self.out.print(&format!("  Certificate: {}", issued.cert.display()));
        if let Some(info) = &issued.info {
            self.out.print(&format!(
                "  Expires:     {} ({} days)",
                info.expiry_string(),
                info.days_remaining()
            ));
            self.out
                .print(&format!("  Names:       {}", info.subject_alt_names.join(", ")));
        }
        for kept in &issued.kept_temporary {
            self.out.verbose(&format!("  Kept:        {}", kept.display()));
        }
        self.out.print("");
        self.out.print("nginx TLS configuration:");
        for line in cert::nginx_tls_stanza(&issued.cert, &issued.key).lines() {
            self.out.print(&format!("    {}", line));
        }
    }

    /// Production setup on the running host.
    pub fn setup_nginx(&self) -> Result<Outcome<ProductionSite>> {
        let profile = HostProfile::detect(self.runner)?;
        self.setup_nginx_on(&profile)
    }

    /// Production setup against an already resolved host profile.
    pub fn setup_nginx_on(&self, profile: &HostProfile) -> Result<Outcome<ProductionSite>> {
        self.out.print(&format!("Setting up nginx on {}", profile.platform));

        if provision::ensure_proxy_and_issuance_client(
            profile,
            self.runner,
            self.prompter,
            &self.out,
        )?
        .is_cancelled()
        {
            return Ok(Outcome::Cancelled);
        }

        let domain = cert::validate_domain(
            &self
                .prompter
                .input("Domain to serve (e.g. app.example.com)")?,
        )?;
        let upstream_port =
            nginx::validate_port(&self.prompter.input("Local port your app listens on")?)?;

        let site_config = ProxySiteConfig::new(&domain, upstream_port, &self.config.nginx);
        let site = match nginx::configure_proxy(
            &site_config,
            &self.config.nginx,
            profile,
            self.runner,
            self.prompter,
            &self.out,
        )? {
            Outcome::Completed(site) => site,
            Outcome::Cancelled => return Ok(Outcome::Cancelled),
        };
        self.out.print(&format!(
            "  http://{} now proxies to {}",
            domain,
            site_config.upstream()
        ));

        let certificate =
            match acme::run_issuance(&domain, profile, self.runner, self.prompter, &self.out)? {
                Outcome::Completed(certificate) => certificate,
                Outcome::Cancelled => return Ok(Outcome::Cancelled),
            };

        self.out.print("");
        self.out.print(&format!(
            "Certificate stored in {}/{}/",
            acme::LIVE_DIR,
            domain
        ));
        self.out.print(&format!(
            "Add to the server block in {} to serve HTTPS:",
            site.available.display()
        ));
        for line in cert::nginx_tls_stanza(&certificate.fullchain, &certificate.privkey).lines() {
            self.out.print(&format!("    {}", line));
        }

        Ok(Outcome::Completed(ProductionSite {
            domain,
            upstream_port,
            site,
            certificate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NginxConfig;
    use crate::host::{LinuxDistro, PackageManager, Privilege};
    use crate::prompt::ConfirmationKind;
    use crate::testing::{FakeRunner, ScriptedPrompter};
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> Config {
        let available = temp.path().join("sites-available");
        let enabled = temp.path().join("sites-enabled");
        std::fs::create_dir_all(&available).expect("available dir");
        std::fs::create_dir_all(&enabled).expect("enabled dir");
        Config {
            nginx: NginxConfig {
                sites_available: available,
                sites_enabled: enabled,
                ..NginxConfig::default()
            },
            ..Config::default()
        }
    }

    fn profile() -> HostProfile {
        HostProfile {
            platform: Platform::Linux(LinuxDistro::Debian),
            package_manager: Some(PackageManager::AptGet),
            privilege: Privilege::Sudo,
        }
    }

    #[test]
    fn test_missing_openssl_writes_nothing() {
        let temp = TempDir::new().expect("temp dir");
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new().missing("openssl");
        let prompter = ScriptedPrompter::new().password("correct horse");
        let orchestrator =
            Orchestrator::new(paths, Config::default(), &runner, &prompter, Output::quiet());

        let err = orchestrator.create_local_ca().expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::ToolMissing);
        assert!(!orchestrator.paths().base.exists());
        assert_eq!(runner.command_lines(), vec!["openssl version"]);
    }

    #[test]
    fn test_local_ca_then_domain_certificate() {
        let temp = TempDir::new().expect("temp dir");
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .password("correct horse")
            .answer(ConfirmationKind::DeleteTemporaryFiles, true);
        let orchestrator =
            Orchestrator::new(paths, Config::default(), &runner, &prompter, Output::quiet());

        orchestrator.create_local_ca().expect("ca");
        let issued = orchestrator
            .create_cert("example.test")
            .expect("cert")
            .completed()
            .expect("not cancelled");

        assert!(issued.key.ends_with("example.test.key"));
        assert!(issued.cert.exists());
        assert_eq!(runner.count_matching("openssl version"), 2);
        assert_eq!(runner.count_matching("openssl genrsa"), 2);
    }

    #[test]
    fn test_create_cert_requires_ca() {
        let temp = TempDir::new().expect("temp dir");
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new().password("correct horse");
        let orchestrator =
            Orchestrator::new(paths, Config::default(), &runner, &prompter, Output::quiet());

        let err = orchestrator.create_cert("example.test").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::PreconditionUnmet);
        assert_eq!(runner.command_lines(), vec!["openssl version"]);
        let files = orchestrator.paths().domain("example.test").expect("paths");
        assert!(!files.key.exists());
        assert!(!files.csr.exists());
        assert!(!files.cert.exists());
    }

    #[test]
    fn test_create_cert_asks_for_domain() {
        let temp = TempDir::new().expect("temp dir");
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .password("correct horse")
            .input("  myapp.test ")
            .answer(ConfirmationKind::DeleteTemporaryFiles, true);
        let orchestrator =
            Orchestrator::new(paths, Config::default(), &runner, &prompter, Output::quiet());

        orchestrator.create_local_ca().expect("ca");
        let issued = orchestrator
            .create_cert_prompted()
            .expect("cert")
            .completed()
            .expect("not cancelled");

        assert_eq!(issued.domain, "myapp.test");
        assert_eq!(prompter.input_prompts().len(), 1);
    }

    #[test]
    fn test_invalid_domain_rejected_first() {
        let temp = TempDir::new().expect("temp dir");
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new();
        let orchestrator =
            Orchestrator::new(paths, Config::default(), &runner, &prompter, Output::quiet());

        let err = orchestrator.create_cert("bad domain").expect_err("must fail");
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_setup_nginx_full_path() {
        let temp = TempDir::new().expect("temp dir");
        let config = config_in(&temp);
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .input("app.example.com")
            .input("7000")
            .input("ops@example.com")
            .answer(ConfirmationKind::DnsRecordReady, true);
        let orchestrator = Orchestrator::new(paths, config, &runner, &prompter, Output::quiet());

        let site = orchestrator
            .setup_nginx_on(&profile())
            .expect("setup")
            .completed()
            .expect("not cancelled");

        assert_eq!(site.domain, "app.example.com");
        assert_eq!(site.upstream_port, 7000);
        let lines = runner.command_lines();
        let position = |prefix: &str| {
            lines
                .iter()
                .position(|l| l.starts_with(prefix))
                .unwrap_or_else(|| panic!("missing {}", prefix))
        };
        assert!(position("nginx -v") < position("sudo tee"));
        assert!(position("sudo nginx -t") < position("sudo systemctl reload nginx"));
        assert!(position("sudo systemctl reload nginx") < position("sudo certbot certonly"));
    }

    #[test]
    fn test_setup_nginx_rejects_bad_port_before_writing() {
        let temp = TempDir::new().expect("temp dir");
        let config = config_in(&temp);
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .input("app.example.com")
            .input("0");
        let orchestrator = Orchestrator::new(paths, config, &runner, &prompter, Output::quiet());

        let err = orchestrator.setup_nginx_on(&profile()).expect_err("must fail");
        assert!(matches!(err, Error::InvalidPort { .. }));
        assert_eq!(runner.count_matching("sudo"), 0);
    }

    #[test]
    fn test_setup_nginx_declined_install_stops_early() {
        let temp = TempDir::new().expect("temp dir");
        let config = config_in(&temp);
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new().missing("certbot");
        let prompter = ScriptedPrompter::new().answer(ConfirmationKind::InstallTool, false);
        let orchestrator = Orchestrator::new(paths, config, &runner, &prompter, Output::quiet());

        let outcome = orchestrator.setup_nginx_on(&profile()).expect("decline is ok");
        assert!(outcome.is_cancelled());
        assert!(prompter.input_prompts().is_empty());
    }

    #[test]
    fn test_check_openssl_reports_version() {
        let temp = TempDir::new().expect("temp dir");
        let paths = Paths::with_base(temp.path().join("certs"));
        let runner = FakeRunner::new().respond("openssl version", "OpenSSL 3.0.13 30 Jan 2024\n");
        let prompter = ScriptedPrompter::new();
        let orchestrator =
            Orchestrator::new(paths, Config::default(), &runner, &prompter, Output::quiet());

        assert_eq!(
            orchestrator.check_openssl().expect("version"),
            "OpenSSL 3.0.13 30 Jan 2024"
        );
    }
}
