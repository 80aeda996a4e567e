// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! nginx reverse-proxy site for one domain.
//!
//! The site file lives in `sites-available` and is enabled by a symlink in
//! `sites-enabled`. Both directories are root-owned, so every change goes
//! through an elevated command.

use crate::config::NginxConfig;
use crate::error::{Error, Result, Stage};
use crate::exec::{CommandRunner, ToolCommand};
use crate::fs::path_to_str;
use crate::host::HostProfile;
use crate::output::Output;
use crate::prompt::{Confirmation, Outcome, Prompter};
use crate::provision::reload_nginx_command;
use std::path::PathBuf;

pub const DEFAULT_LISTEN_PORT: u16 = 80;

/// Parse an upstream port typed by the operator.
pub fn validate_port(input: &str) -> Result<u16> {
    let trimmed = input.trim();
    match trimmed.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::InvalidPort {
            port: trimmed.to_string(),
        }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySiteConfig {
    pub domain: String,
    pub upstream_host: String,
    pub upstream_port: u16,
    pub listen_port: u16,
    pub timeout_secs: u32,
}

impl ProxySiteConfig {
    pub fn new(domain: &str, upstream_port: u16, nginx: &NginxConfig) -> Self {
        Self {
            domain: domain.to_string(),
            upstream_host: nginx.upstream_host.clone(),
            upstream_port,
            listen_port: DEFAULT_LISTEN_PORT,
            timeout_secs: nginx.proxy_timeout_secs,
        }
    }

    pub fn upstream(&self) -> String {
        format!("http://{}:{}", self.upstream_host, self.upstream_port)
    }

    /// The nginx `server` block for this site.
    pub fn render(&self) -> String {
        format!(
            r#"server {{
    listen {listen};
    listen [::]:{listen};
    server_name {domain};

    location / {{
        proxy_pass {upstream};
        proxy_http_version 1.1;

        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;

        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";

        proxy_connect_timeout {timeout}s;
        proxy_send_timeout {timeout}s;
        proxy_read_timeout {timeout}s;
    }}
}}
"#,
            listen = self.listen_port,
            domain = self.domain,
            upstream = self.upstream(),
            timeout = self.timeout_secs,
        )
    }
}

/// Where a domain's site definition and its enablement link live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteFiles {
    pub available: PathBuf,
    pub enabled: PathBuf,
}

impl SiteFiles {
    pub fn for_domain(nginx: &NginxConfig, domain: &str) -> Self {
        Self {
            available: nginx.sites_available.join(domain),
            enabled: nginx.sites_enabled.join(domain),
        }
    }
}

/// Write, enable, validate and reload the site for `site.domain`.
///
/// An existing site file is only replaced after confirmation. If `nginx -t`
/// rejects the configuration the error carries its output verbatim and nginx
/// is not reloaded; the written file stays in place for inspection.
pub fn configure_proxy(
    site: &ProxySiteConfig,
    nginx: &NginxConfig,
    profile: &HostProfile,
    runner: &dyn CommandRunner,
    prompter: &dyn Prompter,
    out: &Output,
) -> Result<Outcome<SiteFiles>> {
    let files = SiteFiles::for_domain(nginx, &site.domain);

    if files.available.exists() {
        let confirmation = Confirmation::OverwriteSite {
            path: files.available.clone(),
        };
        if !prompter.confirm(&confirmation)? {
            return Ok(Outcome::Cancelled);
        }
    }

    let available = path_to_str(&files.available)?;
    let enabled = path_to_str(&files.enabled)?;
    let privileged = |cmd: ToolCommand| cmd.elevated(profile.privilege);

    out.print(&format!("  Writing {}...", files.available.display()));
    runner.run_checked(
        Stage::ProxyWrite,
        &privileged(
            ToolCommand::new("tee")
                .arg(available)
                .stdin_bytes(site.render().into_bytes()),
        ),
    )?;

    out.print(&format!("  Enabling site {}...", site.domain));
    runner.run_checked(
        Stage::ProxyEnable,
        &privileged(ToolCommand::new("rm").args(["-f", enabled])),
    )?;
    runner.run_checked(
        Stage::ProxyEnable,
        &privileged(ToolCommand::new("ln").args(["-s", available, enabled])),
    )?;

    out.print("  Testing nginx configuration...");
    runner.run_checked(
        Stage::ProxyValidate,
        &privileged(ToolCommand::new("nginx").arg("-t")),
    )?;

    out.print("  Reloading nginx...");
    runner.run_checked(Stage::ProxyReload, &privileged(reload_nginx_command()))?;

    tracing::info!(
        domain = %site.domain,
        upstream = %site.upstream(),
        path = %files.available.display(),
        "proxy site enabled"
    );

    Ok(Outcome::Completed(files))
}
