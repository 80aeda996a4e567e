// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Make sure nginx and certbot are installed before production setup.

use crate::error::{Error, Result, Stage};
use crate::exec::{CommandRunner, ToolCommand};
use crate::host::{HostProfile, Tool};
use crate::output::Output;
use crate::prompt::{Confirmation, Outcome, Prompter};

/// Tools production setup depends on, in install order.
pub const REQUIRED_TOOLS: [Tool; 2] = [Tool::Nginx, Tool::Certbot];

pub fn is_installed(runner: &dyn CommandRunner, tool: Tool) -> bool {
    runner.probe(&tool.version_command())
}

pub(crate) fn reload_nginx_command() -> ToolCommand {
    ToolCommand::new("systemctl").args(["reload", "nginx"])
}

/// Probe each tool and offer to install the missing ones.
///
/// Declining an install cancels the flow. The package index is refreshed
/// at most once per run. A failed install aborts; a failed nginx reload
/// afterwards is only a warning.
pub fn ensure_proxy_and_issuance_client(
    profile: &HostProfile,
    runner: &dyn CommandRunner,
    prompter: &dyn Prompter,
    out: &Output,
) -> Result<Outcome<()>> {
    let mut index_refreshed = false;

    for tool in REQUIRED_TOOLS {
        if is_installed(runner, tool) {
            out.verbose(&format!("  {} is installed", tool));
            continue;
        }

        if !prompter.confirm(&Confirmation::InstallTool { tool })? {
            return Ok(Outcome::Cancelled);
        }

        let manager = profile.package_manager.ok_or(Error::NoPackageManager)?;

        if !index_refreshed {
            out.print(&format!("  Refreshing {} package index...", manager.executable()));
            runner.run_checked(
                Stage::PackageIndex,
                &manager.refresh_command().elevated(profile.privilege),
            )?;
            index_refreshed = true;
        }

        out.print(&format!("  Installing {}...", manager.package_name(tool)));
        runner.run_checked(
            Stage::PackageInstall,
            &manager.install_command(tool).elevated(profile.privilege),
        )?;
        tracing::info!(%tool, manager = manager.executable(), "installed");

        if tool == Tool::Nginx {
            let reload = reload_nginx_command().elevated(profile.privilege);
            if let Err(e) = runner.run_checked(Stage::ProxyReload, &reload) {
                out.warn(&format!(
                    "{}\nStart it manually with 'sudo systemctl start nginx' \
                     and enable it at boot with 'sudo systemctl enable nginx'.",
                    e
                ));
            }
        }
    }

    Ok(Outcome::Completed(()))
}
