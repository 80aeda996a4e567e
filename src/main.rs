// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use certpilot::{
    Config, Error, Orchestrator, Output, Paths, Result, SystemRunner, TerminalPrompter,
};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "certpilot")]
#[command(about = "Local CA, CA-signed domain certificates, and nginx + Let's Encrypt setup")]
#[command(version)]
#[command(after_help = "\
EXAMPLES:
    certpilot create-local-ca          # Create ~/certs/myCA.key and myCA.pem
    certpilot create-cert myapp.test   # Certificate for myapp.test signed by the local CA
    certpilot setup-nginx              # Proxy a domain to a local port and get a public certificate

ENVIRONMENT:
    CERTPILOT_ROOT          Storage directory (default: ~/certs)
    CERTPILOT_CA_PASSWORD   CA passphrase, skips the prompt
    RUST_LOG                Log filter, e.g. certpilot=debug")]
struct Cli {
    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the local certificate authority
    CreateLocalCa,

    /// Issue a certificate for a domain, signed by the local CA
    CreateCert {
        /// Domain name, e.g. myapp.test (asked for when omitted)
        domain: Option<String>,
    },

    /// Install nginx and certbot, proxy a domain to a local port, and obtain a certificate
    SetupNginx,

    /// Check that OpenSSL is installed
    CheckOpenssl,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    // Reset SIGPIPE to default behavior (exit) instead of panic
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }

    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::debug!(kind = ?e.kind(), "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let out = Output::new(cli.quiet, cli.verbose);

    let command = match cli.command {
        Some(Commands::Completions { shell }) => return cmd_completions(shell),
        Some(command) => command,
        None => return cmd_welcome(&out),
    };

    let paths = Paths::new()?;
    let config = Config::load(&paths.config)?;
    let runner = SystemRunner;
    let prompter = TerminalPrompter::new();
    let orchestrator = Orchestrator::new(paths, config, &runner, &prompter, out);

    let cancelled = match command {
        Commands::CreateLocalCa => orchestrator.create_local_ca()?.is_cancelled(),
        Commands::CreateCert { domain } => match domain {
            Some(domain) => orchestrator.create_cert(&domain)?,
            None => orchestrator.create_cert_prompted()?,
        }
        .is_cancelled(),
        Commands::SetupNginx => orchestrator.setup_nginx()?.is_cancelled(),
        Commands::CheckOpenssl => {
            orchestrator.check_openssl()?;
            false
        }
        // Handled before the storage directory is resolved
        Commands::Completions { .. } => false,
    };

    if cancelled {
        report_cancelled(&out);
    }
    Ok(())
}

fn report_cancelled(out: &Output) {
    out.print("Cancelled. Nothing further was changed.");
}

fn cmd_welcome(out: &Output) -> Result<()> {
    out.print("certpilot: TLS certificates from local development to production.");
    out.print("");
    out.print("  1. certpilot check-openssl        make sure OpenSSL is installed");
    out.print("  2. certpilot create-local-ca      create your development CA");
    out.print("  3. certpilot create-cert <domain> issue a certificate signed by it");
    out.print("");
    out.print("On a Debian or Ubuntu server, 'certpilot setup-nginx' puts a");
    out.print("domain behind nginx with a Let's Encrypt certificate.");
    out.print("");
    if !out.is_quiet() {
        write_help(&mut std::io::stdout().lock())?;
    }
    Ok(())
}

fn write_help(writer: &mut impl Write) -> Result<()> {
    Cli::command().write_help(writer).map_err(Error::Output)?;
    writer.flush().map_err(Error::Output)
}

fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "certpilot", &mut std::io::stdout());
    Ok(())
}
