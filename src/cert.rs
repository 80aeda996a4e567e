// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::ca;
use crate::config::{Config, DomainPaths, Paths};
use crate::error::{Error, Result, Stage};
use crate::exec::CommandRunner;
use crate::fs::{atomic_write, is_reserved_name, remove_files, restrict_to_owner};
use crate::output::Output;
use crate::prompt::{Confirmation, Outcome, Prompter};
use crate::toolkit::{self, run_step, SignRequest};
use crate::x509::{self, CertInfo};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// A single DNS label: alphanumerics and inner hyphens, 1 to 63 characters.
static LABEL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("invalid label regex")
});

const MAX_DNS_NAME_LENGTH: usize = 253;

/// A domain certificate left on disk by a completed issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub domain: String,
    pub key: PathBuf,
    pub cert: PathBuf,
    /// CSR and extension file, if the operator chose to keep them.
    pub kept_temporary: Vec<PathBuf>,
    /// Parsed from the signed certificate; `None` if it could not be read back.
    pub info: Option<CertInfo>,
}

/// Check a domain entered by the operator. Returns it trimmed.
///
/// File names in the storage directory derive from the domain, so
/// anything beyond plain DNS labels is rejected.
pub fn validate_domain(input: &str) -> Result<String> {
    let domain = input.trim();
    let reject = |reason: String| {
        Err(Error::InvalidDomain {
            domain: domain.to_string(),
            reason,
        })
    };

    if domain.is_empty() {
        return reject("domain cannot be empty".into());
    }
    if domain.len() > MAX_DNS_NAME_LENGTH {
        return reject(format!(
            "DNS name exceeds maximum length of {} characters",
            MAX_DNS_NAME_LENGTH
        ));
    }
    if is_reserved_name(domain) {
        return reject("name is reserved for the CA and config files".into());
    }
    for label in domain.split('.') {
        if label.is_empty() {
            return reject("empty label (leading, trailing or repeated dot)".into());
        }
        if !LABEL_REGEX.is_match(label) {
            return reject(format!(
                "label '{}' must be 1-63 letters, digits or inner hyphens",
                label
            ));
        }
    }

    Ok(domain.to_string())
}

/// OpenSSL extension file binding the certificate to exactly `domain`.
pub fn render_san_extension(domain: &str) -> String {
    format!(
        "authorityKeyIdentifier=keyid,issuer\n\
         basicConstraints=CA:FALSE\n\
         keyUsage = digitalSignature, nonRepudiation, keyEncipherment, dataEncipherment\n\
         extendedKeyUsage = serverAuth\n\
         subjectAltName = @alt_names\n\
         \n\
         [alt_names]\n\
         DNS.1 = {}\n",
        domain
    )
}

/// Ready-to-paste nginx TLS directives for a certificate and key.
pub fn nginx_tls_stanza(cert: &Path, key: &Path) -> String {
    format!(
        "listen 443 ssl;\n\
         ssl_certificate     {};\n\
         ssl_certificate_key {};\n\
         ssl_protocols       TLSv1.2 TLSv1.3;\n",
        cert.display(),
        key.display()
    )
}

/// The confirmation needed before issuing for `domain`, if any.
pub fn overwrite_confirmation(files: &DomainPaths, domain: &str) -> Option<Confirmation> {
    (files.key.exists() || files.cert.exists()).then(|| Confirmation::OverwriteDomainCertificate {
        domain: domain.to_string(),
    })
}

/// Generate a key, CSR and SAN extension for `domain`, then sign with the local CA.
///
/// Fails with [`Error::CaNotInitialized`] before touching the filesystem if
/// the CA is incomplete. Each OpenSSL step aborts the rest on failure.
pub fn issue_domain_certificate(
    paths: &Paths,
    config: &Config,
    domain: &str,
    runner: &dyn CommandRunner,
    prompter: &dyn Prompter,
    out: &Output,
) -> Result<Outcome<IssuedCertificate>> {
    let domain = validate_domain(domain)?;

    if !paths.ca_exists() {
        return Err(Error::CaNotInitialized {
            dir: paths.base.clone(),
        });
    }

    let files = paths.domain(&domain)?;

    if let Some(confirmation) = overwrite_confirmation(&files, &domain) {
        if !prompter.confirm(&confirmation)? {
            return Ok(Outcome::Cancelled);
        }
        tracing::info!(domain = %domain, "overwriting existing domain certificate");
    }

    let passphrase = ca::read_passphrase(prompter, false)?;

    out.print(&format!("  Generating {}-bit key for {}...", config.key_bits, domain));
    run_step(
        runner,
        Stage::DomainKey,
        &toolkit::plain_key(&files.key, config.key_bits)?,
    )?;
    restrict_to_owner(&files.key)?;

    out.print("  Generating certificate signing request...");
    run_step(
        runner,
        Stage::DomainCsr,
        &toolkit::csr(&files.key, &files.csr, &domain)?,
    )?;

    atomic_write(&files.ext, render_san_extension(&domain).as_bytes())?;
    tracing::debug!(path = %files.ext.display(), "wrote SAN extension file");

    out.print(&format!(
        "  Signing with local CA (valid {} days)...",
        config.cert_days
    ));
    let request = SignRequest {
        csr: &files.csr,
        ca_cert: &paths.ca_cert,
        ca_key: &paths.ca_key,
        ca_serial: &paths.ca_serial,
        ext: &files.ext,
        cert: &files.cert,
        days: config.cert_days,
        digest: &config.digest,
    };
    run_step(runner, Stage::DomainSign, &toolkit::sign(&request, &passphrase)?)?;

    tracing::info!(domain = %domain, cert = %files.cert.display(), "domain certificate issued");

    let kept_temporary = clean_up_temporary(&files, prompter, out)?;

    let info = match x509::parse_cert_file(&files.cert) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::warn!(path = %files.cert.display(), error = %e, "could not read back certificate");
            None
        }
    };

    Ok(Outcome::Completed(IssuedCertificate {
        domain,
        key: files.key,
        cert: files.cert,
        kept_temporary,
        info,
    }))
}

/// Offer to delete the CSR and extension file. Returns the files still on disk.
/// Removal failures are warnings; the certificate is already usable.
fn clean_up_temporary(
    files: &DomainPaths,
    prompter: &dyn Prompter,
    out: &Output,
) -> Result<Vec<PathBuf>> {
    let temporary: Vec<PathBuf> = files.temporary().iter().map(|p| p.to_path_buf()).collect();
    let confirmation = Confirmation::DeleteTemporaryFiles {
        files: temporary.clone(),
    };
    if !prompter.confirm(&confirmation)? {
        return Ok(temporary);
    }

    let failures = remove_files(&files.temporary());
    for failure in &failures {
        out.warn(&failure.to_string());
    }
    Ok(temporary.into_iter().filter(|p| p.exists()).collect())
}
