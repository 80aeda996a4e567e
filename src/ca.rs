// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::config::{Config, Paths};
use crate::error::{Error, Result, Stage};
use crate::exec::CommandRunner;
use crate::output::Output;
use crate::prompt::{Confirmation, Outcome, Prompter};
use crate::toolkit::{self, run_step};
use std::path::PathBuf;
use zeroize::Zeroizing;

/// OpenSSL refuses shorter pass phrases.
pub const MIN_PASSPHRASE_LEN: usize = 4;

/// The CA key and certificate on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaFiles {
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl CaFiles {
    pub fn from_paths(paths: &Paths) -> Self {
        Self {
            key: paths.ca_key.clone(),
            cert: paths.ca_cert.clone(),
        }
    }
}

/// The confirmation needed before bootstrapping, if any.
///
/// Only a complete existing CA (key and certificate) is worth protecting;
/// a lone leftover file is overwritten without asking.
pub fn overwrite_confirmation(paths: &Paths) -> Option<Confirmation> {
    paths.ca_exists().then(|| Confirmation::OverwriteCa {
        cert: paths.ca_cert.clone(),
    })
}

/// Ask for the CA passphrase and check OpenSSL will accept it.
pub fn read_passphrase(prompter: &dyn Prompter, creating: bool) -> Result<Zeroizing<String>> {
    let passphrase = prompter.password("CA key passphrase: ", creating)?;
    if passphrase.chars().count() < MIN_PASSPHRASE_LEN {
        return Err(Error::Password(format!(
            "passphrase must be at least {} characters",
            MIN_PASSPHRASE_LEN
        )));
    }
    Ok(passphrase)
}

/// Generate (or, once confirmed, regenerate) the CA key and self-signed certificate.
///
/// Expects OpenSSL to be available and the storage directory to exist.
/// A failed step aborts the rest; files it left behind are not cleaned up.
pub fn create_ca(
    paths: &Paths,
    config: &Config,
    runner: &dyn CommandRunner,
    prompter: &dyn Prompter,
    out: &Output,
) -> Result<Outcome<CaFiles>> {
    if let Some(confirmation) = overwrite_confirmation(paths) {
        if !prompter.confirm(&confirmation)? {
            return Ok(Outcome::Cancelled);
        }
        tracing::info!(path = %paths.ca_cert.display(), "overwriting existing CA");
    }

    let passphrase = read_passphrase(prompter, true)?;

    out.print(&format!(
        "  Generating {}-bit CA private key...",
        config.key_bits
    ));
    let key_cmd = toolkit::encrypted_key(&paths.ca_key, config.key_bits, &passphrase)?;
    run_step(runner, Stage::CaKey, &key_cmd)?;
    crate::fs::restrict_to_owner(&paths.ca_key)?;

    out.print(&format!(
        "  Generating CA certificate (valid {} days)...",
        config.ca_days
    ));
    let cert_cmd = toolkit::self_signed_ca(
        &paths.ca_key,
        &paths.ca_cert,
        config.ca_days,
        &config.digest,
        &config.ca_subject,
        &passphrase,
    )?;
    run_step(runner, Stage::CaCertificate, &cert_cmd)?;

    tracing::info!(
        key = %paths.ca_key.display(),
        cert = %paths.ca_cert.display(),
        "CA created"
    );

    Ok(Outcome::Completed(CaFiles::from_paths(paths)))
}
