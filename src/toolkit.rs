// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! OpenSSL availability and command construction.
//!
//! The builders here are pure; nothing runs until a [`CommandRunner`] is
//! handed the resulting [`ToolCommand`]. Passphrases travel through the
//! child's environment (`env:` pass phrase source), never through argv.

use crate::error::{Error, Result, Stage};
use crate::exec::{install_hint, CommandRunner, ToolCommand};
use crate::fs::path_to_str;
use std::path::Path;

const OPENSSL: &str = "openssl";

/// Child environment variable carrying the CA passphrase.
pub const PASSPHRASE_ENV: &str = "CERTPILOT_PASSPHRASE";

pub fn version_command() -> ToolCommand {
    ToolCommand::new(OPENSSL).arg("version")
}

/// True iff `openssl version` exits successfully.
pub fn is_available(runner: &dyn CommandRunner) -> bool {
    runner.probe(&version_command())
}

/// Abort early, before any filesystem write, when OpenSSL is unusable.
pub fn require(runner: &dyn CommandRunner) -> Result<()> {
    if is_available(runner) {
        Ok(())
    } else {
        Err(Error::ToolMissing {
            tool: "OpenSSL".into(),
            hint: install_hint(OPENSSL),
        })
    }
}

/// The installed version string, e.g. `OpenSSL 3.0.13 30 Jan 2024`.
pub fn version(runner: &dyn CommandRunner) -> Result<String> {
    let cmd = version_command();
    let output = runner.run(&cmd)?;
    if !output.success {
        return Err(Error::ToolMissing {
            tool: "OpenSSL".into(),
            hint: format!("'{}' failed: {}", cmd, output.diagnostic()),
        });
    }
    Ok(output.stdout.trim().to_string())
}

/// Passphrase-protected RSA key (AES-256).
pub fn encrypted_key(key: &Path, bits: u32, passphrase: &str) -> Result<ToolCommand> {
    Ok(ToolCommand::new(OPENSSL)
        .args(["genrsa", "-aes256", "-passout"])
        .arg(format!("env:{}", PASSPHRASE_ENV))
        .args(["-out", path_to_str(key)?])
        .arg(bits.to_string())
        .secret_env(PASSPHRASE_ENV, passphrase))
}

/// Unprotected RSA key.
pub fn plain_key(key: &Path, bits: u32) -> Result<ToolCommand> {
    Ok(ToolCommand::new(OPENSSL)
        .args(["genrsa", "-out", path_to_str(key)?])
        .arg(bits.to_string()))
}

/// Self-signed CA certificate from a protected key.
pub fn self_signed_ca(
    key: &Path,
    cert: &Path,
    days: u32,
    digest: &str,
    subject: &str,
    passphrase: &str,
) -> Result<ToolCommand> {
    Ok(ToolCommand::new(OPENSSL)
        .args(["req", "-x509", "-new", "-key", path_to_str(key)?, "-passin"])
        .arg(format!("env:{}", PASSPHRASE_ENV))
        .arg(format!("-{}", digest))
        .args(["-days", &days.to_string(), "-subj", subject])
        .args(["-out", path_to_str(cert)?])
        .secret_env(PASSPHRASE_ENV, passphrase))
}

/// CSR for `domain`; SANs are added at signing time.
pub fn csr(key: &Path, csr: &Path, domain: &str) -> Result<ToolCommand> {
    Ok(ToolCommand::new(OPENSSL)
        .args(["req", "-new", "-key", path_to_str(key)?])
        .args(["-subj", &format!("/CN={}", domain)])
        .args(["-out", path_to_str(csr)?]))
}

/// Inputs for signing a CSR with the local CA.
pub struct SignRequest<'a> {
    pub csr: &'a Path,
    pub ca_cert: &'a Path,
    pub ca_key: &'a Path,
    pub ca_serial: &'a Path,
    pub ext: &'a Path,
    pub cert: &'a Path,
    pub days: u32,
    pub digest: &'a str,
}

/// Sign a CSR, creating the serial file on first use.
pub fn sign(req: &SignRequest<'_>, passphrase: &str) -> Result<ToolCommand> {
    Ok(ToolCommand::new(OPENSSL)
        .args(["x509", "-req", "-in", path_to_str(req.csr)?])
        .args(["-CA", path_to_str(req.ca_cert)?])
        .args(["-CAkey", path_to_str(req.ca_key)?, "-passin"])
        .arg(format!("env:{}", PASSPHRASE_ENV))
        .args(["-CAserial", path_to_str(req.ca_serial)?, "-CAcreateserial"])
        .args(["-out", path_to_str(req.cert)?])
        .args(["-days", &req.days.to_string()])
        .arg(format!("-{}", req.digest))
        .args(["-extfile", path_to_str(req.ext)?])
        .secret_env(PASSPHRASE_ENV, passphrase))
}

/// Run one generation step, tagging failures with `stage`.
pub(crate) fn run_step(runner: &dyn CommandRunner, stage: Stage, cmd: &ToolCommand) -> Result<()> {
    runner.run_checked(stage, cmd).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRunner;
    use std::path::PathBuf;

    #[test]
    fn test_require_fails_when_missing() {
        let runner = FakeRunner::new().missing("openssl");
        let err = require(&runner).expect_err("must fail");
        assert_eq!(err.kind(), crate::ErrorKind::ToolMissing);
        assert!(!is_available(&runner));
    }

    #[test]
    fn test_version_trims_output() {
        let runner = FakeRunner::new().respond("openssl version", "OpenSSL 3.0.13 30 Jan 2024\n");
        assert_eq!(
            version(&runner).expect("version"),
            "OpenSSL 3.0.13 30 Jan 2024"
        );
    }

    #[test]
    fn test_encrypted_key_keeps_passphrase_out_of_args() {
        let cmd = encrypted_key(Path::new("/c/myCA.key"), 2048, "s3cret-pass").expect("cmd");
        assert_eq!(
            cmd.to_string(),
            "openssl genrsa -aes256 -passout env:CERTPILOT_PASSPHRASE -out /c/myCA.key 2048"
        );
        assert!(cmd.args.iter().all(|a| !a.contains("s3cret-pass")));
        assert_eq!(cmd.env.len(), 1);
        assert_eq!(cmd.env[0].0, PASSPHRASE_ENV);
    }

    #[test]
    fn test_self_signed_ca_command() {
        let cmd = self_signed_ca(
            Path::new("/c/myCA.key"),
            Path::new("/c/myCA.pem"),
            1825,
            "sha256",
            "/CN=Local Development CA",
            "pw12",
        )
        .expect("cmd");
        assert!(cmd.has_arg("-x509"));
        assert!(cmd.has_arg("-sha256"));
        assert_eq!(cmd.arg_after("-days"), Some("1825"));
        assert_eq!(cmd.arg_after("-out"), Some("/c/myCA.pem"));
        assert_eq!(cmd.arg_after("-subj"), Some("/CN=Local Development CA"));
    }

    #[test]
    fn test_sign_command() {
        let base = PathBuf::from("/c");
        let req = SignRequest {
            csr: &base.join("example.test.csr"),
            ca_cert: &base.join("myCA.pem"),
            ca_key: &base.join("myCA.key"),
            ca_serial: &base.join("myCA.srl"),
            ext: &base.join("example.test.ext"),
            cert: &base.join("example.test.crt"),
            days: 825,
            digest: "sha256",
        };
        let cmd = sign(&req, "pw12").expect("cmd");
        assert_eq!(cmd.arg_after("-CA"), Some("/c/myCA.pem"));
        assert_eq!(cmd.arg_after("-CAkey"), Some("/c/myCA.key"));
        assert_eq!(cmd.arg_after("-CAserial"), Some("/c/myCA.srl"));
        assert!(cmd.has_arg("-CAcreateserial"));
        assert_eq!(cmd.arg_after("-days"), Some("825"));
        assert!(cmd.has_arg("-sha256"));
        assert_eq!(cmd.arg_after("-extfile"), Some("/c/example.test.ext"));
        assert_eq!(cmd.arg_after("-out"), Some("/c/example.test.crt"));
    }

    #[test]
    fn test_csr_has_no_passphrase() {
        let cmd = csr(
            Path::new("/c/example.test.key"),
            Path::new("/c/example.test.csr"),
            "example.test",
        )
        .expect("cmd");
        assert_eq!(cmd.arg_after("-subj"), Some("/CN=example.test"));
        assert!(cmd.env.is_empty());
    }
}
