// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current config file version. Increment when making breaking changes.
const CONFIG_VERSION: u32 = 1;

/// Maximum validity accepted for either the CA or a domain certificate (10 years).
pub const MAX_DAYS: u32 = 3650;

const ALLOWED_KEY_BITS: &[u32] = &[2048, 3072, 4096];
const ALLOWED_DIGESTS: &[&str] = &["sha256", "sha384", "sha512"];

pub const CA_KEY_FILE: &str = "myCA.key";
pub const CA_CERT_FILE: &str = "myCA.pem";
pub const CA_SERIAL_FILE: &str = "myCA.srl";
const STORAGE_DIR_NAME: &str = "certs";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    #[serde(default = "default_ca_days")]
    pub ca_days: u32,
    #[serde(default = "default_cert_days")]
    pub cert_days: u32,
    #[serde(default = "default_key_bits")]
    pub key_bits: u32,
    #[serde(default = "default_digest")]
    pub digest: String,
    /// Subject passed to `openssl req -subj` for the CA certificate
    #[serde(default = "default_ca_subject")]
    pub ca_subject: String,
    #[serde(default)]
    pub nginx: NginxConfig,
}

/// Where nginx keeps site definitions and how generated sites proxy upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NginxConfig {
    #[serde(default = "default_sites_available")]
    pub sites_available: PathBuf,
    #[serde(default = "default_sites_enabled")]
    pub sites_enabled: PathBuf,
    #[serde(default = "default_proxy_timeout_secs")]
    pub proxy_timeout_secs: u32,
    #[serde(default = "default_upstream_host")]
    pub upstream_host: String,
}

impl Default for NginxConfig {
    fn default() -> Self {
        Self {
            sites_available: default_sites_available(),
            sites_enabled: default_sites_enabled(),
            proxy_timeout_secs: default_proxy_timeout_secs(),
            upstream_host: default_upstream_host(),
        }
    }
}

fn default_config_version() -> u32 {
    CONFIG_VERSION
}

fn default_ca_days() -> u32 {
    1825
}

fn default_cert_days() -> u32 {
    825
}

fn default_key_bits() -> u32 {
    2048
}

fn default_digest() -> String {
    "sha256".into()
}

fn default_ca_subject() -> String {
    "/CN=Local Development CA/O=certpilot".into()
}

fn default_sites_available() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-available")
}

fn default_sites_enabled() -> PathBuf {
    PathBuf::from("/etc/nginx/sites-enabled")
}

fn default_proxy_timeout_secs() -> u32 {
    90
}

fn default_upstream_host() -> String {
    "127.0.0.1".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_version: CONFIG_VERSION,
            ca_days: default_ca_days(),
            cert_days: default_cert_days(),
            key_bits: default_key_bits(),
            digest: default_digest(),
            ca_subject: default_ca_subject(),
            nginx: NginxConfig::default(),
        }
    }
}

/// File locations for one domain certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainPaths {
    pub key: PathBuf,
    pub csr: PathBuf,
    pub ext: PathBuf,
    pub cert: PathBuf,
}

impl DomainPaths {
    /// CSR and extension file, offered for deletion after issuance.
    pub fn temporary(&self) -> [&Path; 2] {
        [&self.csr, &self.ext]
    }
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
    pub ca_key: PathBuf,
    pub ca_cert: PathBuf,
    pub ca_serial: PathBuf,
    pub config: PathBuf,
}

impl Paths {
    pub fn new() -> Result<Self> {
        Ok(Self::with_base(Self::base_dir()?))
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self {
            ca_key: base.join(CA_KEY_FILE),
            ca_cert: base.join(CA_CERT_FILE),
            ca_serial: base.join(CA_SERIAL_FILE),
            config: base.join("config.toml"),
            base,
        }
    }

    /// Sanitize a domain name for safe use in file paths.
    /// Wildcard domains (e.g., `*.example.test`) map `*` to `_wildcard_`.
    fn sanitize_domain_for_filename(domain: &str) -> Result<String> {
        let reject = |reason: &str| {
            Err(Error::InvalidDomain {
                domain: domain.to_string(),
                reason: reason.into(),
            })
        };

        if domain.is_empty() {
            return reject("domain cannot be empty");
        }
        if domain.contains('\0') {
            return reject("domain contains null byte");
        }
        if domain.contains('%') {
            return reject("domain contains percent encoding (potential path traversal)");
        }
        if domain.contains("..") {
            return reject("domain contains path traversal sequence");
        }
        if domain.contains('/') || domain.contains('\\') {
            return reject("domain contains path separator");
        }
        if domain.starts_with('.') || domain.ends_with('.') {
            return reject("domain cannot start or end with a dot");
        }

        let sanitized = domain.replace('*', "_wildcard_");

        for c in sanitized.chars() {
            if !c.is_ascii_alphanumeric() && c != '.' && c != '-' && c != '_' {
                return Err(Error::InvalidDomain {
                    domain: domain.to_string(),
                    reason: format!("domain contains invalid character: '{}'", c),
                });
            }
        }

        Ok(sanitized)
    }

    fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_root) = std::env::var("CERTPILOT_ROOT") {
            let path = PathBuf::from(&custom_root);
            if !path.is_absolute() {
                return Err(Error::Config(format!(
                    "CERTPILOT_ROOT must be an absolute path, got: {}",
                    custom_root
                )));
            }
            return Ok(path);
        }

        // Under sudo, keep certificates in the invoking user's home
        #[cfg(unix)]
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            if sudo_user
                .chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
            {
                let user_home = PathBuf::from("/home").join(&sudo_user);
                if user_home.is_dir() {
                    return Ok(user_home.join(STORAGE_DIR_NAME));
                }
            }
        }

        BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(STORAGE_DIR_NAME))
            .ok_or_else(|| {
                Error::Config(
                    "Could not determine home directory. Set CERTPILOT_ROOT to an absolute path."
                        .into(),
                )
            })
    }

    pub fn domain(&self, domain: &str) -> Result<DomainPaths> {
        let safe = Self::sanitize_domain_for_filename(domain)?;
        Ok(DomainPaths {
            key: self.base.join(format!("{}.key", safe)),
            csr: self.base.join(format!("{}.csr", safe)),
            ext: self.base.join(format!("{}.ext", safe)),
            cert: self.base.join(format!("{}.crt", safe)),
        })
    }

    pub fn ensure_dir(&self) -> Result<()> {
        crate::fs::ensure_storage_dir(&self.base)
    }

    pub fn ca_exists(&self) -> bool {
        self.ca_key.is_file() && self.ca_cert.is_file()
    }
}

impl Config {
    /// Load `config.toml` if present, defaults otherwise. Never writes.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
            toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.config_version > CONFIG_VERSION {
            tracing::warn!(
                found = self.config_version,
                supported = CONFIG_VERSION,
                "config.toml is newer than this version of certpilot; some settings may be ignored"
            );
        }

        validate_days("ca_days", self.ca_days)?;
        validate_days("cert_days", self.cert_days)?;

        if !ALLOWED_KEY_BITS.contains(&self.key_bits) {
            return Err(Error::Config(format!(
                "key_bits must be one of {:?}, got {}",
                ALLOWED_KEY_BITS, self.key_bits
            )));
        }

        if !ALLOWED_DIGESTS.contains(&self.digest.as_str()) {
            return Err(Error::Config(format!(
                "digest must be one of {:?}, got '{}'",
                ALLOWED_DIGESTS, self.digest
            )));
        }

        if !self.ca_subject.starts_with('/') {
            return Err(Error::Config(
                "ca_subject must be in OpenSSL '/CN=.../O=...' form".into(),
            ));
        }

        if self.nginx.proxy_timeout_secs == 0 {
            return Err(Error::Config(
                "nginx.proxy_timeout_secs must be at least 1".into(),
            ));
        }
        if !self.nginx.sites_available.is_absolute() || !self.nginx.sites_enabled.is_absolute() {
            return Err(Error::Config(
                "nginx.sites_available and nginx.sites_enabled must be absolute paths".into(),
            ));
        }
        if self.nginx.upstream_host.trim().is_empty() {
            return Err(Error::Config("nginx.upstream_host cannot be empty".into()));
        }

        Ok(())
    }
}

/// Validate that a validity period is within allowed bounds.
pub fn validate_days(field: &str, days: u32) -> Result<()> {
    if days == 0 {
        return Err(Error::InvalidDays(format!("{} cannot be 0", field)));
    }
    if days > MAX_DAYS {
        return Err(Error::InvalidDays(format!(
            "{} cannot exceed {} (10 years)",
            field, MAX_DAYS
        )));
    }
    Ok(())
}
