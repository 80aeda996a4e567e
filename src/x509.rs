// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Parse X.509 certificates produced by OpenSSL for summaries.

use crate::error::{Error, Result};
use std::path::Path;
use x509_parser::prelude::*;

#[derive(Debug, Clone)]
pub struct CertInfo {
    pub not_after_timestamp: i64,
    pub not_before_timestamp: i64,
    pub common_name: Option<String>,
    pub issuer_common_name: Option<String>,
    /// DNS and IP entries of the Subject Alternative Name extension.
    pub subject_alt_names: Vec<String>,
    pub is_ca: bool,
}

impl CertInfo {
    pub fn expiry_string(&self) -> String {
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(dt) => format!("{}-{:02}-{:02}", dt.year(), dt.month() as u8, dt.day()),
            Err(_) => "Invalid date".to_string(),
        }
    }

    pub fn days_remaining(&self) -> i64 {
        let now = ::time::OffsetDateTime::now_utc();
        match ::time::OffsetDateTime::from_unix_timestamp(self.not_after_timestamp) {
            Ok(expiry) => (expiry - now).whole_days(),
            Err(_) => -1,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.days_remaining() < 0
    }
}

pub fn parse_cert_file(path: &Path) -> Result<CertInfo> {
    let pem_data = std::fs::read_to_string(path).map_err(|e| Error::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_cert_pem(&pem_data)
}

pub fn parse_cert_pem(pem_str: &str) -> Result<CertInfo> {
    let pem = ::pem::parse(pem_str)
        .map_err(|e| Error::CertParse(format!("Failed to parse PEM: {}", e)))?;

    if pem.tag() != "CERTIFICATE" {
        return Err(Error::CertParse(format!(
            "Expected CERTIFICATE, got {}",
            pem.tag()
        )));
    }

    let (_, cert) = X509Certificate::from_der(pem.contents())
        .map_err(|e| Error::CertParse(format!("Invalid X.509: {}", e)))?;

    let first_cn = |name: &X509Name<'_>| {
        name.iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(String::from)
    };

    let mut subject_alt_names = Vec::new();
    let mut is_ca = false;

    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => subject_alt_names.push(dns.to_string()),
                        GeneralName::IPAddress(ip_bytes) if ip_bytes.len() == 4 => {
                            let ip = std::net::Ipv4Addr::new(
                                ip_bytes[0],
                                ip_bytes[1],
                                ip_bytes[2],
                                ip_bytes[3],
                            );
                            subject_alt_names.push(ip.to_string());
                        }
                        GeneralName::IPAddress(ip_bytes) if ip_bytes.len() == 16 => {
                            if let Ok(bytes) = <[u8; 16]>::try_from(*ip_bytes) {
                                subject_alt_names.push(std::net::Ipv6Addr::from(bytes).to_string());
                            }
                        }
                        _ => {}
                    }
                }
            }
            ParsedExtension::BasicConstraints(bc) => {
                is_ca = bc.ca;
            }
            _ => {}
        }
    }

    Ok(CertInfo {
        not_after_timestamp: cert.validity().not_after.timestamp(),
        not_before_timestamp: cert.validity().not_before.timestamp(),
        common_name: first_cn(cert.subject()),
        issuer_common_name: first_cn(cert.issuer()),
        subject_alt_names,
        is_ca,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

    fn self_signed(names: &[&str], days: i64, ca: bool) -> String {
        let key = KeyPair::generate().expect("key");
        let mut params =
            CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
                .expect("params");
        params
            .distinguished_name
            .push(DnType::CommonName, names.first().copied().unwrap_or("Test CA"));
        if ca {
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        }
        let now = ::time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + ::time::Duration::days(days);
        params.self_signed(&key).expect("cert").pem()
    }

    #[test]
    fn test_parse_domain_cert() {
        let pem = self_signed(&["example.test"], 825, false);
        let info = parse_cert_pem(&pem).expect("parse");

        assert!(info.days_remaining() >= 824);
        assert!(info.days_remaining() <= 825);
        assert!(!info.is_expired());
        assert_eq!(info.common_name, Some("example.test".to_string()));
        assert_eq!(info.subject_alt_names, vec!["example.test".to_string()]);
        assert!(!info.is_ca);
    }

    #[test]
    fn test_parse_ca_cert() {
        let pem = self_signed(&[], 1825, true);
        let info = parse_cert_pem(&pem).expect("parse");
        assert!(info.is_ca);
        assert!(info.subject_alt_names.is_empty());
        assert_eq!(info.issuer_common_name, Some("Test CA".to_string()));
    }

    #[test]
    fn test_expiry_string() {
        let pem = self_signed(&["example.test"], 30, false);
        let expiry = parse_cert_pem(&pem).expect("parse").expiry_string();
        assert_eq!(expiry.len(), 10);
        assert_eq!(expiry.chars().nth(4), Some('-'));
        assert_eq!(expiry.chars().nth(7), Some('-'));
    }

    #[test]
    fn test_rejects_non_certificate_pem() {
        let pem = "-----BEGIN CERTIFICATE REQUEST-----\nAAAA\n-----END CERTIFICATE REQUEST-----\n";
        assert!(matches!(parse_cert_pem(pem), Err(Error::CertParse(_))));
        assert!(parse_cert_pem("not pem at all").is_err());
    }
}
