// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! How to trust the local CA on each platform.
//!
//! This only produces instructions; nothing is installed.

use crate::host::{LinuxDistro, Platform};
use std::path::{Path, PathBuf};

const TRUST_STORE_CERT_NAME: &str = "certpilot-local-ca.crt";

impl LinuxDistro {
    fn trust_store_dir(&self) -> Option<&'static Path> {
        match self {
            LinuxDistro::Debian => Some(Path::new("/usr/local/share/ca-certificates")),
            LinuxDistro::Fedora => Some(Path::new("/etc/pki/ca-trust/source/anchors")),
            LinuxDistro::Arch => Some(Path::new("/etc/ca-certificates/trust-source/anchors")),
            LinuxDistro::Unknown => None,
        }
    }

    fn trust_update_command(&self) -> Option<&'static str> {
        match self {
            LinuxDistro::Debian => Some("update-ca-certificates"),
            LinuxDistro::Fedora => Some("update-ca-trust extract"),
            LinuxDistro::Arch => Some("trust extract-compat"),
            LinuxDistro::Unknown => None,
        }
    }
}

/// Install instructions for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guidance {
    pub title: String,
    pub steps: Vec<String>,
    /// True for the platform this process runs on.
    pub current: bool,
}

/// Windows, macOS and Linux instructions for trusting `ca_cert`.
/// The Linux section follows the detected distribution when running on Linux.
pub fn install_guidance(ca_cert: &Path, platform: &Platform) -> Vec<Guidance> {
    let cert = ca_cert.display();

    let windows = Guidance {
        title: "Windows".into(),
        steps: vec![
            "From an elevated Command Prompt:".into(),
            format!("  certutil -addstore -f ROOT \"{}\"", cert),
            "Or double-click the .pem file, choose 'Install Certificate', Local Machine, \
             'Trusted Root Certification Authorities'."
                .into(),
        ],
        current: *platform == Platform::Windows,
    };

    let macos = Guidance {
        title: "macOS".into(),
        steps: vec![
            format!(
                "  sudo security add-trusted-cert -d -r trustRoot -k /Library/Keychains/System.keychain \"{}\"",
                cert
            ),
            "Or open Keychain Access, import the file into System, and set it to 'Always Trust'."
                .into(),
        ],
        current: *platform == Platform::MacOs,
    };

    let distro = match platform {
        Platform::Linux(distro) if *distro != LinuxDistro::Unknown => *distro,
        _ => LinuxDistro::Debian,
    };

    let mut linux_steps = Vec::new();
    if let (Some(dir), Some(update)) = (distro.trust_store_dir(), distro.trust_update_command()) {
        let dest: PathBuf = dir.join(TRUST_STORE_CERT_NAME);
        linux_steps.push(format!("  sudo cp \"{}\" {}", cert, dest.display()));
        linux_steps.push(format!("  sudo {}", update));
    }
    linux_steps.push(
        "Firefox keeps its own store: Settings > Privacy & Security > Certificates > \
         View Certificates > Authorities > Import."
            .into(),
    );

    let linux_title = match distro {
        LinuxDistro::Fedora => "Linux (Fedora/RHEL)",
        LinuxDistro::Arch => "Linux (Arch)",
        _ => "Linux (Debian/Ubuntu)",
    };

    let linux = Guidance {
        title: linux_title.into(),
        steps: linux_steps,
        current: matches!(platform, Platform::Linux(_)),
    };

    vec![windows, macos, linux]
}
