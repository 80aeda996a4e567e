// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Operator interaction.
//!
//! Flows decide *which* [`Confirmation`] they need from filesystem and host
//! state; a [`Prompter`] decides *how* the answer is obtained.

use crate::error::{Error, Result};
use crate::host::Tool;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input};
use std::io::IsTerminal;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// Environment variable consulted before prompting for the CA passphrase.
pub const CA_PASSWORD_ENV: &str = "CERTPILOT_CA_PASSWORD";

/// Result of a flow the operator may decline part-way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    /// The operator declined a confirmation; nothing further was changed.
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    OverwriteCa { cert: PathBuf },
    OverwriteDomainCertificate { domain: String },
    DeleteTemporaryFiles { files: Vec<PathBuf> },
    InstallTool { tool: Tool },
    OverwriteSite { path: PathBuf },
    DnsRecordReady { record: String },
}

/// Variant tag of a [`Confirmation`], for matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfirmationKind {
    OverwriteCa,
    OverwriteDomainCertificate,
    DeleteTemporaryFiles,
    InstallTool,
    OverwriteSite,
    DnsRecordReady,
}

impl Confirmation {
    pub fn kind(&self) -> ConfirmationKind {
        match self {
            Confirmation::OverwriteCa { .. } => ConfirmationKind::OverwriteCa,
            Confirmation::OverwriteDomainCertificate { .. } => {
                ConfirmationKind::OverwriteDomainCertificate
            }
            Confirmation::DeleteTemporaryFiles { .. } => ConfirmationKind::DeleteTemporaryFiles,
            Confirmation::InstallTool { .. } => ConfirmationKind::InstallTool,
            Confirmation::OverwriteSite { .. } => ConfirmationKind::OverwriteSite,
            Confirmation::DnsRecordReady { .. } => ConfirmationKind::DnsRecordReady,
        }
    }

    pub fn question(&self) -> String {
        match self {
            Confirmation::OverwriteCa { cert } => format!(
                "A CA already exists at {}. Overwrite it? Certificates it signed will stop validating",
                cert.display()
            ),
            Confirmation::OverwriteDomainCertificate { domain } => {
                format!("A certificate or key for {} already exists. Overwrite it?", domain)
            }
            Confirmation::DeleteTemporaryFiles { files } => {
                let names: Vec<String> = files
                    .iter()
                    .map(|f| {
                        f.file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| f.display().to_string())
                    })
                    .collect();
                format!("Delete temporary files ({})?", names.join(", "))
            }
            Confirmation::InstallTool { tool } => format!("{} is not installed. Install it now?", tool),
            Confirmation::OverwriteSite { path } => {
                format!("{} already exists. Replace it?", path.display())
            }
            Confirmation::DnsRecordReady { record } => format!(
                "Have you created the TXT record {} and are you ready to continue?",
                record
            ),
        }
    }

    /// Answer offered when the operator just presses enter.
    pub fn default_answer(&self) -> bool {
        matches!(
            self,
            Confirmation::DeleteTemporaryFiles { .. } | Confirmation::InstallTool { .. }
        )
    }

    /// Answer taken when stdin is not a terminal. Only removing temporary
    /// files proceeds; installs, overwrites and DNS readiness need a person.
    pub fn answer_without_terminal(&self) -> bool {
        matches!(self, Confirmation::DeleteTemporaryFiles { .. })
    }
}

pub trait Prompter {
    fn confirm(&self, confirmation: &Confirmation) -> Result<bool>;

    /// Free-text answer, trimmed.
    fn input(&self, prompt: &str) -> Result<String>;

    /// Hidden input. With `confirm`, the secret is asked twice and must match.
    fn password(&self, prompt: &str, confirm: bool) -> Result<Zeroizing<String>>;
}

/// Interactive terminal prompts.
///
/// Without a terminal on stdin, every confirmation except temporary-file
/// cleanup is declined.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl TerminalPrompter {
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, confirmation: &Confirmation) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            let answer = confirmation.answer_without_terminal();
            tracing::debug!(kind = ?confirmation.kind(), answer, "no terminal to ask");
            return Ok(answer);
        }

        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(confirmation.question())
            .default(confirmation.default_answer())
            .interact()
            .map_err(|e| Error::Prompt(e.to_string()))?;
        tracing::debug!(kind = ?confirmation.kind(), answer, "confirmation");
        Ok(answer)
    }

    fn input(&self, prompt: &str) -> Result<String> {
        let value: String = Input::with_theme(&self.theme)
            .with_prompt(prompt)
            .interact_text()
            .map_err(|e| Error::Prompt(e.to_string()))?;
        Ok(value.trim().to_string())
    }

    fn password(&self, prompt: &str, confirm: bool) -> Result<Zeroizing<String>> {
        if let Ok(value) = std::env::var(CA_PASSWORD_ENV) {
            return Ok(Zeroizing::new(value));
        }

        let password = Zeroizing::new(
            rpassword::prompt_password(prompt).map_err(|e| Error::Prompt(e.to_string()))?,
        );

        if confirm {
            let again = Zeroizing::new(
                rpassword::prompt_password("Confirm passphrase: ")
                    .map_err(|e| Error::Prompt(e.to_string()))?,
            );
            if *password != *again {
                return Err(Error::Password("passphrases do not match".into()));
            }
        }

        Ok(password)
    }
}
