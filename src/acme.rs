// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Interactive DNS-01 issuance through certbot.
//!
//! The TXT record is created by the operator outside this tool; nothing
//! here checks DNS. certbot's exit status alone decides the outcome.

use crate::error::{Error, Result, Stage};
use crate::exec::{CommandRunner, ToolCommand};
use crate::host::{HostProfile, Privilege};
use crate::output::Output;
use crate::prompt::{Confirmation, Outcome, Prompter};
use std::path::PathBuf;

pub const MAX_EMAIL_ATTEMPTS: usize = 3;

/// Where certbot keeps issued certificates.
pub const LIVE_DIR: &str = "/etc/letsencrypt/live";

pub const COMMUNITY_SUPPORT_URL: &str = "https://community.letsencrypt.org";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceState {
    CollectEmail,
    ShowChallengeInstructions,
    ConfirmReady,
    Issue,
    Succeeded,
    /// The operator was not ready; certbot never ran.
    Declined,
}

/// One run of the flow. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceSession {
    pub domain: String,
    pub email: Option<String>,
    pub ready: bool,
}

impl IssuanceSession {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            email: None,
            ready: false,
        }
    }
}

/// certbot's certificate and key for a domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCertificate {
    pub fullchain: PathBuf,
    pub privkey: PathBuf,
}

impl LiveCertificate {
    pub fn for_domain(domain: &str) -> Self {
        let dir = PathBuf::from(LIVE_DIR).join(domain);
        Self {
            fullchain: dir.join("fullchain.pem"),
            privkey: dir.join("privkey.pem"),
        }
    }
}

/// Name of the TXT record that proves control of `domain`.
pub fn challenge_record(domain: &str) -> String {
    format!("_acme-challenge.{}", domain)
}

/// A contact email: non-empty and containing `@`.
pub fn validate_email(input: &str) -> Result<String> {
    let email = input.trim();
    let reason = if email.is_empty() {
        "email cannot be empty"
    } else if !email.contains('@') {
        "email must contain '@'"
    } else {
        return Ok(email.to_string());
    };
    Err(Error::InvalidEmail {
        email: email.to_string(),
        reason: reason.into(),
    })
}

pub fn issuance_command(domain: &str, email: &str, privilege: Privilege) -> ToolCommand {
    ToolCommand::new("certbot")
        .args(["certonly", "--manual", "--preferred-challenges", "dns"])
        .args(["-d", domain, "--email", email, "--agree-tos"])
        .interactive()
        .elevated(privilege)
}

fn collect_email(prompter: &dyn Prompter, out: &Output) -> Result<String> {
    let mut last_error = None;
    for attempt in 1..=MAX_EMAIL_ATTEMPTS {
        let input = prompter.input("Email for Let's Encrypt notices")?;
        match validate_email(&input) {
            Ok(email) => return Ok(email),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "rejected email");
                if attempt < MAX_EMAIL_ATTEMPTS {
                    out.warn(&e.to_string());
                }
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| Error::InvalidEmail {
        email: String::new(),
        reason: "no email entered".into(),
    }))
}

fn show_challenge_instructions(domain: &str, out: &Output) {
    out.print("");
    out.print("DNS-01 challenge");
    out.print(&format!(
        "  Create a TXT record named {} in your DNS provider.",
        challenge_record(domain)
    ));
    out.print("  certbot prints the value to put in it; wait until the record");
    out.print("  has propagated before letting certbot continue.");
    out.print("");
}

/// Drive the session from email collection to certbot's exit.
///
/// Declining the readiness check returns [`Outcome::Cancelled`] without
/// running certbot. A failed certbot run is not retried.
pub fn run_issuance(
    domain: &str,
    profile: &HostProfile,
    runner: &dyn CommandRunner,
    prompter: &dyn Prompter,
    out: &Output,
) -> Result<Outcome<LiveCertificate>> {
    let mut session = IssuanceSession::new(domain);
    let mut state = IssuanceState::CollectEmail;

    loop {
        tracing::debug!(?state, domain = %session.domain, "issuance");
        state = match state {
            IssuanceState::CollectEmail => {
                session.email = Some(collect_email(prompter, out)?);
                IssuanceState::ShowChallengeInstructions
            }
            IssuanceState::ShowChallengeInstructions => {
                show_challenge_instructions(&session.domain, out);
                IssuanceState::ConfirmReady
            }
            IssuanceState::ConfirmReady => {
                let confirmation = Confirmation::DnsRecordReady {
                    record: challenge_record(&session.domain),
                };
                session.ready = prompter.confirm(&confirmation)?;
                if session.ready {
                    IssuanceState::Issue
                } else {
                    IssuanceState::Declined
                }
            }
            IssuanceState::Issue => {
                let email = session.email.as_deref().unwrap_or_default();
                let cmd = issuance_command(&session.domain, email, profile.privilege);
                if let Err(e) = runner.run_checked(Stage::Issuance, &cmd) {
                    out.warn(&format!(
                        "certbot did not issue a certificate. Check the DNS record and \
                         ask for help at {}",
                        COMMUNITY_SUPPORT_URL
                    ));
                    return Err(e);
                }
                IssuanceState::Succeeded
            }
            IssuanceState::Succeeded => {
                tracing::info!(domain = %session.domain, "certificate issued by certbot");
                return Ok(Outcome::Completed(LiveCertificate::for_domain(
                    &session.domain,
                )));
            }
            IssuanceState::Declined => return Ok(Outcome::Cancelled),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LinuxDistro, PackageManager, Platform};
    use crate::prompt::ConfirmationKind;
    use crate::testing::{FakeRunner, ScriptedPrompter};
    use crate::ErrorKind;

    fn profile() -> HostProfile {
        HostProfile {
            platform: Platform::Linux(LinuxDistro::Debian),
            package_manager: Some(PackageManager::AptGet),
            privilege: Privilege::Sudo,
        }
    }

    fn run(runner: &FakeRunner, prompter: &ScriptedPrompter) -> Result<Outcome<LiveCertificate>> {
        run_issuance(
            "app.example.com",
            &profile(),
            runner,
            prompter,
            &Output::quiet(),
        )
    }

    #[test]
    fn test_challenge_record() {
        assert_eq!(
            challenge_record("app.example.com"),
            "_acme-challenge.app.example.com"
        );
    }

    #[test]
    fn test_validate_email() {
        assert_eq!(
            validate_email(" ops@example.com ").expect("valid"),
            "ops@example.com"
        );
        assert!(validate_email("").is_err());
        assert!(validate_email("   ").is_err());
        let err = validate_email("ops.example.com").expect_err("no @");
        assert_eq!(err.kind(), ErrorKind::ValidationFailure);
    }

    #[test]
    fn test_successful_issuance() {
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .input("ops@example.com")
            .answer(ConfirmationKind::DnsRecordReady, true);

        let live = run(&runner, &prompter)
            .expect("issue")
            .completed()
            .expect("not cancelled");

        assert_eq!(
            live.fullchain,
            PathBuf::from("/etc/letsencrypt/live/app.example.com/fullchain.pem")
        );
        assert_eq!(
            runner.command_lines(),
            vec!["sudo certbot certonly --manual --preferred-challenges dns -d app.example.com --email ops@example.com --agree-tos"]
        );
        assert!(runner.commands()[0].interactive);
        assert_eq!(
            prompter.asked(),
            vec![Confirmation::DnsRecordReady {
                record: "_acme-challenge.app.example.com".into()
            }]
        );
    }

    #[test]
    fn test_not_ready_skips_certbot() {
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .input("ops@example.com")
            .answer(ConfirmationKind::DnsRecordReady, false);

        let outcome = run(&runner, &prompter).expect("decline is ok");
        assert!(outcome.is_cancelled());
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_email_retried_until_valid() {
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .input("")
            .input("ops")
            .input("ops@example.com")
            .answer(ConfirmationKind::DnsRecordReady, true);

        run(&runner, &prompter).expect("issue");
        assert_eq!(prompter.input_prompts().len(), 3);
        assert_eq!(runner.count_matching("sudo certbot"), 1);
    }

    #[test]
    fn test_three_bad_emails_fail() {
        let runner = FakeRunner::new();
        let prompter = ScriptedPrompter::new()
            .input("a")
            .input("b")
            .input("c")
            .answer(ConfirmationKind::DnsRecordReady, true);

        let err = run(&runner, &prompter).expect_err("must fail");
        assert!(matches!(err, Error::InvalidEmail { .. }));
        assert!(prompter.asked().is_empty());
        assert!(runner.commands().is_empty());
    }

    #[test]
    fn test_certbot_failure_is_not_retried() {
        let runner = FakeRunner::new().fail_on(
            "sudo certbot",
            "Incorrect TXT record found at _acme-challenge.app.example.com",
        );
        let prompter = ScriptedPrompter::new()
            .input("ops@example.com")
            .answer(ConfirmationKind::DnsRecordReady, true);

        let err = run(&runner, &prompter).expect_err("must fail");
        match err {
            Error::Subprocess { stage, .. } => assert_eq!(stage, Stage::Issuance),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(runner.count_matching("sudo certbot"), 1);
    }
}
