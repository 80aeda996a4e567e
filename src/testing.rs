// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

//! Test doubles for the subprocess and prompt seams.

use crate::error::{Error, Result};
use crate::exec::{CommandRunner, ToolCommand, ToolOutput};
use crate::prompt::{Confirmation, ConfirmationKind, Prompter};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use zeroize::Zeroizing;

/// Records commands instead of running them.
///
/// Successful `openssl` invocations write their `-out`, `-keyout` and
/// `-CAserial` files, so flows observe the same files a real run leaves.
#[derive(Default)]
pub(crate) struct FakeRunner {
    commands: RefCell<Vec<ToolCommand>>,
    failures: Vec<(String, String)>,
    missing: Vec<String>,
    responses: Vec<(String, String)>,
    counter: Cell<u32>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands whose rendered line starts with `prefix` exit 1 with `stderr`.
    pub fn fail_on(mut self, prefix: &str, stderr: &str) -> Self {
        self.failures.push((prefix.into(), stderr.into()));
        self
    }

    /// `program` cannot be spawned.
    pub fn missing(mut self, program: &str) -> Self {
        self.missing.push(program.into());
        self
    }

    /// Commands whose rendered line starts with `prefix` print `stdout`.
    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses.push((prefix.into(), stdout.into()));
        self
    }

    pub fn commands(&self) -> Vec<ToolCommand> {
        self.commands.borrow().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.commands.borrow().iter().map(|c| c.to_string()).collect()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.command_lines()
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    fn materialize(&self, command: &ToolCommand) {
        if command.program != "openssl" {
            return;
        }
        for flag in ["-out", "-keyout", "-CAserial"] {
            if let Some(path) = command.arg_after(flag) {
                let n = self.counter.get() + 1;
                self.counter.set(n);
                let _ = std::fs::write(
                    path,
                    format!("fake {} output #{}\n", command.args[0], n),
                );
            }
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &ToolCommand) -> Result<ToolOutput> {
        self.commands.borrow_mut().push(command.clone());

        if self.missing.contains(&command.program) {
            return Err(Error::CommandNotFound {
                command: command.program.clone(),
                hint: crate::exec::install_hint(&command.program),
            });
        }

        let line = command.to_string();
        if let Some((_, stderr)) = self.failures.iter().find(|(p, _)| line.starts_with(p)) {
            return Ok(ToolOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: stderr.clone(),
            });
        }

        self.materialize(command);

        let stdout = self
            .responses
            .iter()
            .find(|(p, _)| line.starts_with(p))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(ToolOutput {
            success: true,
            code: Some(0),
            stdout,
            stderr: String::new(),
        })
    }
}

/// Answers prompts from a script and records what was asked.
#[derive(Default)]
pub(crate) struct ScriptedPrompter {
    answers: RefCell<HashMap<ConfirmationKind, VecDeque<bool>>>,
    inputs: RefCell<VecDeque<String>>,
    password: Option<String>,
    asked: RefCell<Vec<Confirmation>>,
    input_prompts: RefCell<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(self, kind: ConfirmationKind, answer: bool) -> Self {
        self.answers
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push_back(answer);
        self
    }

    pub fn input(self, value: &str) -> Self {
        self.inputs.borrow_mut().push_back(value.into());
        self
    }

    pub fn password(mut self, value: &str) -> Self {
        self.password = Some(value.into());
        self
    }

    pub fn asked(&self) -> Vec<Confirmation> {
        self.asked.borrow().clone()
    }

    pub fn asked_kinds(&self) -> Vec<ConfirmationKind> {
        self.asked.borrow().iter().map(Confirmation::kind).collect()
    }

    pub fn input_prompts(&self) -> Vec<String> {
        self.input_prompts.borrow().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, confirmation: &Confirmation) -> Result<bool> {
        self.asked.borrow_mut().push(confirmation.clone());
        self.answers
            .borrow_mut()
            .get_mut(&confirmation.kind())
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| Error::Prompt(format!("unscripted confirmation: {:?}", confirmation)))
    }

    fn input(&self, prompt: &str) -> Result<String> {
        self.input_prompts.borrow_mut().push(prompt.into());
        self.inputs
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| Error::Prompt(format!("unscripted input: {}", prompt)))
    }

    fn password(&self, _prompt: &str, _confirm: bool) -> Result<Zeroizing<String>> {
        self.password
            .clone()
            .map(Zeroizing::new)
            .ok_or_else(|| Error::Prompt("unscripted password".into()))
    }
}
