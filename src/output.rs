// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

/// Output helper that respects --quiet and --verbose flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    quiet: bool,
    verbose: bool,
}

impl Output {
    pub fn new(quiet: bool, verbose: bool) -> Self {
        Self { quiet, verbose }
    }

    /// Output that prints nothing but warnings.
    pub fn quiet() -> Self {
        Self::new(true, false)
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Print a standard message (suppressed with --quiet)
    pub fn print(&self, msg: &str) {
        if !self.quiet {
            println!("{}", msg);
        }
    }

    /// Print a verbose message (only shown with --verbose)
    pub fn verbose(&self, msg: &str) {
        if self.verbose && !self.quiet {
            println!("{}", msg);
        }
    }

    /// Warnings are never suppressed.
    pub fn warn(&self, msg: &str) {
        eprintln!("Warning: {}", msg);
    }
}
