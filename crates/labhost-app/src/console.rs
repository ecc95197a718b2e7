//! Line-oriented login flow used by the binary in place of a login window.

use std::io::{self, BufRead, Write};

use labhost_auth::{Account, AuthenticationGate, FailureReason, LoginOutcome};
use labhost_funnel::UiDispatcher;
use time::format_description::well_known::Rfc3339;

/// How the console flow ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleExit {
    /// An account signed in; the session layer takes over.
    SignedIn(Account),
    /// Input closed before a successful login.
    EndOfInput,
}

/// Prompts for credentials until a login succeeds or input ends.
pub struct ConsoleLogin<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> ConsoleLogin<R, W> {
    /// Creates a flow over the given streams.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Runs attempts through `ui` so a failing attempt never ends the loop.
    ///
    /// # Errors
    /// Returns I/O errors from the underlying streams.
    pub fn run(&mut self, gate: &AuthenticationGate, ui: &UiDispatcher) -> io::Result<ConsoleExit> {
        loop {
            let Some(identifier) = self.prompt("identifier: ")? else {
                return Ok(ConsoleExit::EndOfInput);
            };
            let Some(secret) = self.prompt("secret: ")? else {
                return Ok(ConsoleExit::EndOfInput);
            };

            let Some(outcome) = ui.run(|| gate.attempt_login(&identifier, &secret)) else {
                writeln!(self.output, "login could not be processed; please try again")?;
                continue;
            };
            writeln!(self.output, "{}", render_outcome(&outcome))?;
            if let LoginOutcome::Succeeded(account) = outcome {
                return Ok(ConsoleExit::SignedIn(account));
            }
        }
    }

    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

/// Text shown for a login outcome.
pub fn render_outcome(outcome: &LoginOutcome) -> String {
    match outcome {
        LoginOutcome::Succeeded(account) => {
            format!("welcome, {} ({:?})", account.display_name, account.role)
        }
        LoginOutcome::Locked { until } => format!(
            "account is locked until {}",
            until.format(&Rfc3339).unwrap_or_else(|_| until.to_string())
        ),
        LoginOutcome::Failed(FailureReason::EmptyIdentifier) => "identifier is required".to_string(),
        LoginOutcome::Failed(FailureReason::InvalidCredentials {
            locked_until: Some(until),
            ..
        }) => format!(
            "invalid identifier or secret; account locked until {}",
            until.format(&Rfc3339).unwrap_or_else(|_| until.to_string())
        ),
        LoginOutcome::Failed(FailureReason::InvalidCredentials {
            failed_attempts, ..
        }) => format!("invalid identifier or secret (attempt {failed_attempts})"),
    }
}
