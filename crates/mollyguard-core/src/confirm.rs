//! Hostname re-entry challenge in front of every guarded power action.

use crate::error::{MollyguardError, MollyguardResult};
use log::warn;
use std::io::{self, BufRead, IsTerminal, Write};

pub const HOSTNAME_PROMPT: &str = "Enter hostname: ";

/// Source of interactive answers.
pub trait Prompt {
    /// Whether a human can answer; `false` short-circuits the challenge.
    fn is_interactive(&self) -> bool;

    /// Show `question` and read one line. `Ok(None)` signals end of input.
    fn ask(&mut self, question: &str) -> io::Result<Option<String>>;
}

/// Reads answers from stdin and writes the question to stderr.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        io::stdin().is_terminal()
    }

    fn ask(&mut self, question: &str) -> io::Result<Option<String>> {
        let mut stderr = io::stderr();
        write!(stderr, "{question}")?;
        stderr.flush()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        if read == 0 {
            // keep the shell prompt off the question line after ^D
            writeln!(stderr).ok();
            return Ok(None);
        }
        Ok(Some(line))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConfirmationGate {
    enabled: bool,
}

impl ConfirmationGate {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Single-shot check that the operator typed exactly `expected_hostname`.
    ///
    /// Only the trailing line terminator is stripped; case, inner and
    /// surrounding whitespace all count.
    pub fn confirm<P: Prompt>(&self, expected_hostname: &str, prompt: &mut P) -> bool {
        if !self.enabled {
            return true;
        }

        if !prompt.is_interactive() {
            warn!("[MG3100] no terminal attached; refusing to confirm without a human");
            return false;
        }

        let answer = match prompt.ask(HOSTNAME_PROMPT) {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                warn!("[MG3100] hostname challenge aborted (end of input)");
                return false;
            }
            Err(err) => {
                warn!("[MG3100] failed to read hostname answer: {err}");
                return false;
            }
        };

        let answer = strip_line_terminator(&answer);
        if answer.is_empty() || answer != expected_hostname {
            warn!("[MG3100] wrong hostname entered; this host is \"{expected_hostname}\"");
            return false;
        }
        true
    }
}

fn strip_line_terminator(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .unwrap_or(line)
}

/// Kernel hostname as reported by `gethostname(2)`.
pub fn current_hostname() -> MollyguardResult<String> {
    let name = nix::unistd::gethostname()
        .map_err(|err| MollyguardError::Hostname(err.to_string()))?;
    name.into_string()
        .map_err(|raw| MollyguardError::Hostname(format!("hostname is not UTF-8: {raw:?}")))
}
