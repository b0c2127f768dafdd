//! Local prompts: interactive terminal and fixed-answer policy.

use std::io::IsTerminal;
use std::sync::Mutex;

use dialoguer::Select;
use tracing::warn;

use permbroker_core::Verdict;

use super::{PromptSummary, SyncPrompt};

/// Interactive prompt on the controlling terminal.
///
/// Denies without asking when stdin is not a terminal.
pub struct TerminalPrompt {
    choices: &'static [(&'static str, Verdict)],
    // One question on the terminal at a time.
    terminal: Mutex<()>,
}

const BINARY_CHOICES: &[(&str, Verdict)] = &[("Allow", Verdict::Allow), ("Deny", Verdict::Deny)];

const THREE_WAY_CHOICES: &[(&str, Verdict)] = &[
    ("Allow", Verdict::Allow),
    ("Always allow this tool", Verdict::AllowAlways),
    ("Deny", Verdict::Deny),
];

impl TerminalPrompt {
    /// Allow / Deny.
    pub const fn binary() -> Self {
        Self {
            choices: BINARY_CHOICES,
            terminal: Mutex::new(()),
        }
    }

    /// Allow / Always allow / Deny.
    pub const fn with_always() -> Self {
        Self {
            choices: THREE_WAY_CHOICES,
            terminal: Mutex::new(()),
        }
    }
}

impl SyncPrompt for TerminalPrompt {
    fn ask(&self, summary: &PromptSummary) -> anyhow::Result<i64> {
        if !std::io::stdin().is_terminal() {
            warn!(
                tool_name = %summary.tool_name,
                "No terminal attached, denying permission request"
            );
            return Ok(Verdict::Deny.code());
        }

        let _terminal = self
            .terminal
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let labels: Vec<&str> = self.choices.iter().map(|(label, _)| *label).collect();
        let selection = Select::new()
            .with_prompt(summary.render())
            .items(&labels)
            .default(0)
            .interact_opt()?;

        // Escape counts as a refusal.
        let verdict = selection
            .and_then(|index| self.choices.get(index))
            .map_or(Verdict::Deny, |(_, verdict)| *verdict);
        Ok(verdict.code())
    }
}

/// Answers every request with the same verdict.
///
/// Used for unattended runs (`--prompt deny`) and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticPrompt {
    verdict: Verdict,
}

impl StaticPrompt {
    pub const fn new(verdict: Verdict) -> Self {
        Self { verdict }
    }
}

impl SyncPrompt for StaticPrompt {
    fn ask(&self, _summary: &PromptSummary) -> anyhow::Result<i64> {
        Ok(self.verdict.code())
    }
}
