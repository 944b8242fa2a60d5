//! Confirmation prompt for production deploys.
//!
//! Uses dialoguer for the prompt; the summary goes through a writer so it
//! can be checked in tests.

use std::io::{self, Write};

use anyhow::Result;
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};

use stagehand_core::types::Stage;

pub struct DeployPrompt<W: Write = io::Stderr> {
    writer: W,
    theme: ColorfulTheme,
}

impl DeployPrompt<io::Stderr> {
    pub fn new() -> Self {
        Self {
            writer: io::stderr(),
            theme: ColorfulTheme::default(),
        }
    }
}

impl<W: Write> DeployPrompt<W> {
    /// Create a prompt with a custom writer (for testing).
    #[cfg(test)]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            theme: ColorfulTheme::default(),
        }
    }

    pub fn print_summary(&mut self, stage: Stage, environments: &[String]) -> Result<()> {
        writeln!(self.writer)?;
        writeln!(
            self.writer,
            "{}",
            style(format!("  Deploying {}", stage)).bold().red()
        )?;
        if environments.is_empty() {
            writeln!(self.writer, "  Environments: {}", style("(none configured)").dim())?;
        } else {
            writeln!(
                self.writer,
                "  Environments: {}",
                style(environments.join(", ")).yellow()
            )?;
        }
        writeln!(self.writer)?;
        Ok(())
    }

    /// Show the summary and ask. Defaults to no.
    pub fn confirm(&mut self, stage: Stage, environments: &[String]) -> Result<bool> {
        self.print_summary(stage, environments)?;
        let confirmed = Confirm::with_theme(&self.theme)
            .with_prompt(format!("Deploy to {}?", stage))
            .default(false)
            .interact()
            .map_err(|e| anyhow::anyhow!("{} (pass --yes to skip the prompt)", e))?;
        Ok(confirmed)
    }
}
