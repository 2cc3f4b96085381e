//! Console output formatting.
//!
//! Every line the user sees goes through [`OutputFormatter`], so styling and the
//! dry-run prefix stay consistent across actions. Diagnostics for skipped
//! entries go through `log` instead.

use crate::relocator::RunMode;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Prefix printed in front of every action that was only simulated.
pub const DRY_RUN_PREFIX: &str = "[DRY-RUN] ";

/// Manages all CLI output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a regular message without styling.
    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints an intended or performed mutation.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidy::output::OutputFormatter;
    /// use tidy::relocator::RunMode;
    ///
    /// // Prints "[DRY-RUN] delete /tmp/a.txt"
    /// OutputFormatter::action("delete /tmp/a.txt", RunMode::DryRun);
    /// ```
    pub fn action(message: &str, mode: RunMode) {
        println!("{}", Self::action_line(message, mode));
    }

    /// The text [`action`](Self::action) prints, without styling.
    pub fn action_line(message: &str, mode: RunMode) -> String {
        match mode {
            RunMode::DryRun => format!("{}{}", DRY_RUN_PREFIX, message),
            RunMode::Apply => message.to_string(),
        }
    }

    /// Creates a progress bar for hashing and other per-file work.
    ///
    /// Hidden automatically when stderr is not a terminal.
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("█▓░"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb
    }

    /// Prints a two-column summary of per-action counts.
    ///
    /// Rows are printed in the order given.
    pub fn summary_table(rows: &[(String, String)]) {
        Self::header("SUMMARY");

        let width = rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(6);

        println!("{:<width$} | {}", "Action".bold(), "Result".bold(), width = width);
        println!("{}", "-".repeat(width + 30));
        for (name, value) in rows {
            println!("{:<width$} | {}", name, value.green(), width = width);
        }
    }

    /// Prints the closing note for a dry run.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("{}{}", DRY_RUN_PREFIX, message).yellow());
    }
}
