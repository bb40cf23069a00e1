//! Confirmation prompts.

use std::io::{BufRead, Write};

/// Yes/no questions, selections, and free-text prompts.
///
/// Non-interactive implementations return defaults without blocking.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, prompt: &str, default: bool) -> bool;
    fn select_one(&self, prompt: &str, options: &[String]) -> Option<String>;
    fn prompt_text(&self, prompt: &str, default: &str) -> String;
}

/// Returns defaults without blocking; used for `--non-interactive` runs and
/// in tests.
pub struct AutoConfirmer;

impl Confirmer for AutoConfirmer {
    fn confirm(&self, _prompt: &str, default: bool) -> bool {
        default
    }

    fn select_one(&self, _prompt: &str, options: &[String]) -> Option<String> {
        options.first().cloned()
    }

    fn prompt_text(&self, _prompt: &str, default: &str) -> String {
        default.to_string()
    }
}

/// Plain stdin-line confirmer for interactive runs.
pub struct StdinConfirmer;

impl StdinConfirmer {
    fn read_line(&self) -> Option<String> {
        let stdin = std::io::stdin();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim().to_string()),
            Err(_) => None,
        }
    }
}

impl Confirmer for StdinConfirmer {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        let hint = if default { "Y/n" } else { "y/N" };
        eprint!("{} [{}] ", prompt, hint);
        let _ = std::io::stderr().flush();
        match self.read_line().as_deref() {
            Some("") | None => default,
            Some(answer) => matches!(answer, "y" | "Y" | "yes" | "Yes" | "YES"),
        }
    }

    fn select_one(&self, prompt: &str, options: &[String]) -> Option<String> {
        if options.is_empty() {
            return None;
        }
        eprintln!("{}", prompt);
        for (i, option) in options.iter().enumerate() {
            eprintln!("  {}) {}", i + 1, option);
        }
        eprint!("Select [1-{}]: ", options.len());
        let _ = std::io::stderr().flush();
        let answer = self.read_line()?;
        if answer.is_empty() {
            return options.first().cloned();
        }
        let index: usize = answer.parse().ok()?;
        if index >= 1 && index <= options.len() {
            Some(options[index - 1].clone())
        } else {
            None
        }
    }

    fn prompt_text(&self, prompt: &str, default: &str) -> String {
        if default.is_empty() {
            eprint!("{}: ", prompt);
        } else {
            eprint!("{} [{}]: ", prompt, default);
        }
        let _ = std::io::stderr().flush();
        match self.read_line().as_deref() {
            Some("") | None => default.to_string(),
            Some(answer) => answer.to_string(),
        }
    }
}
