// Prompts the orchestrator asks the user. The trait keeps the menu flow
// testable; `Terminal` is the real `dialoguer` implementation.

use anyhow::Result;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

pub trait Prompter {
    /// Free text. With a default, empty input returns the default.
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String>;

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool>;

    /// Index into `choices`.
    fn select(&self, prompt: &str, choices: &[&str], default: usize) -> Result<usize>;

    /// Block until the user presses Enter.
    fn pause(&self, prompt: &str) -> Result<()>;
}

/// Keyboard-driven prompts in the terminal.
pub struct Terminal {
    theme: ColorfulTheme,
}

impl Terminal {
    pub fn new() -> Self {
        Terminal {
            theme: ColorfulTheme::default(),
        }
    }
}

impl Default for Terminal {
    fn default() -> Self {
        Self::new()
    }
}

impl Prompter for Terminal {
    fn input(&self, prompt: &str, default: Option<&str>) -> Result<String> {
        let mut input = Input::<String>::with_theme(&self.theme);
        input.with_prompt(prompt).allow_empty(true);
        if let Some(d) = default {
            input.default(d.to_string()).show_default(!d.is_empty());
        }
        let value = input.interact_text()?;
        Ok(value.trim().to_string())
    }

    fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        let answer = Confirm::with_theme(&self.theme)
            .with_prompt(prompt)
            .default(default)
            .interact()?;
        Ok(answer)
    }

    fn select(&self, prompt: &str, choices: &[&str], default: usize) -> Result<usize> {
        let picked = Select::with_theme(&self.theme)
            .with_prompt(prompt)
            .items(choices)
            .default(default)
            .interact()?;
        Ok(picked)
    }

    fn pause(&self, prompt: &str) -> Result<()> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(())
    }
}

/// Split a comma separated pattern list, dropping blanks.
pub fn split_patterns(raw: &str) -> Option<Vec<String>> {
    let patterns: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if patterns.is_empty() {
        None
    } else {
        Some(patterns)
    }
}
