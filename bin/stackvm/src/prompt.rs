use std::io::{self, BufRead, Write};

use stackvm_deploy::Confirm;

/// Asks yes/no questions on the terminal.
pub struct StdinPrompt {
    assume_yes: bool,
}

impl StdinPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

fn parse_answer(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

impl Confirm for StdinPrompt {
    fn confirm(&self, message: &str) -> anyhow::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }

        print!("{message} [y/N] ");
        io::stdout().flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(parse_answer(&answer))
    }
}
