//! Blocking yes/no questions to the operator
//!
//! No default answer and no timeout: the question is repeated until the
//! operator types `y` or `n` (any case). End of input counts as an error,
//! the caller decides what that means.

use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("Console I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("Input closed before an answer was given")]
    EndOfInput,

    #[error("Prompt unavailable: {0}")]
    Unavailable(String),
}

/// Asks `question` until the answer is `y` or `n`
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<bool, PromptError> {
    loop {
        write!(output, "{} (Y/N): ", question)?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Err(PromptError::EndOfInput);
        }

        match line.trim().to_lowercase().as_str() {
            "y" => return Ok(true),
            "n" => return Ok(false),
            _ => writeln!(output, "Please enter Y or N.")?,
        }
    }
}

/// Source of operator answers
pub trait Prompt: Send + 'static {
    fn confirm(&mut self, question: &str) -> Result<bool, PromptError>;
}

/// Asks on stdout, reads from stdin
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolePrompt;

impl Prompt for ConsolePrompt {
    fn confirm(&mut self, question: &str) -> Result<bool, PromptError> {
        let mut input = io::stdin().lock();
        let mut output = io::stdout();
        confirm(&mut input, &mut output, question)
    }
}
