use std::io::{self, IsTerminal, Write};

use anyhow::{Result, bail};

/// Ask a yes/no question on stderr. `force` answers yes without asking.
pub fn confirm(question: &str, force: bool) -> Result<bool> {
  if force {
    return Ok(true);
  }

  if !io::stdin().is_terminal() || !io::stderr().is_terminal() {
    bail!("Refusing to prompt without a terminal. Pass --force to skip confirmation.");
  }

  let mut stderr = io::stderr();
  write!(stderr, "{} [y/N] ", question)?;
  stderr.flush()?;

  let mut answer = String::new();
  io::stdin().read_line(&mut answer)?;
  Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
  matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
