//! Yes/no confirmation on the terminal.

use std::io::{self, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

/// Asks the user a yes/no question.
pub trait Prompt {
    fn confirm(&self, message: &str) -> io::Result<bool>;
}

/// Reads a single key press in raw mode. Enter accepts the default (yes).
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt {
    /// Answer yes without asking.
    pub assume_yes: bool,
}

impl Prompt for TerminalPrompt {
    fn confirm(&self, message: &str) -> io::Result<bool> {
        if self.assume_yes {
            return Ok(true);
        }
        // Nobody can answer; treat as declined.
        if !io::stdin().is_terminal() {
            return Ok(false);
        }

        let mut stderr = io::stderr();
        write!(stderr, "? {} (Y/n) ", message)?;
        stderr.flush()?;

        enable_raw_mode()?;
        let answer = read_answer();
        disable_raw_mode()?;

        let answer = answer?;
        writeln!(stderr, "{}", if answer { "yes" } else { "no" })?;
        Ok(answer)
    }
}

fn read_answer() -> io::Result<bool> {
    loop {
        if let Event::Key(key) = event::read()? {
            if let Some(answer) = key_answer(key) {
                return Ok(answer);
            }
        }
    }
}

fn key_answer(key: KeyEvent) -> Option<bool> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(false),
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => Some(true),
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => Some(false),
        _ => None,
    }
}
