//! Rustyline front end: read-line with history persisted in the user's
//! home directory.

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::session::LineEditor;

const HISTORY_FILE: &str = ".comal_history";

pub struct ConsoleEditor {
    rl: DefaultEditor,
    history: Option<PathBuf>,
}

impl ConsoleEditor {
    pub fn new() -> Result<Self, String> {
        let mut rl =
            DefaultEditor::new().map_err(|e| format!("Cannot initialise terminal: {}", e))?;
        let history = home::home_dir().map(|dir| dir.join(HISTORY_FILE));
        if let Some(path) = &history {
            // A missing history file is normal on first run.
            let _ = rl.load_history(path);
        }
        Ok(ConsoleEditor { rl, history })
    }

    /// Read one command line; `None` on end-of-input or interrupt.
    pub fn read(&mut self, prompt: &str) -> Option<String> {
        match self.rl.readline(prompt) {
            Ok(text) => {
                if !text.trim().is_empty() {
                    let _ = self.rl.add_history_entry(&text);
                }
                Some(text)
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => None,
            Err(e) => {
                eprintln!("Read error: {}", e);
                None
            }
        }
    }

    pub fn save_history(&mut self) {
        if let Some(path) = &self.history {
            let _ = self.rl.save_history(path);
        }
    }
}

impl LineEditor for ConsoleEditor {
    fn read_edit(&mut self, prompt: &str, initial: &str) -> Result<String, String> {
        self.rl
            .readline_with_initial(prompt, (initial, ""))
            .map_err(|e| format!("Edit abandoned: {}", e))
    }

    fn confirm(&mut self, prompt: &str) -> bool {
        match self.rl.readline(prompt) {
            Ok(answer) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
            Err(_) => false,
        }
    }
}
