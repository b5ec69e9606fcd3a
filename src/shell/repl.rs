//! Line-editing loop around [`execute_line`].

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use tracing::debug;

use super::commands::{execute_line, Reply};
use crate::cli::{accent, dim, error, muted, warn};
use crate::error::{CanopyError, Result};
use crate::session::Session;

/// Interactive shell
pub struct Repl {
    editor: DefaultEditor,
    session: Session,
    history_path: Option<PathBuf>,
}

impl Repl {
    pub fn new(session: Session) -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| {
            CanopyError::IoError(std::io::Error::other(format!("failed to create line editor: {e}")))
        })?;
        let history_path = dirs::data_dir().map(|p| p.join("canopy").join("history"));

        let mut repl = Self {
            editor,
            session,
            history_path,
        };
        if let Some(ref path) = repl.history_path {
            if repl.editor.load_history(path).is_err() {
                debug!("No shell history at {}", path.display());
            }
        }
        Ok(repl)
    }

    /// Read and run lines until `quit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        self.print_banner();

        loop {
            let prompt = self.prompt();
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let _ = self.editor.add_history_entry(line);

                    match execute_line(&mut self.session, line) {
                        Ok(Reply::Output(text)) => {
                            if !text.is_empty() {
                                println!("{text}");
                            }
                        }
                        Ok(Reply::Quit) => {
                            self.save_history();
                            println!("{}", muted("Goodbye!"));
                            break;
                        }
                        Err(e) => println!("{}", error(&e.to_string())),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", warn("Use 'quit' or Ctrl-D to exit"));
                }
                Err(ReadlineError::Eof) => {
                    self.save_history();
                    println!("\n{}", muted("Goodbye!"));
                    break;
                }
                Err(e) => println!("{}", error(&format!("Error: {e}"))),
            }
        }

        Ok(())
    }

    fn print_banner(&self) {
        println!("\n  {} {}", accent("canopy"), dim(env!("CARGO_PKG_VERSION")));
        println!("  {}", muted("Type 'help' for commands, 'quit' to exit.\n"));
    }

    fn prompt(&self) -> String {
        format!("canopy ({})> ", self.session.config().model)
    }

    fn save_history(&mut self) {
        if let Some(ref path) = self.history_path {
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            let _ = self.editor.save_history(path);
        }
    }
}
