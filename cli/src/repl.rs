use crate::session::{Action, Session};
use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::io::{self, Write};
use std::process::ExitCode;

const PROMPT: &str = "tdb > ";

pub struct Repl {
    session: Session,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new(session: Session) -> Result<Self> {
        let editor = DefaultEditor::new().context("failed to initialize line editor")?;
        Ok(Self { session, editor })
    }

    /// Reads lines until `.exit`, end of input, or a fatal storage error.
    pub fn run(mut self) -> Result<ExitCode> {
        let mut stdout = io::stdout();

        let fatal = loop {
            let line = match self.editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break None,
                Err(err) => return Err(err).context("failed to read input"),
            };
            let _ = self.editor.add_history_entry(line.as_str());

            match self.session.execute(&line, &mut stdout)? {
                Action::Continue => {}
                Action::Exit => break None,
                Action::Fatal(err) => break Some(err),
            }
            stdout.flush()?;
        };

        match fatal {
            None => {
                self.session.close().context("failed to flush table")?;
                tracing::info!("session closed");
                Ok(ExitCode::SUCCESS)
            }
            Some(err) => {
                println!("{err}");
                tracing::error!("stopping after fatal error: {err}");
                // The tree is consistent; keep what was written.
                if let Err(close_err) = self.session.close() {
                    tracing::warn!("flush after fatal error failed: {close_err}");
                }
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
