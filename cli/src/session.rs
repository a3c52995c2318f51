use crate::statement::{prepare_statement, MetaCommand, Statement};
use std::io::{self, Write};
use storage::{report_constants, StorageError, Table};

/// What the shell should do after a line.
#[derive(Debug)]
pub enum Action {
    Continue,
    Exit,
    /// The table cannot be used any more; report and stop.
    Fatal(StorageError),
}

/// Executes shell lines against one open table, writing replies to `out`.
pub struct Session {
    table: Table,
}

impl Session {
    pub fn new(table: Table) -> Self {
        Self { table }
    }

    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Action> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Action::Continue);
        }

        if MetaCommand::is_meta(line) {
            return self.execute_meta(line, out);
        }

        match prepare_statement(line) {
            Ok(statement) => self.execute_statement(statement, out),
            Err(err) => {
                writeln!(out, "{err}")?;
                Ok(Action::Continue)
            }
        }
    }

    fn execute_meta<W: Write>(&mut self, line: &str, out: &mut W) -> io::Result<Action> {
        match MetaCommand::parse(line) {
            Some(MetaCommand::Exit) => Ok(Action::Exit),
            Some(MetaCommand::BTree) => match self.table.describe_structure() {
                Ok(structure) => {
                    write!(out, "Tree:\n{structure}")?;
                    Ok(Action::Continue)
                }
                Err(err) => Ok(Action::Fatal(err)),
            },
            Some(MetaCommand::Constants) => {
                writeln!(out, "Constants:\n{}", report_constants())?;
                Ok(Action::Continue)
            }
            None => {
                writeln!(out, "Unrecognized command '{line}'")?;
                Ok(Action::Continue)
            }
        }
    }

    fn execute_statement<W: Write>(&mut self, statement: Statement, out: &mut W) -> io::Result<Action> {
        match statement {
            Statement::Insert(row) => match self.table.insert(&row) {
                Ok(()) => writeln!(out, "Executed.")?,
                Err(err) if err.is_fatal() => return Ok(Action::Fatal(err)),
                Err(err) => writeln!(out, "{err}")?,
            },
            Statement::Select => {
                let rows = match self.table.select() {
                    Ok(rows) => rows,
                    Err(err) => return Ok(Action::Fatal(err)),
                };
                for row in rows {
                    match row {
                        Ok(row) => writeln!(out, "{row}")?,
                        Err(err) => return Ok(Action::Fatal(err)),
                    }
                }
                writeln!(out, "Executed.")?;
            }
        }
        Ok(Action::Continue)
    }

    /// Flushes the table to disk.
    pub fn close(self) -> storage::Result<()> {
        self.table.close()
    }
}
