//! Turns an input line into a typed request for the table.

use storage::{Row, StorageError};
use thiserror::Error;

#[derive(Debug, PartialEq)]
pub enum Statement {
    Insert(Row),
    Select,
}

#[derive(Error, Debug)]
pub enum PrepareError {
    #[error("Syntax error. Could not parse statement.")]
    SyntaxError,

    #[error("Unrecognized keyword at start of '{0}'.")]
    UnrecognizedStatement(String),

    /// Id or column limits, checked by [`Row::new`].
    #[error(transparent)]
    Invalid(#[from] StorageError),
}

pub fn prepare_statement(input: &str) -> Result<Statement, PrepareError> {
    if input.starts_with("insert") {
        return prepare_insert(input);
    }
    if input == "select" {
        return Ok(Statement::Select);
    }
    Err(PrepareError::UnrecognizedStatement(input.to_string()))
}

fn prepare_insert(input: &str) -> Result<Statement, PrepareError> {
    let mut tokens = input.split_whitespace();
    if tokens.next() != Some("insert") {
        return Err(PrepareError::UnrecognizedStatement(input.to_string()));
    }

    let (Some(id), Some(username), Some(email), None) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(PrepareError::SyntaxError);
    };

    let id: i64 = id.parse().map_err(|_| PrepareError::SyntaxError)?;
    Ok(Statement::Insert(Row::new(id, username, email)?))
}

/// Dot-prefixed shell commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    Exit,
    BTree,
    Constants,
}

impl MetaCommand {
    pub fn is_meta(input: &str) -> bool {
        input.starts_with('.')
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            ".exit" => Some(MetaCommand::Exit),
            ".btree" => Some(MetaCommand::BTree),
            ".constants" => Some(MetaCommand::Constants),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_insert() {
        let statement = prepare_statement("insert 1 user1 person1@example.com").unwrap();
        assert_eq!(
            statement,
            Statement::Insert(Row::new(1, "user1", "person1@example.com").unwrap())
        );
    }

    #[test]
    fn test_prepare_select() {
        assert_eq!(prepare_statement("select").unwrap(), Statement::Select);
    }

    #[test]
    fn test_syntax_errors() {
        for input in ["insert", "insert 1 user1", "insert x user1 a@b.c", "insert 1 a b c"] {
            let err = prepare_statement(input).unwrap_err();
            assert!(matches!(err, PrepareError::SyntaxError), "{input}");
            assert_eq!(err.to_string(), "Syntax error. Could not parse statement.");
        }
    }

    #[test]
    fn test_validation_messages() {
        let err = prepare_statement("insert -1 cstack foo@bar.com").unwrap_err();
        assert_eq!(err.to_string(), "ID must be positive.");

        let input = format!("insert 1 {} {}", "a".repeat(33), "a".repeat(256));
        let err = prepare_statement(&input).unwrap_err();
        assert_eq!(err.to_string(), "String is too long.");
    }

    #[test]
    fn test_unrecognized_keyword() {
        let err = prepare_statement("update 1").unwrap_err();
        assert_eq!(err.to_string(), "Unrecognized keyword at start of 'update 1'.");

        let err = prepare_statement("inserted 1 a b").unwrap_err();
        assert!(matches!(err, PrepareError::UnrecognizedStatement(_)));
    }

    #[test]
    fn test_meta_commands() {
        assert!(MetaCommand::is_meta(".btree"));
        assert_eq!(MetaCommand::parse(".exit"), Some(MetaCommand::Exit));
        assert_eq!(MetaCommand::parse(".constants"), Some(MetaCommand::Constants));
        assert_eq!(MetaCommand::parse(".tables"), None);
    }
}
