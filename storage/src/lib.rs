//! Storage engine for toydb
//!
//! This crate provides the storage core of a single-table row store:
//! fixed-size pages backed by one file, the B-tree node layout, the cursor
//! used for scans and insertion-point lookup, and the fixed-width row codec.

pub mod btree;
pub mod config;
pub mod cursor;
pub mod node;
pub mod page;
pub mod pager;
pub mod row;

pub use btree::{report_constants, Constants, Rows, Table};
pub use config::StorageConfig;
pub use cursor::Cursor;
pub use node::{Node, NodeType};
pub use page::{Page, PAGE_SIZE};
pub use pager::Pager;
pub use row::Row;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("ID must be positive.")]
    IdNotPositive(i64),

    #[error("ID {0} is out of range.")]
    IdOutOfRange(i64),

    #[error("String is too long.")]
    StringTooLong { field: &'static str },

    #[error("String must not contain NUL bytes.")]
    StringHasNul { field: &'static str },

    #[error("Error: Duplicate key.")]
    DuplicateKey(u32),

    #[error("Updating parent after split is not implemented yet.")]
    SplitNotSupported,

    #[error("Tried to fetch page number out of bounds. {page_num} >= {max_pages}")]
    PageOutOfBounds { page_num: u32, max_pages: u32 },

    #[error("Page {page_num} was never allocated; the table has {num_pages} pages")]
    PageNotAllocated { page_num: u32, num_pages: u32 },

    #[error("Tried to flush page {0}, which is not loaded")]
    PageNotCached(u32),

    #[error("Corrupt page {page_num}: {reason}")]
    CorruptPage { page_num: u32, reason: String },

    #[error("Corrupt database file: {0}")]
    CorruptFile(String),

    #[error("Table is unusable after an earlier fatal error")]
    TableUnusable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// Fatal errors end the session; the table handle refuses further writes.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StorageError::IdNotPositive(_)
                | StorageError::IdOutOfRange(_)
                | StorageError::StringTooLong { .. }
                | StorageError::StringHasNul { .. }
                | StorageError::DuplicateKey(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(!StorageError::DuplicateKey(1).is_fatal());
        assert!(!StorageError::IdNotPositive(-1).is_fatal());
        assert!(!StorageError::StringTooLong { field: "email" }.is_fatal());
        assert!(!StorageError::StringHasNul { field: "username" }.is_fatal());
        assert!(StorageError::PageNotAllocated {
            page_num: 500,
            num_pages: 2
        }
        .is_fatal());
        assert!(StorageError::SplitNotSupported.is_fatal());
        assert!(StorageError::PageOutOfBounds {
            page_num: 10,
            max_pages: 10
        }
        .is_fatal());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(StorageError::DuplicateKey(7).to_string(), "Error: Duplicate key.");
        assert_eq!(
            StorageError::SplitNotSupported.to_string(),
            "Updating parent after split is not implemented yet."
        );
        assert_eq!(StorageError::IdNotPositive(0).to_string(), "ID must be positive.");
    }
}
