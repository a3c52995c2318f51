use crate::{Result, StorageError};
use bytes::{Buf, BufMut};
use std::fmt;

pub const COLUMN_USERNAME_SIZE: usize = 32;
pub const COLUMN_EMAIL_SIZE: usize = 255;

pub const ID_SIZE: usize = std::mem::size_of::<u32>();
pub const USERNAME_SIZE: usize = COLUMN_USERNAME_SIZE + 1; // trailing terminator
pub const EMAIL_SIZE: usize = COLUMN_EMAIL_SIZE + 1;

pub const ID_OFFSET: usize = 0;
pub const USERNAME_OFFSET: usize = ID_OFFSET + ID_SIZE;
pub const EMAIL_OFFSET: usize = USERNAME_OFFSET + USERNAME_SIZE;
pub const ROW_SIZE: usize = ID_SIZE + USERNAME_SIZE + EMAIL_SIZE;

/// One record of the table.
///
/// Construct through [`Row::new`], which enforces the id and column limits,
/// so every `Row` fits its fixed-width slot. A zero byte ends a string slot,
/// so strings may not contain one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    id: u32,
    username: String,
    email: String,
}

impl Row {
    pub fn new(id: i64, username: impl Into<String>, email: impl Into<String>) -> Result<Self> {
        if id <= 0 {
            return Err(StorageError::IdNotPositive(id));
        }
        if id > i64::from(i32::MAX) {
            return Err(StorageError::IdOutOfRange(id));
        }

        let username = username.into();
        check_column(&username, "username", COLUMN_USERNAME_SIZE)?;

        let email = email.into();
        check_column(&email, "email", COLUMN_EMAIL_SIZE)?;

        Ok(Self {
            id: id as u32,
            username,
            email,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Serializes into the first `ROW_SIZE` bytes of `dst`, zero-padding both
    /// string slots.
    pub fn encode(&self, dst: &mut [u8]) {
        let mut buf = &mut dst[..ROW_SIZE];
        buf.put_u32_le(self.id);
        put_padded(&mut buf, self.username.as_bytes(), USERNAME_SIZE);
        put_padded(&mut buf, self.email.as_bytes(), EMAIL_SIZE);
    }

    pub fn to_bytes(&self) -> [u8; ROW_SIZE] {
        let mut bytes = [0u8; ROW_SIZE];
        self.encode(&mut bytes);
        bytes
    }

    /// Reads a row back from the first `ROW_SIZE` bytes of `src`.
    pub fn decode(src: &[u8]) -> Self {
        let mut buf = &src[..ROW_SIZE];
        let id = buf.get_u32_le();
        let username = take_terminated(&mut buf, USERNAME_SIZE);
        let email = take_terminated(&mut buf, EMAIL_SIZE);

        Self {
            id,
            username,
            email,
        }
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.username, self.email)
    }
}

fn check_column(value: &str, field: &'static str, max_len: usize) -> Result<()> {
    if value.len() > max_len {
        return Err(StorageError::StringTooLong { field });
    }
    if value.bytes().any(|b| b == 0) {
        return Err(StorageError::StringHasNul { field });
    }
    Ok(())
}

fn put_padded(buf: &mut &mut [u8], value: &[u8], slot: usize) {
    buf.put_slice(value);
    buf.put_bytes(0, slot - value.len());
}

fn take_terminated(buf: &mut &[u8], slot: usize) -> String {
    let raw = &buf[..slot];
    let end = raw.iter().position(|b| *b == 0).unwrap_or(slot);
    let value = String::from_utf8_lossy(&raw[..end]).into_owned();
    buf.advance(slot);
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_layout_constants() {
        assert_eq!(ROW_SIZE, 293);
        assert_eq!(USERNAME_OFFSET, 4);
        assert_eq!(EMAIL_OFFSET, 37);
    }

    #[test]
    fn test_encode_layout() {
        let row = Row::new(1, "user1", "person1@example.com").unwrap();
        let bytes = row.to_bytes();

        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[USERNAME_OFFSET..USERNAME_OFFSET + 5], b"user1");
        assert!(bytes[USERNAME_OFFSET + 5..EMAIL_OFFSET].iter().all(|b| *b == 0));
        assert_eq!(&bytes[EMAIL_OFFSET..EMAIL_OFFSET + 19], b"person1@example.com");
        assert!(bytes[EMAIL_OFFSET + 19..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_reverses_encode() {
        let row = Row::new(42, "alice", "alice@example.com").unwrap();
        assert_eq!(Row::decode(&row.to_bytes()), row);
    }

    #[test]
    fn test_maximum_length_strings() {
        let username = "a".repeat(COLUMN_USERNAME_SIZE);
        let email = "b".repeat(COLUMN_EMAIL_SIZE);
        let row = Row::new(1, username.clone(), email.clone()).unwrap();

        let bytes = row.to_bytes();
        // Terminator bytes stay zero even for full-length values.
        assert_eq!(bytes[EMAIL_OFFSET - 1], 0);
        assert_eq!(bytes[ROW_SIZE - 1], 0);

        let decoded = Row::decode(&bytes);
        assert_eq!(decoded.username(), username);
        assert_eq!(decoded.email(), email);
    }

    #[test]
    fn test_strings_too_long() {
        let err = Row::new(1, "a".repeat(33), "x").unwrap_err();
        assert!(matches!(err, StorageError::StringTooLong { field: "username" }));

        let err = Row::new(1, "x", "a".repeat(256)).unwrap_err();
        assert!(matches!(err, StorageError::StringTooLong { field: "email" }));
    }

    #[test]
    fn test_rejects_nul_bytes() {
        let err = Row::new(1, "ab\0cd", "e@f").unwrap_err();
        assert!(matches!(err, StorageError::StringHasNul { field: "username" }));
        assert!(!err.is_fatal());

        let err = Row::new(1, "ab", "e\0@f").unwrap_err();
        assert!(matches!(err, StorageError::StringHasNul { field: "email" }));
    }

    #[test]
    fn test_id_must_be_positive() {
        assert!(matches!(
            Row::new(-1, "cstack", "foo@bar.com"),
            Err(StorageError::IdNotPositive(-1))
        ));
        assert!(matches!(
            Row::new(0, "cstack", "foo@bar.com"),
            Err(StorageError::IdNotPositive(0))
        ));
        assert!(matches!(
            Row::new(i64::from(i32::MAX) + 1, "a", "b"),
            Err(StorageError::IdOutOfRange(_))
        ));
    }

    #[test]
    fn test_display() {
        let row = Row::new(1, "user1", "person1@example.com").unwrap();
        assert_eq!(row.to_string(), "(1, user1, person1@example.com)");
    }
}
