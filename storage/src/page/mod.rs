use crate::{Result, StorageError};

pub const PAGE_SIZE: usize = 4096;

/// One fixed-size block of the table file.
///
/// A page carries no header of its own; the node module decides what the
/// bytes mean. Integers are stored little-endian.
#[repr(C, align(8))]
#[derive(Clone)]
pub struct Page {
    data: [u8; PAGE_SIZE], // The actual 4KB block
}

impl Page {
    pub fn new() -> Self {
        Self {
            data: [0; PAGE_SIZE],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(StorageError::CorruptFile(format!(
                "page buffer is {} bytes, expected {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }

        let mut page = Self::new();
        page.data.copy_from_slice(bytes);
        Ok(page)
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    pub(crate) fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    pub(crate) fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(raw)
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn slice(&self, offset: usize, len: usize) -> &[u8] {
        &self.data[offset..offset + len]
    }

    pub(crate) fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        &mut self.data[offset..offset + len]
    }

    /// Moves `len` bytes from `src` to `dst` inside the page; ranges may overlap.
    pub(crate) fn move_bytes(&mut self, src: usize, dst: usize, len: usize) {
        self.data.copy_within(src..src + len, dst);
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.data.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        f.debug_struct("Page").field("used_prefix", &used).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_creation() {
        let page = Page::new();
        assert!(page.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_page_alignment() {
        assert_eq!(std::mem::align_of::<Page>(), 8);
        assert_eq!(std::mem::size_of::<Page>(), PAGE_SIZE);
    }

    #[test]
    fn test_u32_is_little_endian() {
        let mut page = Page::new();
        page.write_u32(6, 0x0102_0304);

        assert_eq!(page.slice(6, 4), &[4, 3, 2, 1]);
        assert_eq!(page.read_u32(6), 0x0102_0304);
    }

    #[test]
    fn test_move_bytes_overlapping() {
        let mut page = Page::new();
        page.slice_mut(0, 4).copy_from_slice(&[1, 2, 3, 4]);
        page.move_bytes(0, 2, 4);

        assert_eq!(page.slice(0, 6), &[1, 2, 1, 2, 3, 4]);
    }

    #[test]
    fn test_from_bytes_wrong_size() {
        assert!(Page::from_bytes(&[0u8; 100]).is_err());
        assert!(Page::from_bytes(&[7u8; PAGE_SIZE]).is_ok());
    }
}
