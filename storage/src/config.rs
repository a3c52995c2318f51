/// Default upper bound on the number of pages in one table file.
///
/// A full two-level tree needs 1 root + 511 leaves, so the default leaves
/// room for the internal-node limit to be reached first.
pub const DEFAULT_MAX_PAGES: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StorageConfig {
    /// Highest page count the pager will allocate or load.
    pub max_pages: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl StorageConfig {
    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages;
        self
    }
}
