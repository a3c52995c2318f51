// storage/src/pager/mod.rs

use crate::config::StorageConfig;
use crate::node::validate_node;
use crate::page::{Page, PAGE_SIZE};
use crate::{Result, StorageError};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// File-backed page cache.
///
/// Pages are loaded lazily and stay cached until the pager is dropped; there
/// is no eviction, so `max_pages` is the only bound on memory. Only the index
/// one past the last known page may be allocated; it starts zeroed. Pages
/// read from disk must carry a valid node header.
pub struct Pager {
    file: File,
    file_pages: u32, // pages present on disk when the file was opened
    num_pages: u32,  // pages known to the pager, on disk or allocated
    max_pages: u32,
    pages: Vec<Option<Box<Page>>>,
}

impl Pager {
    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(StorageError::Io)?;

        let file_length = file.metadata().map_err(StorageError::Io)?.len();
        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::CorruptFile(
                "Db file is not a whole number of pages.".to_string(),
            ));
        }

        let file_pages = u32::try_from(file_length / PAGE_SIZE as u64)
            .map_err(|_| StorageError::CorruptFile(format!("file too large: {file_length} bytes")))?;
        if file_pages > config.max_pages {
            return Err(StorageError::CorruptFile(format!(
                "file holds {} pages, limit is {}",
                file_pages, config.max_pages
            )));
        }

        info!(
            "opened {} ({} pages, limit {})",
            path.display(),
            file_pages,
            config.max_pages
        );

        Ok(Self {
            file,
            file_pages,
            num_pages: file_pages,
            max_pages: config.max_pages,
            pages: Vec::new(),
        })
    }

    pub fn num_pages(&self) -> u32 {
        self.num_pages
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    /// Index the next allocation will use. Pages are never reused.
    pub fn unused_page_num(&self) -> u32 {
        self.num_pages
    }

    /// Fails unless `additional` more pages can still be allocated.
    pub fn ensure_capacity(&self, additional: u32) -> Result<()> {
        let needed = self.num_pages.saturating_add(additional);
        if needed > self.max_pages {
            return Err(StorageError::PageOutOfBounds {
                page_num: needed - 1,
                max_pages: self.max_pages,
            });
        }
        Ok(())
    }

    pub fn get_page(&mut self, page_num: u32) -> Result<&mut Page> {
        if page_num >= self.max_pages {
            return Err(StorageError::PageOutOfBounds {
                page_num,
                max_pages: self.max_pages,
            });
        }
        if page_num > self.num_pages {
            return Err(StorageError::PageNotAllocated {
                page_num,
                num_pages: self.num_pages,
            });
        }

        let index = page_num as usize;
        if self.pages.len() <= index {
            self.pages.resize_with(index + 1, || None);
        }

        if self.pages[index].is_none() {
            let page = self.load_page(page_num)?;
            self.pages[index] = Some(page);

            if page_num >= self.num_pages {
                self.num_pages = page_num + 1;
            }
        }

        self.pages[index]
            .as_deref_mut()
            .ok_or(StorageError::PageNotCached(page_num))
    }

    fn load_page(&mut self, page_num: u32) -> Result<Box<Page>> {
        let mut page = Box::new(Page::new());

        if page_num < self.file_pages {
            let offset = page_num as u64 * PAGE_SIZE as u64;
            self.file
                .seek(SeekFrom::Start(offset))
                .map_err(StorageError::Io)?;
            self.file
                .read_exact(page.as_bytes_mut())
                .map_err(StorageError::Io)?;
            validate_node(page_num, &page)?;
            debug!("loaded page {} from disk", page_num);
        } else {
            debug!("allocated page {}", page_num);
        }

        Ok(page)
    }

    pub fn flush(&mut self, page_num: u32) -> Result<()> {
        let page = self
            .pages
            .get(page_num as usize)
            .and_then(Option::as_deref)
            .ok_or(StorageError::PageNotCached(page_num))?;

        let offset = page_num as u64 * PAGE_SIZE as u64;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(StorageError::Io)?;
        self.file
            .write_all(page.as_bytes())
            .map_err(StorageError::Io)?;

        Ok(())
    }

    /// Writes back every cached page.
    pub fn flush_all(&mut self) -> Result<()> {
        let mut flushed = 0;
        for page_num in 0..self.num_pages {
            if self.is_cached(page_num) {
                self.flush(page_num)?;
                flushed += 1;
            }
        }
        debug!("flushed {} of {} pages", flushed, self.num_pages);
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all().map_err(StorageError::Io)
    }

    pub fn is_cached(&self, page_num: u32) -> bool {
        matches!(self.pages.get(page_num as usize), Some(Some(_)))
    }
}
