//! The table: a B-tree of rows keyed by id.
//!
//! Leaves hold rows, internal nodes hold routing keys. Each routing key is
//! the maximum key of the child to its left, and the right child takes every
//! key above the last routing key. Leaf splits promote a new root or extend
//! the existing parent. Splitting an internal node is not supported: an
//! insert that would need one fails with [`StorageError::SplitNotSupported`]
//! before anything is modified.

use crate::config::StorageConfig;
use crate::cursor::Cursor;
use crate::node::{
    Node, COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_MAX_KEYS, LEAF_NODE_CELL_SIZE,
    LEAF_NODE_HEADER_SIZE, LEAF_NODE_KEY_SIZE, LEAF_NODE_LEFT_SPLIT_COUNT, LEAF_NODE_MAX_CELLS,
    LEAF_NODE_SPACE_FOR_CELLS,
};
use crate::page::Page;
use crate::pager::Pager;
use crate::row::{Row, ROW_SIZE};
use crate::{Result, StorageError};
use log::{debug, info, warn};
use std::fmt::{self, Write as _};
use std::path::Path;

type Cell = [u8; LEAF_NODE_CELL_SIZE];

pub struct Table {
    pager: Pager,
    root_page_num: u32,
    poisoned: bool,
    closed: bool,
}

impl Table {
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_config(path, &StorageConfig::default())
    }

    pub fn open_with_config(path: &Path, config: &StorageConfig) -> Result<Self> {
        let mut pager = Pager::open(path, config)?;

        let root_page_num = if pager.num_pages() == 0 {
            let root = pager.get_page(0)?;
            root.initialize_leaf_node();
            root.set_root(true);
            debug!("initialized empty table with root leaf at page 0");
            0
        } else {
            find_root(&mut pager)?
        };

        info!("table open, root page {}", root_page_num);

        Ok(Self {
            pager,
            root_page_num,
            poisoned: false,
            closed: false,
        })
    }

    pub fn root_page_num(&self) -> u32 {
        self.root_page_num
    }

    /// Raw page access for structural checks in tests.
    #[doc(hidden)]
    pub fn pager(&mut self) -> &mut Pager {
        &mut self.pager
    }

    pub fn table_start(&mut self) -> Result<Cursor> {
        Cursor::table_start(&mut self.pager, self.root_page_num)
    }

    pub fn table_find(&mut self, key: u32) -> Result<Cursor> {
        Cursor::table_find(&mut self.pager, self.root_page_num, key)
    }

    /// Inserts `row` under its id.
    ///
    /// Fails with `DuplicateKey` if the id exists. Fatal failures leave the
    /// tree untouched and make the handle refuse further inserts.
    pub fn insert(&mut self, row: &Row) -> Result<()> {
        if self.poisoned {
            return Err(StorageError::TableUnusable);
        }

        let result = self.try_insert(row);
        if let Err(err) = &result {
            if err.is_fatal() {
                warn!("insert of key {} failed fatally: {}", row.id(), err);
                self.poisoned = true;
            }
        }
        result
    }

    fn try_insert(&mut self, row: &Row) -> Result<()> {
        let key = row.id();
        let cursor = self.table_find(key)?;

        let page = self.pager.get_page(cursor.page_num())?;
        let num_cells = page.leaf_num_cells() as usize;
        let cell_num = cursor.cell_num() as usize;

        if cell_num < num_cells && page.leaf_key(cell_num) == key {
            return Err(StorageError::DuplicateKey(key));
        }

        if num_cells >= LEAF_NODE_MAX_CELLS {
            return self.leaf_split_and_insert(&cursor, key, row);
        }

        page.leaf_shift_right(cell_num);
        page.set_leaf_num_cells(num_cells as u32 + 1);
        page.set_leaf_key(cell_num, key);
        row.encode(page.leaf_value_mut(cell_num));

        Ok(())
    }

    /// Splits a full leaf and inserts the new cell into whichever half it
    /// sorts into.
    fn leaf_split_and_insert(&mut self, cursor: &Cursor, key: u32, row: &Row) -> Result<()> {
        let old_page_num = cursor.page_num();
        let old = self.pager.get_page(old_page_num)?;
        let is_root = old.is_root();
        let parent_page_num = old.parent();
        let old_max = old.leaf_key(LEAF_NODE_MAX_CELLS - 1);

        // Refuse before touching anything when the parent cannot take a key.
        if !is_root {
            let parent = self.pager.get_page(parent_page_num)?;
            if parent.internal_num_keys() as usize >= INTERNAL_NODE_MAX_KEYS {
                return Err(StorageError::SplitNotSupported);
            }
        }
        self.pager.ensure_capacity(if is_root { 2 } else { 1 })?;

        let cells = merged_cells(
            self.pager.get_page(old_page_num)?,
            cursor.cell_num() as usize,
            key,
            row,
        );
        let (left_cells, right_cells) = cells.split_at(LEAF_NODE_LEFT_SPLIT_COUNT);

        let new_page_num = self.pager.unused_page_num();
        let new = self.pager.get_page(new_page_num)?;
        new.initialize_leaf_node();
        new.set_parent(parent_page_num);
        write_cells(new, right_cells);

        let old = self.pager.get_page(old_page_num)?;
        write_cells(old, left_cells);
        let new_left_max = old.leaf_key(LEAF_NODE_LEFT_SPLIT_COUNT - 1);

        debug!(
            "split leaf {} (now max {}), new leaf {} (max {})",
            old_page_num,
            new_left_max,
            new_page_num,
            old_max.max(key)
        );

        if is_root {
            return self.create_new_root(old_page_num, new_page_num);
        }

        self.pager
            .get_page(parent_page_num)?
            .update_internal_node_key(old_max, new_left_max);
        self.internal_node_insert(parent_page_num, new_page_num)
    }

    /// Puts a fresh internal root above two leaves that used to be one root.
    fn create_new_root(&mut self, left_child: u32, right_child: u32) -> Result<()> {
        let left_max = node_max_key(&mut self.pager, left_child)?;
        let root_page_num = self.pager.unused_page_num();

        let root = self.pager.get_page(root_page_num)?;
        root.initialize_internal_node();
        root.set_root(true);
        root.set_internal_num_keys(1);
        root.set_internal_child(0, left_child);
        root.set_internal_key(0, left_max);
        root.set_internal_right_child(right_child);

        for child in [left_child, right_child] {
            let page = self.pager.get_page(child)?;
            page.set_root(false);
            page.set_parent(root_page_num);
        }

        debug!(
            "new root {} over {} and {}, routing key {}",
            root_page_num, left_child, right_child, left_max
        );
        self.root_page_num = root_page_num;
        Ok(())
    }

    /// Adds `child_page_num` to a parent that has room for one more key.
    fn internal_node_insert(&mut self, parent_page_num: u32, child_page_num: u32) -> Result<()> {
        let child_max_key = node_max_key(&mut self.pager, child_page_num)?;
        let right_child = self.pager.get_page(parent_page_num)?.internal_right_child();
        let right_max_key = node_max_key(&mut self.pager, right_child)?;

        let parent = self.pager.get_page(parent_page_num)?;
        let num_keys = parent.internal_num_keys() as usize;
        if num_keys >= INTERNAL_NODE_MAX_KEYS {
            return Err(StorageError::SplitNotSupported);
        }

        if child_max_key > right_max_key {
            // New child becomes the right child; the old one moves into the cells.
            parent.set_internal_child(num_keys, right_child);
            parent.set_internal_key(num_keys, right_max_key);
            parent.set_internal_right_child(child_page_num);
        } else {
            let index = parent.internal_find_child(child_max_key);
            parent.internal_shift_right(index);
            parent.set_internal_child(index, child_page_num);
            parent.set_internal_key(index, child_max_key);
        }
        parent.set_internal_num_keys(num_keys as u32 + 1);

        Ok(())
    }

    /// Full scan in ascending key order. Each call starts over.
    pub fn select(&mut self) -> Result<Rows<'_>> {
        let cursor = self.table_start()?;
        Ok(Rows {
            table: self,
            cursor,
            pending: None,
            failed: false,
        })
    }

    /// Depth-first dump of node kinds, sizes and keys.
    pub fn describe_structure(&mut self) -> Result<String> {
        enum Frame {
            Node { page_num: u32, depth: usize },
            Key { key: u32, depth: usize },
        }

        let mut out = String::new();
        let mut visited = 0u32;
        let mut stack = vec![Frame::Node {
            page_num: self.root_page_num,
            depth: 0,
        }];

        while let Some(frame) = stack.pop() {
            let (page_num, depth) = match frame {
                Frame::Key { key, depth } => {
                    let _ = writeln!(out, "{}- key {}", indent(depth), key);
                    continue;
                }
                Frame::Node { page_num, depth } => (page_num, depth),
            };

            visited += 1;
            if visited > self.pager.num_pages() {
                return Err(StorageError::CorruptPage {
                    page_num,
                    reason: "structure walk does not terminate".to_string(),
                });
            }

            let page = self.pager.get_page(page_num)?;
            match Node::from_page(page_num, page)? {
                Node::Leaf(leaf) => {
                    let num_cells = leaf.leaf_num_cells();
                    let _ = writeln!(out, "{}- leaf (size {})", indent(depth), num_cells);
                    for i in 0..num_cells as usize {
                        let _ = writeln!(out, "{}- {}", indent(depth + 1), leaf.leaf_key(i));
                    }
                }
                Node::Internal(internal) => {
                    let num_keys = internal.internal_num_keys() as usize;
                    let _ = writeln!(out, "{}- internal (size {})", indent(depth), num_keys);

                    // Pushed in reverse so children pop left to right.
                    stack.push(Frame::Node {
                        page_num: internal.internal_right_child(),
                        depth: depth + 1,
                    });
                    for i in (0..num_keys).rev() {
                        stack.push(Frame::Key {
                            key: internal.internal_key(i),
                            depth: depth + 1,
                        });
                        stack.push(Frame::Node {
                            page_num: internal.internal_child(page_num, i)?,
                            depth: depth + 1,
                        });
                    }
                }
            }
        }

        Ok(out)
    }

    /// Flushes every page to disk. The handle is spent afterwards.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.pager.flush_all()?;
        self.pager.sync()?;
        info!("table closed, root page {}", self.root_page_num);
        Ok(())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.pager.flush_all() {
            warn!("flushing table on drop failed: {}", err);
        }
    }
}

/// Lazy full-table scan returned by [`Table::select`].
///
/// A failure to move past a row is reported after that row, and ends the
/// scan.
pub struct Rows<'a> {
    table: &'a mut Table,
    cursor: Cursor,
    pending: Option<StorageError>,
    failed: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            self.failed = true;
            return Some(Err(err));
        }
        if self.failed || self.cursor.is_end_of_table() {
            return None;
        }

        let pager = &mut self.table.pager;
        let row = match self.cursor.row(pager) {
            Ok(row) => row,
            Err(err) => {
                self.failed = true;
                return Some(Err(err));
            }
        };
        if let Err(err) = self.cursor.advance(pager) {
            self.pending = Some(err);
        }
        Some(Ok(row))
    }
}

/// The fixed sizing constants of the on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constants {
    pub row_size: usize,
    pub common_node_header_size: usize,
    pub leaf_node_header_size: usize,
    pub leaf_node_cell_size: usize,
    pub leaf_node_space_for_cells: usize,
    pub leaf_node_max_cells: usize,
}

pub fn report_constants() -> Constants {
    Constants {
        row_size: ROW_SIZE,
        common_node_header_size: COMMON_NODE_HEADER_SIZE,
        leaf_node_header_size: LEAF_NODE_HEADER_SIZE,
        leaf_node_cell_size: LEAF_NODE_CELL_SIZE,
        leaf_node_space_for_cells: LEAF_NODE_SPACE_FOR_CELLS,
        leaf_node_max_cells: LEAF_NODE_MAX_CELLS,
    }
}

impl fmt::Display for Constants {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ROW_SIZE: {}", self.row_size)?;
        writeln!(f, "COMMON_NODE_HEADER_SIZE: {}", self.common_node_header_size)?;
        writeln!(f, "LEAF_NODE_HEADER_SIZE: {}", self.leaf_node_header_size)?;
        writeln!(f, "LEAF_NODE_CELL_SIZE: {}", self.leaf_node_cell_size)?;
        writeln!(f, "LEAF_NODE_SPACE_FOR_CELLS: {}", self.leaf_node_space_for_cells)?;
        write!(f, "LEAF_NODE_MAX_CELLS: {}", self.leaf_node_max_cells)
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}

/// The page marked as root. Exactly one page carries the flag.
fn find_root(pager: &mut Pager) -> Result<u32> {
    for page_num in 0..pager.num_pages() {
        if pager.get_page(page_num)?.is_root() {
            return Ok(page_num);
        }
    }
    Err(StorageError::CorruptFile(format!(
        "none of {} pages is marked as root",
        pager.num_pages()
    )))
}

/// Largest key stored under `page_num`: follow right children to a leaf.
fn node_max_key(pager: &mut Pager, mut page_num: u32) -> Result<u32> {
    for _ in 0..=pager.max_pages() {
        let page = pager.get_page(page_num)?;
        match Node::from_page(page_num, page)? {
            Node::Internal(internal) => page_num = internal.internal_right_child(),
            Node::Leaf(leaf) => {
                let num_cells = leaf.leaf_num_cells() as usize;
                if num_cells == 0 {
                    return Err(StorageError::CorruptPage {
                        page_num,
                        reason: "empty leaf below an internal node".to_string(),
                    });
                }
                return Ok(leaf.leaf_key(num_cells - 1));
            }
        }
    }
    Err(StorageError::CorruptPage {
        page_num,
        reason: "right-child chain does not terminate".to_string(),
    })
}

/// The full leaf's cells with the new cell placed at `cell_num`.
fn merged_cells(
    page: &Page,
    cell_num: usize,
    key: u32,
    row: &Row,
) -> Vec<Cell> {
    let mut new_cell = [0u8; LEAF_NODE_CELL_SIZE];
    new_cell[..LEAF_NODE_KEY_SIZE].copy_from_slice(&key.to_le_bytes());
    row.encode(&mut new_cell[LEAF_NODE_KEY_SIZE..]);

    let mut cells = Vec::with_capacity(LEAF_NODE_MAX_CELLS + 1);
    for i in 0..LEAF_NODE_MAX_CELLS {
        if i == cell_num {
            cells.push(new_cell);
        }
        let mut cell = [0u8; LEAF_NODE_CELL_SIZE];
        cell.copy_from_slice(page.leaf_cell(i));
        cells.push(cell);
    }
    if cell_num >= LEAF_NODE_MAX_CELLS {
        cells.push(new_cell);
    }
    cells
}

fn write_cells(page: &mut Page, cells: &[Cell]) {
    for (i, cell) in cells.iter().enumerate() {
        page.set_leaf_cell(i, cell);
    }
    page.set_leaf_num_cells(cells.len() as u32);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    fn open_temp() -> (TempDir, Table) {
        let dir = tempdir().unwrap();
        let table = Table::open(&dir.path().join("test.db")).unwrap();
        (dir, table)
    }

    fn row(id: u32) -> Row {
        Row::new(i64::from(id), format!("user{id}"), format!("person{id}@example.com")).unwrap()
    }

    fn ids(table: &mut Table) -> Vec<u32> {
        table
            .select()
            .unwrap()
            .map(|r| r.unwrap().id())
            .collect()
    }

    #[test]
    fn test_empty_table() {
        let (_dir, mut table) = open_temp();

        assert_eq!(table.root_page_num(), 0);
        assert!(ids(&mut table).is_empty());
        assert_eq!(table.describe_structure().unwrap(), "- leaf (size 0)\n");
    }

    #[test]
    fn test_insert_keeps_leaf_sorted() {
        let (_dir, mut table) = open_temp();
        for id in [5, 1, 3, 2, 4] {
            table.insert(&row(id)).unwrap();
        }

        assert_eq!(ids(&mut table), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_duplicate_key_is_not_fatal() {
        let (_dir, mut table) = open_temp();
        table.insert(&row(1)).unwrap();

        let err = table.insert(&row(1)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(1)));

        table.insert(&row(2)).unwrap();
        assert_eq!(ids(&mut table), vec![1, 2]);
    }

    #[test]
    fn test_root_split_promotes_new_root() {
        let (_dir, mut table) = open_temp();
        for id in 1..=14 {
            table.insert(&row(id)).unwrap();
        }

        // Old root leaf stays at 0, new leaf at 1, new root at 2.
        assert_eq!(table.root_page_num(), 2);
        let root = table.pager().get_page(2).unwrap();
        assert!(root.is_root());
        assert_eq!(root.internal_num_keys(), 1);
        assert_eq!(root.internal_key(0), 7);

        for leaf in [0, 1] {
            let page = table.pager().get_page(leaf).unwrap();
            assert!(!page.is_root());
            assert_eq!(page.parent(), 2);
            assert_eq!(page.leaf_num_cells(), 7);
        }
    }

    #[test]
    fn test_split_with_key_in_left_half() {
        let (_dir, mut table) = open_temp();
        for id in (2..=26).step_by(2) {
            table.insert(&row(id)).unwrap();
        }
        table.insert(&row(3)).unwrap();

        let expected = "- internal (size 1)\n\
                        \x20 - leaf (size 7)\n\
                        \x20   - 2\n\
                        \x20   - 3\n\
                        \x20   - 4\n\
                        \x20   - 6\n\
                        \x20   - 8\n\
                        \x20   - 10\n\
                        \x20   - 12\n\
                        \x20 - key 12\n\
                        \x20 - leaf (size 7)\n\
                        \x20   - 14\n\
                        \x20   - 16\n\
                        \x20   - 18\n\
                        \x20   - 20\n\
                        \x20   - 22\n\
                        \x20   - 24\n\
                        \x20   - 26\n";
        assert_eq!(table.describe_structure().unwrap(), expected);
    }

    #[test]
    fn test_split_under_existing_parent() {
        let (_dir, mut table) = open_temp();
        for id in 1..=21 {
            table.insert(&row(id)).unwrap();
        }

        let root = table.root_page_num();
        let page = table.pager().get_page(root).unwrap();
        assert_eq!(page.internal_num_keys(), 2);
        assert_eq!(page.internal_key(0), 7);
        assert_eq!(page.internal_key(1), 14);
        assert_eq!(ids(&mut table), (1..=21).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_of_middle_child_updates_routing_keys() {
        let (_dir, mut table) = open_temp();
        // Leaves [10..70] and [80..140] after the root split.
        for id in (10..=140).step_by(10) {
            table.insert(&row(id)).unwrap();
        }
        // Fill the left leaf to 13, then overflow it.
        for id in [11, 12, 13, 14, 15, 16, 17] {
            table.insert(&row(id)).unwrap();
        }

        let root = table.root_page_num();
        let page = table.pager().get_page(root).unwrap();
        assert_eq!(page.internal_num_keys(), 2);
        assert_eq!(page.internal_key(0), 16);
        assert_eq!(page.internal_key(1), 70);

        let mut expected: Vec<u32> = (10..=140).step_by(10).collect();
        expected.extend([11, 12, 13, 14, 15, 16, 17]);
        expected.sort_unstable();
        assert_eq!(ids(&mut table), expected);
    }

    #[test]
    fn test_page_limit_is_fatal_and_poisons() {
        let dir = tempdir().unwrap();
        let config = StorageConfig::default().with_max_pages(2);
        let mut table = Table::open_with_config(&dir.path().join("test.db"), &config).unwrap();
        for id in 1..=13 {
            table.insert(&row(id)).unwrap();
        }

        let err = table.insert(&row(14)).unwrap_err();
        assert!(matches!(err, StorageError::PageOutOfBounds { .. }));
        assert!(matches!(
            table.insert(&row(15)),
            Err(StorageError::TableUnusable)
        ));

        // Nothing moved: still one full leaf.
        assert_eq!(table.pager().num_pages(), 1);
        assert_eq!(ids(&mut table), (1..=13).collect::<Vec<_>>());
    }

    #[test]
    fn test_constants_report() {
        let text = report_constants().to_string();
        assert_eq!(
            text,
            "ROW_SIZE: 293\n\
             COMMON_NODE_HEADER_SIZE: 6\n\
             LEAF_NODE_HEADER_SIZE: 10\n\
             LEAF_NODE_CELL_SIZE: 297\n\
             LEAF_NODE_SPACE_FOR_CELLS: 4086\n\
             LEAF_NODE_MAX_CELLS: 13"
        );
    }

    #[test]
    fn test_select_restarts() {
        let (_dir, mut table) = open_temp();
        for id in 1..=20 {
            table.insert(&row(id)).unwrap();
        }

        let first: Vec<u32> = table.select().unwrap().take(3).map(|r| r.unwrap().id()).collect();
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(ids(&mut table).len(), 20);
    }
}
