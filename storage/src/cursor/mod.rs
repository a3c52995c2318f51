use crate::node::NodeType;
use crate::pager::Pager;
use crate::row::Row;
use crate::{Result, StorageError};

/// A position in the table: a leaf page and a cell slot within it.
///
/// The cursor owns no pages. Every operation takes the pager explicitly, so a
/// cursor stays valid across page loads and is cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    page_num: u32,
    cell_num: u32,
    end_of_table: bool,
}

impl Cursor {
    /// Cursor at the first row: leftmost leaf, cell 0.
    pub fn table_start(pager: &mut Pager, root_page_num: u32) -> Result<Self> {
        let page_num = leftmost_leaf(pager, root_page_num)?;
        let num_cells = pager.get_page(page_num)?.leaf_num_cells();

        Ok(Self {
            page_num,
            cell_num: 0,
            end_of_table: num_cells == 0,
        })
    }

    /// Cursor at the slot `key` occupies, or would occupy if inserted.
    pub fn table_find(pager: &mut Pager, root_page_num: u32, key: u32) -> Result<Self> {
        let mut page_num = root_page_num;

        for _ in 0..=pager.max_pages() {
            let page = pager.get_page(page_num)?;
            match page.node_type(page_num)? {
                NodeType::Leaf => {
                    return Ok(Self {
                        page_num,
                        cell_num: page.leaf_find(key) as u32,
                        end_of_table: false,
                    });
                }
                NodeType::Internal => {
                    let child_index = page.internal_find_child(key);
                    page_num = page.internal_child(page_num, child_index)?;
                }
            }
        }

        Err(cycle_error(root_page_num))
    }

    pub fn page_num(&self) -> u32 {
        self.page_num
    }

    pub fn cell_num(&self) -> u32 {
        self.cell_num
    }

    pub fn is_end_of_table(&self) -> bool {
        self.end_of_table
    }

    /// Decodes the row under the cursor.
    pub fn row(&self, pager: &mut Pager) -> Result<Row> {
        let page = pager.get_page(self.page_num)?;
        if self.cell_num >= page.leaf_num_cells() {
            return Err(StorageError::CorruptPage {
                page_num: self.page_num,
                reason: format!("cursor at cell {} is past the last cell", self.cell_num),
            });
        }
        Ok(Row::decode(page.leaf_value(self.cell_num as usize)))
    }

    /// Moves to the next row in key order.
    ///
    /// Leaves carry no sibling pointer, so moving past the end of a leaf
    /// climbs parent pointers until some ancestor has a child further right,
    /// then descends to that subtree's leftmost leaf.
    pub fn advance(&mut self, pager: &mut Pager) -> Result<()> {
        if self.end_of_table {
            return Ok(());
        }

        self.cell_num += 1;
        if self.cell_num < pager.get_page(self.page_num)?.leaf_num_cells() {
            return Ok(());
        }

        let mut child = self.page_num;
        for _ in 0..=pager.max_pages() {
            let node = pager.get_page(child)?;
            if node.is_root() {
                self.end_of_table = true;
                return Ok(());
            }

            let parent_num = node.parent();
            let parent = pager.get_page(parent_num)?;
            let index = parent
                .internal_child_index(child)
                .ok_or_else(|| StorageError::CorruptPage {
                    page_num: parent_num,
                    reason: format!("page {child} names it as parent but is not a child"),
                })?;

            if index == parent.internal_num_keys() as usize {
                child = parent_num;
                continue;
            }

            let next = parent.internal_child(parent_num, index + 1)?;
            let leaf = leftmost_leaf(pager, next)?;
            self.page_num = leaf;
            self.cell_num = 0;
            if pager.get_page(leaf)?.leaf_num_cells() > 0 {
                return Ok(());
            }
            child = leaf;
        }

        Err(cycle_error(self.page_num))
    }
}

/// Follows child 0 from `page_num` down to a leaf.
pub(crate) fn leftmost_leaf(pager: &mut Pager, mut page_num: u32) -> Result<u32> {
    let start = page_num;
    for _ in 0..=pager.max_pages() {
        let page = pager.get_page(page_num)?;
        match page.node_type(page_num)? {
            NodeType::Leaf => return Ok(page_num),
            NodeType::Internal => page_num = page.internal_child(page_num, 0)?,
        }
    }
    Err(cycle_error(start))
}

fn cycle_error(page_num: u32) -> StorageError {
    StorageError::CorruptPage {
        page_num,
        reason: "tree walk did not terminate; child links form a cycle".to_string(),
    }
}
