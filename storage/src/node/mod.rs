//! B-tree node layout.
//!
//! Every page holds exactly one node. The layout is a fixed byte contract:
//!
//! ```text
//! Common header (6 bytes)
//!   0  u8   node type (0 = internal, 1 = leaf)
//!   1  u8   is root
//!   2  u32  parent page
//!
//! Leaf (header 10 bytes)
//!   6  u32  cell count
//!   10 ...  cells: key u32 + row (ROW_SIZE bytes)
//!
//! Internal (header 14 bytes)
//!   6  u32  key count
//!   10 u32  right child page
//!   14 ...  cells: child page u32 + key u32
//! ```
//!
//! Nothing here performs I/O; callers fetch pages from the pager first.

use crate::page::{Page, PAGE_SIZE};
use crate::row::ROW_SIZE;
use crate::{Result, StorageError};

// Common node header
pub const NODE_TYPE_SIZE: usize = std::mem::size_of::<u8>();
pub const NODE_TYPE_OFFSET: usize = 0;
pub const IS_ROOT_SIZE: usize = std::mem::size_of::<u8>();
pub const IS_ROOT_OFFSET: usize = NODE_TYPE_SIZE;
pub const PARENT_POINTER_SIZE: usize = std::mem::size_of::<u32>();
pub const PARENT_POINTER_OFFSET: usize = IS_ROOT_OFFSET + IS_ROOT_SIZE;
pub const COMMON_NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + IS_ROOT_SIZE + PARENT_POINTER_SIZE;

// Leaf node header
pub const LEAF_NODE_NUM_CELLS_SIZE: usize = std::mem::size_of::<u32>();
pub const LEAF_NODE_NUM_CELLS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
pub const LEAF_NODE_HEADER_SIZE: usize = COMMON_NODE_HEADER_SIZE + LEAF_NODE_NUM_CELLS_SIZE;

// Leaf node body
pub const LEAF_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
pub const LEAF_NODE_KEY_OFFSET: usize = 0;
pub const LEAF_NODE_VALUE_SIZE: usize = ROW_SIZE;
pub const LEAF_NODE_VALUE_OFFSET: usize = LEAF_NODE_KEY_OFFSET + LEAF_NODE_KEY_SIZE;
pub const LEAF_NODE_CELL_SIZE: usize = LEAF_NODE_KEY_SIZE + LEAF_NODE_VALUE_SIZE;
pub const LEAF_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - LEAF_NODE_HEADER_SIZE;
pub const LEAF_NODE_MAX_CELLS: usize = LEAF_NODE_SPACE_FOR_CELLS / LEAF_NODE_CELL_SIZE;

// Split shares: the new right leaf gets half (rounded down) of MAX + 1 cells.
pub const LEAF_NODE_RIGHT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) / 2;
pub const LEAF_NODE_LEFT_SPLIT_COUNT: usize = (LEAF_NODE_MAX_CELLS + 1) - LEAF_NODE_RIGHT_SPLIT_COUNT;

// Internal node header
pub const INTERNAL_NODE_NUM_KEYS_SIZE: usize = std::mem::size_of::<u32>();
pub const INTERNAL_NODE_NUM_KEYS_OFFSET: usize = COMMON_NODE_HEADER_SIZE;
pub const INTERNAL_NODE_RIGHT_CHILD_SIZE: usize = std::mem::size_of::<u32>();
pub const INTERNAL_NODE_RIGHT_CHILD_OFFSET: usize =
    INTERNAL_NODE_NUM_KEYS_OFFSET + INTERNAL_NODE_NUM_KEYS_SIZE;
pub const INTERNAL_NODE_HEADER_SIZE: usize =
    COMMON_NODE_HEADER_SIZE + INTERNAL_NODE_NUM_KEYS_SIZE + INTERNAL_NODE_RIGHT_CHILD_SIZE;

// Internal node body
pub const INTERNAL_NODE_CHILD_SIZE: usize = std::mem::size_of::<u32>();
pub const INTERNAL_NODE_KEY_SIZE: usize = std::mem::size_of::<u32>();
pub const INTERNAL_NODE_CELL_SIZE: usize = INTERNAL_NODE_CHILD_SIZE + INTERNAL_NODE_KEY_SIZE;
pub const INTERNAL_NODE_SPACE_FOR_CELLS: usize = PAGE_SIZE - INTERNAL_NODE_HEADER_SIZE;

/// Routing keys an internal node may hold. Far below what the page has room
/// for: a root over 199 leaves stops accepting splits at the 1400th
/// sequential row.
pub const INTERNAL_NODE_MAX_KEYS: usize = 198;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(NodeType::Internal),
            1 => Ok(NodeType::Leaf),
            other => Err(other),
        }
    }
}

/// A page viewed as the node kind its header declares.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Leaf(&'a Page),
    Internal(&'a Page),
}

impl<'a> Node<'a> {
    pub fn from_page(page_num: u32, page: &'a Page) -> Result<Self> {
        match page.node_type(page_num)? {
            NodeType::Leaf => Ok(Node::Leaf(page)),
            NodeType::Internal => Ok(Node::Internal(page)),
        }
    }
}

/// Checks the header fields a traversal trusts: the node type and the cell or
/// key count. Pages read from disk go through this before they are used.
pub(crate) fn validate_node(page_num: u32, page: &Page) -> Result<()> {
    let (count, limit, what) = match page.node_type(page_num)? {
        NodeType::Leaf => (page.leaf_num_cells(), LEAF_NODE_MAX_CELLS, "cells"),
        NodeType::Internal => (page.internal_num_keys(), INTERNAL_NODE_MAX_KEYS, "keys"),
    };
    if count as usize > limit {
        return Err(StorageError::CorruptPage {
            page_num,
            reason: format!("{count} {what}, at most {limit} fit"),
        });
    }
    Ok(())
}

fn leaf_node_cell_offset(cell_num: usize) -> usize {
    LEAF_NODE_HEADER_SIZE + cell_num * LEAF_NODE_CELL_SIZE
}

fn internal_node_cell_offset(cell_num: usize) -> usize {
    INTERNAL_NODE_HEADER_SIZE + cell_num * INTERNAL_NODE_CELL_SIZE
}

impl Page {
    // Common header

    /// `page_num` only labels the error when the type byte is invalid.
    pub fn node_type(&self, page_num: u32) -> Result<NodeType> {
        NodeType::try_from(self.read_u8(NODE_TYPE_OFFSET)).map_err(|raw| {
            StorageError::CorruptPage {
                page_num,
                reason: format!("unknown node type {raw}"),
            }
        })
    }

    pub fn set_node_type(&mut self, node_type: NodeType) {
        self.write_u8(NODE_TYPE_OFFSET, node_type as u8);
    }

    pub fn is_root(&self) -> bool {
        self.read_u8(IS_ROOT_OFFSET) != 0
    }

    pub fn set_root(&mut self, is_root: bool) {
        self.write_u8(IS_ROOT_OFFSET, u8::from(is_root));
    }

    pub fn parent(&self) -> u32 {
        self.read_u32(PARENT_POINTER_OFFSET)
    }

    pub fn set_parent(&mut self, parent: u32) {
        self.write_u32(PARENT_POINTER_OFFSET, parent);
    }

    // Leaf nodes

    pub fn initialize_leaf_node(&mut self) {
        self.set_node_type(NodeType::Leaf);
        self.set_root(false);
        self.set_leaf_num_cells(0);
    }

    pub fn leaf_num_cells(&self) -> u32 {
        self.read_u32(LEAF_NODE_NUM_CELLS_OFFSET)
    }

    pub fn set_leaf_num_cells(&mut self, num_cells: u32) {
        self.write_u32(LEAF_NODE_NUM_CELLS_OFFSET, num_cells);
    }

    pub fn leaf_key(&self, cell_num: usize) -> u32 {
        self.read_u32(leaf_node_cell_offset(cell_num) + LEAF_NODE_KEY_OFFSET)
    }

    pub fn set_leaf_key(&mut self, cell_num: usize, key: u32) {
        self.write_u32(leaf_node_cell_offset(cell_num) + LEAF_NODE_KEY_OFFSET, key);
    }

    pub fn leaf_value(&self, cell_num: usize) -> &[u8] {
        self.slice(
            leaf_node_cell_offset(cell_num) + LEAF_NODE_VALUE_OFFSET,
            LEAF_NODE_VALUE_SIZE,
        )
    }

    pub fn leaf_value_mut(&mut self, cell_num: usize) -> &mut [u8] {
        self.slice_mut(
            leaf_node_cell_offset(cell_num) + LEAF_NODE_VALUE_OFFSET,
            LEAF_NODE_VALUE_SIZE,
        )
    }

    pub fn leaf_cell(&self, cell_num: usize) -> &[u8] {
        self.slice(leaf_node_cell_offset(cell_num), LEAF_NODE_CELL_SIZE)
    }

    pub fn set_leaf_cell(&mut self, cell_num: usize, cell: &[u8]) {
        self.slice_mut(leaf_node_cell_offset(cell_num), LEAF_NODE_CELL_SIZE)
            .copy_from_slice(&cell[..LEAF_NODE_CELL_SIZE]);
    }

    /// Shifts cells `[from, num_cells)` one slot to the right.
    pub fn leaf_shift_right(&mut self, from: usize) {
        let num_cells = self.leaf_num_cells() as usize;
        if from >= num_cells {
            return;
        }
        let src = leaf_node_cell_offset(from);
        let len = (num_cells - from) * LEAF_NODE_CELL_SIZE;
        self.move_bytes(src, src + LEAF_NODE_CELL_SIZE, len);
    }

    /// Slot of the smallest key >= `key`, or the cell count when `key` is
    /// larger than every key in the leaf.
    pub fn leaf_find(&self, key: u32) -> usize {
        let mut min_index = 0;
        let mut one_past_max_index = self.leaf_num_cells() as usize;

        while one_past_max_index != min_index {
            let index = (min_index + one_past_max_index) / 2;
            let key_at_index = self.leaf_key(index);
            if key == key_at_index {
                return index;
            }
            if key < key_at_index {
                one_past_max_index = index;
            } else {
                min_index = index + 1;
            }
        }

        min_index
    }

    // Internal nodes

    pub fn initialize_internal_node(&mut self) {
        self.set_node_type(NodeType::Internal);
        self.set_root(false);
        self.set_internal_num_keys(0);
    }

    pub fn internal_num_keys(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_NUM_KEYS_OFFSET)
    }

    pub fn set_internal_num_keys(&mut self, num_keys: u32) {
        self.write_u32(INTERNAL_NODE_NUM_KEYS_OFFSET, num_keys);
    }

    pub fn internal_right_child(&self) -> u32 {
        self.read_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET)
    }

    pub fn set_internal_right_child(&mut self, page_num: u32) {
        self.write_u32(INTERNAL_NODE_RIGHT_CHILD_OFFSET, page_num);
    }

    /// Child `child_num`; index `num_keys` is the right child.
    pub fn internal_child(&self, page_num: u32, child_num: usize) -> Result<u32> {
        let num_keys = self.internal_num_keys() as usize;
        if child_num > num_keys {
            return Err(StorageError::CorruptPage {
                page_num,
                reason: format!("child {child_num} requested, node has {num_keys} keys"),
            });
        }
        if child_num == num_keys {
            Ok(self.internal_right_child())
        } else {
            Ok(self.read_u32(internal_node_cell_offset(child_num)))
        }
    }

    pub fn set_internal_child(&mut self, cell_num: usize, page_num: u32) {
        self.write_u32(internal_node_cell_offset(cell_num), page_num);
    }

    pub fn internal_key(&self, key_num: usize) -> u32 {
        self.read_u32(internal_node_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE)
    }

    pub fn set_internal_key(&mut self, key_num: usize, key: u32) {
        self.write_u32(
            internal_node_cell_offset(key_num) + INTERNAL_NODE_CHILD_SIZE,
            key,
        );
    }

    /// Shifts cells `[from, num_keys)` one slot to the right.
    pub fn internal_shift_right(&mut self, from: usize) {
        let num_keys = self.internal_num_keys() as usize;
        if from >= num_keys {
            return;
        }
        let src = internal_node_cell_offset(from);
        let len = (num_keys - from) * INTERNAL_NODE_CELL_SIZE;
        self.move_bytes(src, src + INTERNAL_NODE_CELL_SIZE, len);
    }

    /// Index of the child whose subtree should contain `key`.
    pub fn internal_find_child(&self, key: u32) -> usize {
        let mut min_index = 0;
        let mut max_index = self.internal_num_keys() as usize; // one more child than keys

        while min_index != max_index {
            let index = (min_index + max_index) / 2;
            let key_to_right = self.internal_key(index);
            if key_to_right >= key {
                max_index = index;
            } else {
                min_index = index + 1;
            }
        }

        min_index
    }

    /// Position of `child` among this node's children, right child included.
    pub fn internal_child_index(&self, child: u32) -> Option<usize> {
        let num_keys = self.internal_num_keys() as usize;
        (0..num_keys)
            .find(|i| self.read_u32(internal_node_cell_offset(*i)) == child)
            .or_else(|| (self.internal_right_child() == child).then_some(num_keys))
    }

    /// Rewrites the routing key that used to be `old_key`. Keys routed to the
    /// right child have no stored key, so nothing changes for them.
    pub fn update_internal_node_key(&mut self, old_key: u32, new_key: u32) {
        let old_child_index = self.internal_find_child(old_key);
        if old_child_index < self.internal_num_keys() as usize {
            self.set_internal_key(old_child_index, new_key);
        }
    }
}
