//! In-memory data sources.

mod input;
mod partitioned;
mod table;
mod tree;

pub use input::MemoryInputTable;
pub use partitioned::MemoryPartitionedTable;
pub use table::MemoryTable;
pub use tree::{MemoryTreeNode, MemoryTreeTable};
