pub mod filter_operator;
pub mod filter_parser;
pub mod page;
pub mod sort_parser;

pub use filter_operator::{AttrPath, CompareOp, FilterOp, FilterValue};
pub use filter_parser::parse_filter;
pub use page::PageParams;
pub use sort_parser::{SortOrder, SortSpec};
