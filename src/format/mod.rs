//! GFF3 line parsing and writing helpers.
//!
//! - Zero-allocation column splitting and integer parsing
//! - Percent-decoding of attribute text
//! - Buffered tree-aware output

pub mod output;
pub mod parsing;

pub use output::{write_records, GffWriter};
pub use parsing::{parse_u64_fast, percent_decode, should_skip_line, split_columns, GFF_COLUMNS};
