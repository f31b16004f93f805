// Clippy allows for the whole crate
#![allow(clippy::too_many_arguments)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::type_complexity)]

//! gfftk: a toolbox for GFF3 annotation files
//!
//! This library reads GFF3 files into nested feature trees and provides
//! filtering, summarizing, conversion and plotting on top of them.
//!
//! # Features
//!
//! - **Nested filtering**: Select features by attribute values at any of
//!   three levels (gene, mRNA, exon) while keeping the enclosing hierarchy
//! - **Conversion**: JSON, FASTA, GenBank, GFF3 and a local document store
//! - **Plotting**: SVG rendering of a genomic window
//!
//! # Example
//!
//! ```rust,no_run
//! use gfftk::gff;
//! use gfftk::nested::NestedFeatureFilter;
//! use gfftk::selection::{AttributeFilterTable, SelectionCriteria};
//!
//! let records = gff::read_records("annotation.gff").unwrap();
//! let table = AttributeFilterTable::from_file("wanted.txt").unwrap();
//!
//! let filter = NestedFeatureFilter::new(SelectionCriteria::new().with_attributes(table));
//! let (kept, stats) = filter.filter_all(&records);
//! ```

pub mod commands;
pub mod config;
pub mod feature;
pub mod format;
pub mod gff;
pub mod nested;
pub mod selection;
pub mod sequence;
pub mod store;

// Re-export commonly used types
pub use feature::{Attributes, Feature, Location, Record, Strand};
pub use gff::{parse_records, read_records, GffError, GffReader};
pub use nested::{FilterStats, NestedFeatureFilter};
pub use selection::{AttributeFilterTable, SelectionCriteria, StrandFilter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::commands::{
        ConvertCommand, ConvertFormat, FilterCommand, IngestCommand, OverviewCommand,
        PatternFilterCommand, PlotCommand,
    };
    pub use crate::feature::{Feature, Record, Strand};
    pub use crate::format::GffWriter;
    pub use crate::gff::{parse_records, read_records, GffReader};
    pub use crate::nested::NestedFeatureFilter;
    pub use crate::selection::{AttributeFilterTable, SelectionCriteria, StrandFilter};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_workflow() {
        use crate::gff::parse_records;
        use crate::nested::NestedFeatureFilter;
        use crate::selection::{AttributeFilterTable, SelectionCriteria};

        let content = "ctg1\t.\tgene\t100\t200\t.\t+\t.\tID=g1\n\
                       ctg1\t.\tmRNA\t100\t200\t.\t+\t.\tID=m1;Parent=g1;product=kinase\n\
                       ctg1\t.\tgene\t300\t400\t.\t+\t.\tID=g2\n";
        let records = parse_records(content).unwrap();

        let table = AttributeFilterTable::parse("##product\nkinase\n").unwrap();
        let filter = NestedFeatureFilter::new(SelectionCriteria::new().with_attributes(table));
        let (kept, stats) = filter.filter_all(&records);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].features.len(), 1);
        assert_eq!(kept[0].features[0].id(), Some("g1"));
        assert_eq!(kept[0].features[0].children.len(), 1);
        assert_eq!(stats.features_out, 1);
    }

    #[test]
    fn test_convert_workflow() {
        use crate::commands::{ConvertCommand, ConvertFormat};
        use crate::gff::parse_records;

        let records = parse_records("ctg1\t.\tgene\t1\t4\t.\t+\t.\tID=g1\n").unwrap();
        let mut output = Vec::new();
        ConvertCommand::new()
            .with_format(ConvertFormat::Gff)
            .convert_records(&records, &mut output)
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text, "##gff-version 3\nctg1\t.\tgene\t1\t4\t.\t+\t.\tID=g1\n");
    }
}
