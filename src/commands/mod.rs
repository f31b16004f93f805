//! Command implementations for gfftk.

pub mod ask_store;
pub mod convert;
pub mod filter;
pub mod ingest;
pub mod overview;
pub mod pattern;
pub mod plot;

pub use ask_store::{AskStoreCommand, StoreQuery};
pub use convert::{ConvertCommand, ConvertFormat, ConvertStats};
pub use filter::FilterCommand;
pub use ingest::{IngestCommand, IngestStats};
pub use overview::{Overview, OverviewCommand};
pub use pattern::{PatternFilterCommand, PatternFilterStats};
pub use plot::{PlotCommand, PlotTrack};
