pub mod collector;
pub mod engine;
pub mod extractor;
pub mod loader;
pub mod query;
pub mod session;
pub mod sheets;
pub mod sink;

pub use crate::domain::model::{ExtractionRecord, Query, Record, SearchRecord, Table};
pub use crate::domain::ports::{
    ConfigProvider, ExtractionService, SearchService, SourceDescriptor, Storage,
};
pub use crate::utils::error::Result;
