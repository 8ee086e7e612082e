//! Band ingestion: sources, staging buffers and the per-band reader task.

pub mod kafka;
pub mod memory;
pub mod reader;
pub mod source;
pub mod staging;

pub use kafka::KafkaBandSource;
pub use memory::{MemorySource, MemorySourceHandle};
pub use reader::StreamReader;
pub use source::{RecordSource, SourceMessage};
pub use staging::{Staged, StagingReceiver, StagingSender, staging_buffer};
