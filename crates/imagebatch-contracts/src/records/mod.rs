mod entry;
mod store;
mod summary;

pub use entry::{GenerationRecord, RecordEntry, RecordStatus};
pub use store::GenerationRecordStore;
pub use summary::{write_summary, RunSummary};
