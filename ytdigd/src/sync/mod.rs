pub mod association;
pub mod engine;
pub mod records;
pub mod staleness;
pub mod store;
