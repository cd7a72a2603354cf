//! Job payload persistence (key-value by job id).

pub mod in_memory;
pub mod payload;
pub mod store;

pub use in_memory::InMemoryJobStore;
pub use payload::JobPayload;
pub use store::{JobStore, StoreError};
