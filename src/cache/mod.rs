pub mod records;
pub mod store;

pub use records::{next_expiry, CacheRecord, CacheVariant, CachedResult, FinalResult, ProgressSnapshot};
pub use store::{CacheError, CacheStore};
