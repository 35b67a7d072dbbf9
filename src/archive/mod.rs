//! On-disk thread archives and the freshness state stored alongside them.

pub mod freshness;
pub mod store;

pub use freshness::{compare, Freshness, FreshnessDetector, ValidationSnapshot, ValidatorField};
pub use store::{ArchiveStore, ThreadArchive};
