//! Bucket-restricted exact search.
//!
//! Points are grouped into a [`BucketTable`]; a router decides which bucket
//! each query visits per round and [`BucketProbeSearch`] computes exact
//! distances inside the visited buckets, merging rounds into [`ResultRows`].

mod bucket_table;
mod probe;
mod result_rows;
mod timings;
mod two_level;

pub use bucket_table::BucketTable;
pub use probe::{BucketProbeSearch, RoundOutput, SearchOutput};
pub use result_rows::ResultRows;
pub use timings::{RoundTimings, SearchTimings};
pub use two_level::probe_plan;
