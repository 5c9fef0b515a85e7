//! Batch column generation for colgen.
//!
//! A run splits the dataset into contiguous row ranges, drives one worker per
//! range over the provider, and funnels every outcome through a single
//! aggregator that owns the only write to the dataset:
//!
//! ```text
//! partition → workers (tokio tasks) ─┬─ progress ─┐
//!                                    └─ results  ─┴→ aggregator → merge
//! ```

mod aggregator;
mod engine;
mod observer;
mod partition;
mod task;
mod worker;

pub use aggregator::{BatchReport, ResultEvent, RunState};
pub use engine::{Engine, GenerationJob, Preview};
pub use observer::{ProgressObserver, SilentProgress};
pub use partition::{WorkRange, partition};
pub use task::{RowOutput, row_variables};

pub use tokio_util::sync::CancellationToken;
