pub mod cache;
pub mod classifier;
pub mod ledger;
pub mod merge;
pub mod normalizer;
mod persist;
pub mod run_log;
pub mod scout;
pub mod source;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use cache::ClassificationCache;
pub use classifier::ClassifierGateway;
pub use ledger::{Ledger, LedgerStats};
pub use run_log::RunLog;
pub use scout::{CycleOptions, CycleReport, CycleStats, Scout};
