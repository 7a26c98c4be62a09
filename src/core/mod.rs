pub mod engine;
pub mod hasher;
pub mod scanner;

pub use engine::{SyncConfig, SyncEngine, SyncReport, TransferOutcome};
pub use hasher::hash_file;
pub use scanner::{FileScanner, LocalFile};
