//! Damaged-container inspection and salvage.

pub mod scanner;

pub use scanner::{
    extract_recoverable, scan, scan_file, BlockHealth, RecoveryQuality, RecoveryReport, ScannedBlock,
};
