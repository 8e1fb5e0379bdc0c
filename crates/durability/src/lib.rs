//! Durability layer for psrstore
//!
//! This crate handles everything that touches disk:
//!
//! - Container format: named records of keywords and fixed-width columns,
//!   with per-record checksums
//! - Templates: the canonical record set of a new container
//! - Atomic persist: write-temp, fsync, rename, fix permissions
//! - Termination cleanup of in-flight temporary files

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod format; // Container, Record, Template
pub mod persist; // AtomicPersist, CleanupRegistry

pub use format::{
    ColumnDesc, ColumnType, Container, Element, KeyValue, Keyword, Record, Template,
    CONTAINER_FORMAT_VERSION, CONTAINER_MAGIC,
};
pub use persist::{
    cleanup_stale_temp_files, fix_permissions, global_registry, AtomicPersist, CleanupGuard,
    CleanupRegistry, PersistReport, PersistState, DEFAULT_FILE_MODE, TEMP_SUFFIX,
};
#[cfg(feature = "termination")]
pub use persist::install_signal_cleanup;
