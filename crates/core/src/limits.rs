//! Size limits for container structures
//!
//! The container reader checks every length it decodes against these
//! limits before allocating, so a corrupt length field fails with
//! [`Error::Corrupt`] instead of an enormous allocation.

use crate::error::{Error, Result};

/// Size limits applied when decoding a container
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum record, keyword or column name length in bytes (default: 64)
    pub max_name_bytes: usize,

    /// Maximum string keyword length in bytes (default: 64KB)
    pub max_string_bytes: usize,

    /// Maximum number of records in one container (default: 1024)
    pub max_records: usize,

    /// Maximum keywords per record (default: 4096)
    pub max_keywords: usize,

    /// Maximum columns per record (default: 1024)
    pub max_columns: usize,

    /// Maximum elements in one column cell (default: 256M)
    pub max_repeat: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_name_bytes: 64,
            max_string_bytes: 64 * 1024,
            max_records: 1024,
            max_keywords: 4096,
            max_columns: 1024,
            max_repeat: 256 * 1024 * 1024,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_name_bytes: 16,
            max_string_bytes: 64,
            max_records: 4,
            max_keywords: 8,
            max_columns: 8,
            max_repeat: 1024,
        }
    }

    /// Validate a decoded name length
    pub fn check_name(&self, len: usize) -> Result<()> {
        check("name length", len, self.max_name_bytes)
    }

    /// Validate a decoded string keyword length
    pub fn check_string(&self, len: usize) -> Result<()> {
        check("string length", len, self.max_string_bytes)
    }

    /// Validate a decoded record count
    pub fn check_records(&self, count: usize) -> Result<()> {
        check("record count", count, self.max_records)
    }

    /// Validate a decoded keyword count
    pub fn check_keywords(&self, count: usize) -> Result<()> {
        check("keyword count", count, self.max_keywords)
    }

    /// Validate a decoded column count
    pub fn check_columns(&self, count: usize) -> Result<()> {
        check("column count", count, self.max_columns)
    }

    /// Validate a decoded column repeat
    pub fn check_repeat(&self, repeat: usize) -> Result<()> {
        check("column repeat", repeat, self.max_repeat)
    }
}

fn check(what: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        Err(Error::corrupt(format!("{} {} exceeds limit {}", what, value, max)))
    } else {
        Ok(())
    }
}
