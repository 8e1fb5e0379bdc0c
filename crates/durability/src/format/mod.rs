//! On-disk container format.
//!
//! A container is an ordered set of named records. Each record carries
//! keywords (scalar key/value pairs) and fixed-width columns laid out
//! row-major. New containers are instantiated from a [`Template`].
//!
//! # Module Structure
//!
//! - `value`: keyword values and column element types
//! - `record`: one record, its layout operations and binary encoding
//! - `container`: file-level header, open/serialize
//! - `template`: TOML template of the canonical record set

mod bytes;
pub mod container;
pub mod record;
pub mod template;
pub mod value;

/// Magic bytes at the start of every container file.
pub const CONTAINER_MAGIC: &[u8; 4] = b"PSRC";

/// Current container format version.
pub const CONTAINER_FORMAT_VERSION: u32 = 1;

pub use container::{Container, CONTAINER_HEADER_SIZE};
pub use record::{ColumnDesc, Keyword, Record};
pub use template::{ColumnTemplate, KeywordTemplate, RecordTemplate, Template};
pub use value::{ColumnType, Element, KeyValue};
