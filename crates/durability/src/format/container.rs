//! Container files: an ordered sequence of named records.
//!
//! # Binary Format
//!
//! ```text
//! magic("PSRC", 4) + format_version(4) + record_count(4) + records...
//! ```
//!
//! [`Container::open`] maps the file read-only and decodes only record
//! headers; row data is read from the mapping on demand. The mapping is
//! shared by every record (and every clone of a record), so a loader that
//! keeps an `Arc<Container>` can fetch a single row long after the load.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use psrstore_core::{Error, Limits, Result};
use tracing::debug;

use super::bytes::{put_u32, Decoder, Source};
use super::record::Record;
use super::{CONTAINER_FORMAT_VERSION, CONTAINER_MAGIC};

/// Size of the fixed container header
pub const CONTAINER_HEADER_SIZE: usize = 12;

/// An in-memory or file-backed set of records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    records: Vec<Record>,
}

impl Container {
    /// Create an empty container
    pub fn new() -> Self {
        Container::default()
    }

    /// Open a container file with default limits
    pub fn open(path: &Path) -> Result<Container> {
        Self::open_with_limits(path, &Limits::default())
    }

    /// Open a container file, checking decoded sizes against `limits`
    pub fn open_with_limits(path: &Path, limits: &Limits) -> Result<Container> {
        let file = File::open(path).map_err(|e| Error::io("open", path, e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::io("stat", path, e))?
            .len();
        if (len as usize) < CONTAINER_HEADER_SIZE {
            return Err(Error::corrupt(format!(
                "'{}' is too short ({} bytes)",
                path.display(),
                len
            )));
        }

        // SAFETY: the file is opened read-only. Writers never modify a
        // container in place; they replace it by rename.
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::io("mmap", path, e))?;
        let container = Self::decode(Arc::new(Source::Mapped(map)), limits)?;
        debug!(
            target: "psrstore::codec",
            path = %path.display(),
            records = container.records.len(),
            "Opened container"
        );
        Ok(container)
    }

    /// Decode a container held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Container> {
        Self::decode(Arc::new(Source::Bytes(bytes)), &Limits::default())
    }

    fn decode(source: Arc<Source>, limits: &Limits) -> Result<Container> {
        let mut dec = Decoder::new(&source, 0);
        let magic = dec.take(4, "magic")?;
        if magic != CONTAINER_MAGIC {
            return Err(Error::corrupt(format!("invalid magic {:?}", magic)));
        }
        let version = dec.u32("format version")?;
        if version != CONTAINER_FORMAT_VERSION {
            return Err(Error::corrupt(format!(
                "unsupported container format version {}",
                version
            )));
        }
        let count = dec.u32("record count")? as usize;
        limits.check_records(count)?;

        let mut records = Vec::with_capacity(count);
        let mut pos = dec.pos();
        for _ in 0..count {
            let (record, next) = Record::decode(&source, pos, limits)?;
            records.push(record);
            pos = next;
        }
        if pos != source.len() {
            return Err(Error::corrupt(format!(
                "{} trailing bytes after last record",
                source.len() - pos
            )));
        }
        Ok(Container { records })
    }

    /// All records in file order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Names of all records in file order
    pub fn record_names(&self) -> Vec<&str> {
        self.records.iter().map(Record::name).collect()
    }

    /// A record by name; `None` if absent
    pub fn record(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|r| r.name() == name)
    }

    /// Mutable record by name; `None` if absent
    pub fn record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|r| r.name() == name)
    }

    /// A record that must be present
    pub fn require_record(&self, name: &str) -> Result<&Record> {
        self.record(name)
            .ok_or_else(|| Error::missing(name, "<record>"))
    }

    /// Mutable record that must be present
    pub fn require_record_mut(&mut self, name: &str) -> Result<&mut Record> {
        self.record_mut(name)
            .ok_or_else(|| Error::missing(name, "<record>"))
    }

    /// Replace the same-named record in place, or append
    pub fn insert_record(&mut self, record: Record) {
        match self.records.iter_mut().find(|r| r.name() == record.name()) {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    /// Remove a record; returns false if it was absent
    pub fn delete_record(&mut self, name: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.name() != name);
        self.records.len() != before
    }

    /// Check every record's row data against its stored CRC
    pub fn verify(&self) -> Result<()> {
        self.records.iter().try_for_each(Record::verify)
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CONTAINER_HEADER_SIZE);
        out.extend_from_slice(CONTAINER_MAGIC);
        put_u32(&mut out, CONTAINER_FORMAT_VERSION);
        put_u32(&mut out, self.records.len() as u32);
        for record in &self.records {
            record.encode(&mut out);
        }
        out
    }

    /// Serialize into a writer
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }
}
