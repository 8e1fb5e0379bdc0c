use psrstore_durability::Record;

/// A container record no codec recognised
///
/// Held verbatim so that an unload writes it back with the same keywords,
/// columns and rows.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownRecord {
    record: Record,
}

impl UnknownRecord {
    /// Wrap a record read from a container
    pub fn new(record: Record) -> Self {
        UnknownRecord { record }
    }

    /// Record name
    pub fn name(&self) -> &str {
        self.record.name()
    }

    /// The record as read
    pub fn record(&self) -> &Record {
        &self.record
    }

    /// Unwrap the record
    pub fn into_record(self) -> Record {
        self.record
    }
}
