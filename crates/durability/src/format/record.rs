//! Named records: keywords plus fixed-width row-major columns.
//!
//! # Binary Format
//!
//! ```text
//! name + nkeys(4) + keywords + ncols(4) + columns + nrows(8) + header_crc(4)
//! + rows(nrows * row_width) + data_crc(4)
//!
//! keyword = name + tag(1) + value
//!   value = len(4) + utf8 | i64 | f64 | u8
//! column  = name + type_code(1) + repeat(8)
//! name    = len(2) + utf8
//! ```
//!
//! The header CRC is checked when a record is decoded. Row data read from a
//! file stays in the shared mapping and its CRC is only checked by
//! [`Record::verify`], so opening a large container does not touch every
//! page. Any mutation copies the rows into an owned buffer first.

use std::fmt;
use std::sync::Arc;

use psrstore_core::{Error, Limits, Result};

use super::bytes::{put_f64, put_i64, put_name, put_string, put_u32, put_u64, put_u8, Decoder, Source};
use super::value::{ColumnType, Element, KeyValue};

/// A keyword of a record
#[derive(Debug, Clone, PartialEq)]
pub struct Keyword {
    /// Keyword name
    pub name: String,
    /// Keyword value
    pub value: KeyValue,
}

/// Declaration of one column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    /// Column name
    pub name: String,
    /// Element type
    pub ty: ColumnType,
    /// Elements per cell (bytes for string columns)
    pub repeat: usize,
}

impl ColumnDesc {
    /// Bytes per cell
    pub fn width(&self) -> usize {
        self.ty.width() * self.repeat
    }
}

#[derive(Clone)]
enum RowData {
    Owned(Vec<u8>),
    Shared {
        source: Arc<Source>,
        start: usize,
        len: usize,
        crc: u32,
    },
}

/// One named record of a container
#[derive(Clone)]
pub struct Record {
    name: String,
    keywords: Vec<Keyword>,
    columns: Vec<ColumnDesc>,
    nrows: usize,
    data: RowData,
}

impl Record {
    /// Create an empty record
    pub fn new(name: impl Into<String>) -> Self {
        Record {
            name: name.into(),
            keywords: Vec::new(),
            columns: Vec::new(),
            nrows: 0,
            data: RowData::Owned(Vec::new()),
        }
    }

    /// Record name
    pub fn name(&self) -> &str {
        &self.name
    }

    // ========================================================================
    // Keywords
    // ========================================================================

    /// All keywords in declaration order
    pub fn keywords(&self) -> &[Keyword] {
        &self.keywords
    }

    /// Value of a keyword, if present
    pub fn keyword(&self, name: &str) -> Option<&KeyValue> {
        self.keywords
            .iter()
            .find(|k| k.name == name)
            .map(|k| &k.value)
    }

    /// True if the keyword is present
    pub fn has_keyword(&self, name: &str) -> bool {
        self.keyword(name).is_some()
    }

    /// Update a keyword in place, or append it
    pub fn set_keyword(&mut self, name: &str, value: impl Into<KeyValue>) {
        let value = value.into();
        match self.keywords.iter_mut().find(|k| k.name == name) {
            Some(keyword) => keyword.value = value,
            None => self.keywords.push(Keyword {
                name: name.to_string(),
                value,
            }),
        }
    }

    /// Remove a keyword; returns false if it was absent
    pub fn delete_keyword(&mut self, name: &str) -> bool {
        let before = self.keywords.len();
        self.keywords.retain(|k| k.name != name);
        self.keywords.len() != before
    }

    /// String keyword; `Ok(None)` if absent
    pub fn key_str(&self, name: &str) -> Result<Option<&str>> {
        match self.keyword(name) {
            None => Ok(None),
            Some(KeyValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(self.key_mismatch(name, "string", other)),
        }
    }

    /// Integer keyword; `Ok(None)` if absent
    pub fn key_int(&self, name: &str) -> Result<Option<i64>> {
        match self.keyword(name) {
            None => Ok(None),
            Some(KeyValue::Int(i)) => Ok(Some(*i)),
            Some(other) => Err(self.key_mismatch(name, "integer", other)),
        }
    }

    /// Float keyword (integers are promoted); `Ok(None)` if absent
    pub fn key_float(&self, name: &str) -> Result<Option<f64>> {
        match self.keyword(name) {
            None => Ok(None),
            Some(KeyValue::Float(x)) => Ok(Some(*x)),
            Some(KeyValue::Int(i)) => Ok(Some(*i as f64)),
            Some(other) => Err(self.key_mismatch(name, "float", other)),
        }
    }

    /// Logical keyword; `Ok(None)` if absent
    pub fn key_bool(&self, name: &str) -> Result<Option<bool>> {
        match self.keyword(name) {
            None => Ok(None),
            Some(KeyValue::Logical(b)) => Ok(Some(*b)),
            Some(other) => Err(self.key_mismatch(name, "logical", other)),
        }
    }

    fn key_mismatch(&self, name: &str, expected: &'static str, found: &KeyValue) -> Error {
        Error::type_mismatch(&self.name, name, expected, found.type_name())
    }

    // ========================================================================
    // Column layout
    // ========================================================================

    /// All columns in row order
    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Declaration of a column, if present
    pub fn column(&self, name: &str) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True if the column is present
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Bytes per row
    pub fn row_width(&self) -> usize {
        self.columns.iter().map(ColumnDesc::width).sum()
    }

    /// Append a column; existing rows get a zeroed cell
    pub fn add_column(&mut self, name: &str, ty: ColumnType, repeat: usize) -> Result<()> {
        self.check_writable_repeat(name, repeat)?;
        if self.has_column(name) {
            return Err(Error::invalid_param(format!(
                "column {} already exists in {}",
                name, self.name
            )));
        }
        let mut columns = self.columns.clone();
        columns.push(ColumnDesc {
            name: name.to_string(),
            ty,
            repeat,
        });
        self.relayout(columns);
        Ok(())
    }

    /// Remove a column; returns false if it was absent
    pub fn delete_column(&mut self, name: &str) -> bool {
        if !self.has_column(name) {
            return false;
        }
        let columns = self
            .columns
            .iter()
            .filter(|c| c.name != name)
            .cloned()
            .collect();
        self.relayout(columns);
        true
    }

    /// Change the element count of a column, keeping the common prefix
    /// of every cell and zero-filling any growth
    pub fn modify_vector_len(&mut self, name: &str, repeat: usize) -> Result<()> {
        let ty = self.require_column(name)?.ty;
        self.check_writable_repeat(name, repeat)?;
        self.redefine(name, ty, repeat);
        Ok(())
    }

    /// Change the element type and count of a column
    ///
    /// Cells are zeroed if the type changes.
    pub fn redefine_column(&mut self, name: &str, ty: ColumnType, repeat: usize) -> Result<()> {
        self.require_column(name)?;
        self.check_writable_repeat(name, repeat)?;
        self.redefine(name, ty, repeat);
        Ok(())
    }

    /// Columns longer than the decode limit could be written but never read back
    fn check_writable_repeat(&self, name: &str, repeat: usize) -> Result<()> {
        let max = Limits::default().max_repeat;
        if repeat > max {
            return Err(Error::invalid_param(format!(
                "column {}.{} repeat {} exceeds limit {}",
                self.name, name, repeat, max
            )));
        }
        Ok(())
    }

    fn redefine(&mut self, name: &str, ty: ColumnType, repeat: usize) {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                if c.name == name {
                    ColumnDesc {
                        name: c.name.clone(),
                        ty,
                        repeat,
                    }
                } else {
                    c.clone()
                }
            })
            .collect();
        self.relayout(columns);
    }

    /// Truncate or zero-extend to `nrows` rows
    pub fn set_rows(&mut self, nrows: usize) {
        let width = self.row_width();
        self.bytes_mut().resize(nrows * width, 0);
        self.nrows = nrows;
    }

    fn relayout(&mut self, columns: Vec<ColumnDesc>) {
        let old_width = self.row_width();
        let new_width: usize = columns.iter().map(ColumnDesc::width).sum();

        let mut out = vec![0u8; self.nrows * new_width];
        {
            let old = self.bytes();
            let mut copies = Vec::new();
            let mut new_offset = 0;
            for column in &columns {
                if let Some((old_column, old_offset)) = self.locate(&column.name) {
                    if old_column.ty == column.ty {
                        let n = old_column.width().min(column.width());
                        copies.push((old_offset, new_offset, n));
                    }
                }
                new_offset += column.width();
            }
            for row in 0..self.nrows {
                let src = &old[row * old_width..(row + 1) * old_width];
                let dst = &mut out[row * new_width..(row + 1) * new_width];
                for &(from, to, n) in &copies {
                    dst[to..to + n].copy_from_slice(&src[from..from + n]);
                }
            }
        }

        self.columns = columns;
        self.data = RowData::Owned(out);
    }

    fn locate(&self, name: &str) -> Option<(&ColumnDesc, usize)> {
        let mut offset = 0;
        for column in &self.columns {
            if column.name == name {
                return Some((column, offset));
            }
            offset += column.width();
        }
        None
    }

    fn require_column(&self, name: &str) -> Result<&ColumnDesc> {
        self.column(name)
            .ok_or_else(|| Error::missing(&self.name, name))
    }

    // ========================================================================
    // Cells
    // ========================================================================

    fn cell(&self, name: &str, row: usize) -> Result<(&ColumnDesc, usize)> {
        let (column, offset) = self
            .locate(name)
            .ok_or_else(|| Error::missing(&self.name, name))?;
        if row >= self.nrows {
            return Err(Error::invalid_param(format!(
                "row {} out of range for {} ({} rows)",
                row, self.name, self.nrows
            )));
        }
        Ok((column, row * self.row_width() + offset))
    }

    fn typed_cell<T: Element>(&self, name: &str, row: usize) -> Result<(usize, usize)> {
        let (column, start) = self.cell(name, row)?;
        if column.ty != T::TYPE {
            return Err(Error::type_mismatch(
                &self.name,
                name,
                T::TYPE.name(),
                column.ty.name(),
            ));
        }
        Ok((start, column.repeat))
    }

    /// Whole cell of a numeric column
    pub fn read_col<T: Element>(&self, name: &str, row: usize) -> Result<Vec<T>> {
        let (_, repeat) = self.typed_cell::<T>(name, row)?;
        self.read_col_range(name, row, 0, repeat)
    }

    /// `count` elements of a numeric cell starting at element `first`
    pub fn read_col_range<T: Element>(
        &self,
        name: &str,
        row: usize,
        first: usize,
        count: usize,
    ) -> Result<Vec<T>> {
        let (start, repeat) = self.typed_cell::<T>(name, row)?;
        if first + count > repeat {
            return Err(Error::invalid_param(format!(
                "elements {}..{} out of range for {}.{} (repeat {})",
                first,
                first + count,
                self.name,
                name,
                repeat
            )));
        }
        let width = T::TYPE.width();
        let begin = start + first * width;
        let bytes = &self.bytes()[begin..begin + count * width];
        Ok(bytes.chunks_exact(width).map(T::read).collect())
    }

    /// First element of a numeric cell
    pub fn read_scalar<T: Element>(&self, name: &str, row: usize) -> Result<T> {
        let values = self.read_col_range::<T>(name, row, 0, 1)?;
        Ok(values[0])
    }

    /// Overwrite a whole numeric cell; `values.len()` must equal the repeat
    pub fn write_col<T: Element>(&mut self, name: &str, row: usize, values: &[T]) -> Result<()> {
        let (start, repeat) = self.typed_cell::<T>(name, row)?;
        if values.len() != repeat {
            return Err(Error::invalid_param(format!(
                "{} values for {}.{} with repeat {}",
                values.len(),
                self.name,
                name,
                repeat
            )));
        }
        let width = T::TYPE.width();
        let cell = &mut self.bytes_mut()[start..start + repeat * width];
        for (chunk, value) in cell.chunks_exact_mut(width).zip(values) {
            value.write(chunk);
        }
        Ok(())
    }

    /// Write a single-element numeric cell
    pub fn write_scalar<T: Element>(&mut self, name: &str, row: usize, value: T) -> Result<()> {
        self.write_col(name, row, &[value])
    }

    /// Read a string cell, trimmed at the first NUL
    pub fn read_str(&self, name: &str, row: usize) -> Result<String> {
        let (column, start) = self.cell(name, row)?;
        if column.ty != ColumnType::Str {
            return Err(Error::type_mismatch(&self.name, name, "str", column.ty.name()));
        }
        let bytes = &self.bytes()[start..start + column.repeat];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8(bytes[..end].to_vec())
            .map_err(|_| Error::corrupt(format!("invalid UTF-8 in {}.{}", self.name, name)))
    }

    /// Write a string cell, NUL-padded to the column width
    pub fn write_str(&mut self, name: &str, row: usize, value: &str) -> Result<()> {
        let (column, start) = self.cell(name, row)?;
        if column.ty != ColumnType::Str {
            return Err(Error::type_mismatch(&self.name, name, "str", column.ty.name()));
        }
        let repeat = column.repeat;
        if value.len() > repeat {
            return Err(Error::invalid_param(format!(
                "'{}' exceeds {} bytes of {}.{}",
                value, repeat, self.name, name
            )));
        }
        let cell = &mut self.bytes_mut()[start..start + repeat];
        cell.fill(0);
        cell[..value.len()].copy_from_slice(value.as_bytes());
        Ok(())
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    fn bytes(&self) -> &[u8] {
        match &self.data {
            RowData::Owned(bytes) => bytes,
            RowData::Shared {
                source, start, len, ..
            } => &source[*start..*start + *len],
        }
    }

    fn bytes_mut(&mut self) -> &mut Vec<u8> {
        if let RowData::Shared { .. } = self.data {
            self.data = RowData::Owned(self.bytes().to_vec());
        }
        match &mut self.data {
            RowData::Owned(bytes) => bytes,
            RowData::Shared { .. } => unreachable!("row data converted to owned above"),
        }
    }

    /// Check the row data against its stored CRC
    ///
    /// Records built or modified in memory have nothing to check.
    pub fn verify(&self) -> Result<()> {
        if let RowData::Shared { crc, .. } = &self.data {
            let actual = crc32fast::hash(self.bytes());
            if actual != *crc {
                return Err(Error::corrupt(format!(
                    "row data checksum mismatch in {}: expected {:08x}, got {:08x}",
                    self.name, crc, actual
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        let header_start = out.len();
        put_name(out, &self.name);

        put_u32(out, self.keywords.len() as u32);
        for keyword in &self.keywords {
            put_name(out, &keyword.name);
            put_u8(out, keyword.value.tag());
            match &keyword.value {
                KeyValue::Str(s) => put_string(out, s),
                KeyValue::Int(i) => put_i64(out, *i),
                KeyValue::Float(x) => put_f64(out, *x),
                KeyValue::Logical(b) => put_u8(out, *b as u8),
            }
        }

        put_u32(out, self.columns.len() as u32);
        for column in &self.columns {
            put_name(out, &column.name);
            put_u8(out, column.ty.code());
            put_u64(out, column.repeat as u64);
        }
        put_u64(out, self.nrows as u64);

        let header_crc = crc32fast::hash(&out[header_start..]);
        put_u32(out, header_crc);

        let data = self.bytes();
        out.extend_from_slice(data);
        put_u32(out, crc32fast::hash(data));
    }

    pub(crate) fn decode(source: &Arc<Source>, pos: usize, limits: &Limits) -> Result<(Record, usize)> {
        let buf: &[u8] = source;
        let mut dec = Decoder::new(buf, pos);

        let name = dec.name(limits)?;

        let nkeys = dec.u32("keyword count")? as usize;
        limits.check_keywords(nkeys)?;
        let mut keywords = Vec::with_capacity(nkeys);
        for _ in 0..nkeys {
            let key = dec.name(limits)?;
            let value = match dec.u8("keyword tag")? {
                KeyValue::TAG_STR => KeyValue::Str(dec.string(limits)?),
                KeyValue::TAG_INT => KeyValue::Int(dec.i64("integer keyword")?),
                KeyValue::TAG_FLOAT => KeyValue::Float(dec.f64("float keyword")?),
                KeyValue::TAG_LOGICAL => KeyValue::Logical(dec.u8("logical keyword")? != 0),
                tag => {
                    return Err(Error::corrupt(format!(
                        "unknown keyword tag {} for {}.{}",
                        tag, name, key
                    )))
                }
            };
            keywords.push(Keyword { name: key, value });
        }

        let ncols = dec.u32("column count")? as usize;
        limits.check_columns(ncols)?;
        let mut columns = Vec::with_capacity(ncols);
        for _ in 0..ncols {
            let column = dec.name(limits)?;
            let code = dec.u8("column type")?;
            let ty = ColumnType::from_code(code).ok_or_else(|| {
                Error::corrupt(format!("unknown type code {} for {}.{}", code, name, column))
            })?;
            let repeat = dec.u64("column repeat")? as usize;
            limits.check_repeat(repeat)?;
            columns.push(ColumnDesc {
                name: column,
                ty,
                repeat,
            });
        }
        let nrows = dec.u64("row count")? as usize;

        let computed = crc32fast::hash(&buf[pos..dec.pos()]);
        let stored = dec.u32("header checksum")?;
        if computed != stored {
            return Err(Error::corrupt(format!(
                "header checksum mismatch in {}: expected {:08x}, got {:08x}",
                name, stored, computed
            )));
        }

        let row_width: usize = columns.iter().map(ColumnDesc::width).sum();
        let len = nrows
            .checked_mul(row_width)
            .ok_or_else(|| Error::corrupt(format!("row data size overflow in {}", name)))?;
        let start = dec.pos();
        dec.take(len, "row data")?;
        let crc = dec.u32("data checksum")?;

        let record = Record {
            name,
            keywords,
            columns,
            nrows,
            data: RowData::Shared {
                source: Arc::clone(source),
                start,
                len,
                crc,
            },
        };
        Ok((record, dec.pos()))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("keywords", &self.keywords.len())
            .field("columns", &self.columns)
            .field("nrows", &self.nrows)
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.keywords == other.keywords
            && self.columns == other.columns
            && self.nrows == other.nrows
            && self.bytes() == other.bytes()
    }
}
