//! Header revisions and legacy field names
//!
//! Writers always produce the current revision. Readers consult the file's
//! `HDRVER`: when a current field is absent, a legacy name for it is tried
//! if the file predates the revision that replaced it (or if the revision
//! is unknown). Legacy names are tried newest first.
//!
//! | Current | Legacy | Replaced in |
//! |---------|--------|-------------|
//! | `STT_DATE` + `STT_TIME` | `DATE-OBS` split at `T` | 3.0 |
//! | `COORD_MD = J2000` | `EQUAT` | 5.0 |
//! | `COORD_MD = J2000` | `EQU` | 4.0 |
//! | `CHAN_DM` | `DM` | 4.0 |
//! | `OBSFREQ` | `FREQ` | 3.0 |
//! | `OBSBW` | `BW` | 3.0 |
//! | `TSUBINT` | `INT_TIME` | 2.0 |

use std::fmt;

use psrstore_core::Result;
use psrstore_durability::Record;
use tracing::{debug, warn};

/// Header revision `major.minor`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Revision {
    /// Major number
    pub major: u32,
    /// Minor number
    pub minor: u32,
}

impl Revision {
    /// Revision written by this library
    pub const CURRENT: Revision = Revision::new(6, 1);

    /// Build a revision
    pub const fn new(major: u32, minor: u32) -> Self {
        Revision { major, minor }
    }

    /// Parse `"major.minor"` (or `"major"`)
    pub fn parse(text: &str) -> Option<Revision> {
        let text = text.trim();
        let (major, minor) = match text.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (text, "0"),
        };
        Some(Revision {
            major: major.parse().ok()?,
            minor: minor.parse().ok()?,
        })
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A field that was renamed
#[derive(Debug, Clone, Copy)]
pub struct LegacyName {
    /// Current name
    pub current: &'static str,
    /// Name used before `replaced_in`
    pub legacy: &'static str,
    /// First revision using the current name
    pub replaced_in: Revision,
}

/// A keyword value that was relabelled
#[derive(Debug, Clone, Copy)]
pub struct LegacyLabel {
    /// Keyword holding the label
    pub field: &'static str,
    /// Current label
    pub current: &'static str,
    /// Label used before `replaced_in`
    pub legacy: &'static str,
    /// First revision using the current label
    pub replaced_in: Revision,
}

/// Renamed keywords and columns, newest first
pub const LEGACY_NAMES: &[LegacyName] = &[
    LegacyName {
        current: "CHAN_DM",
        legacy: "DM",
        replaced_in: Revision::new(4, 0),
    },
    LegacyName {
        current: "OBSFREQ",
        legacy: "FREQ",
        replaced_in: Revision::new(3, 0),
    },
    LegacyName {
        current: "OBSBW",
        legacy: "BW",
        replaced_in: Revision::new(3, 0),
    },
    LegacyName {
        current: "TSUBINT",
        legacy: "INT_TIME",
        replaced_in: Revision::new(2, 0),
    },
];

/// Relabelled keyword values, newest first
pub const LEGACY_LABELS: &[LegacyLabel] = &[
    LegacyLabel {
        field: "COORD_MD",
        current: "J2000",
        legacy: "EQUAT",
        replaced_in: Revision::new(5, 0),
    },
    LegacyLabel {
        field: "COORD_MD",
        current: "J2000",
        legacy: "EQU",
        replaced_in: Revision::new(4, 0),
    },
];

/// Combined date-time keyword split into `STT_DATE` and `STT_TIME`
pub const LEGACY_DATE_OBS: &str = "DATE-OBS";

/// Revision that introduced `STT_DATE` and `STT_TIME`
pub const DATE_OBS_REPLACED_IN: Revision = Revision::new(3, 0);

/// Reads fields of one record, falling back to legacy names
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    record: &'a Record,
    revision: Option<Revision>,
}

impl<'a> FieldReader<'a> {
    /// Reader for `record` of a file at `revision` (`None` if unknown)
    pub fn new(record: &'a Record, revision: Option<Revision>) -> Self {
        FieldReader { record, revision }
    }

    /// The underlying record
    pub fn record(&self) -> &'a Record {
        self.record
    }

    fn applies(&self, replaced_in: Revision) -> bool {
        match self.revision {
            Some(revision) => revision < replaced_in,
            None => true,
        }
    }

    fn resolve(&self, current: &'static str, present: impl Fn(&str) -> bool) -> Option<&'static str> {
        if present(current) {
            return Some(current);
        }
        let legacy = LEGACY_NAMES
            .iter()
            .filter(|m| m.current == current && self.applies(m.replaced_in))
            .map(|m| m.legacy)
            .find(|name| present(name))?;
        debug!(
            target: "psrstore::codec",
            record = self.record.name(),
            current,
            legacy,
            "Reading legacy field"
        );
        Some(legacy)
    }

    /// Name under which a keyword is stored
    pub fn key_name(&self, current: &'static str) -> Option<&'static str> {
        self.resolve(current, |name| self.record.has_keyword(name))
    }

    /// Name under which a column is stored
    pub fn column_name(&self, current: &'static str) -> Option<&'static str> {
        self.resolve(current, |name| self.record.has_column(name))
    }

    /// String keyword, current or legacy
    pub fn key_str(&self, current: &'static str) -> Result<Option<&'a str>> {
        match self.key_name(current) {
            Some(name) => self.record.key_str(name),
            None => Ok(None),
        }
    }

    /// Integer keyword, current or legacy
    pub fn key_int(&self, current: &'static str) -> Result<Option<i64>> {
        match self.key_name(current) {
            Some(name) => self.record.key_int(name),
            None => Ok(None),
        }
    }

    /// Float keyword, current or legacy
    pub fn key_float(&self, current: &'static str) -> Result<Option<f64>> {
        match self.key_name(current) {
            Some(name) => self.record.key_float(name),
            None => Ok(None),
        }
    }

    /// String keyword with legacy labels translated to current ones
    pub fn key_label(&self, field: &'static str) -> Result<Option<String>> {
        let value = match self.key_str(field)? {
            Some(value) => value.trim(),
            None => return Ok(None),
        };
        let relabel = LEGACY_LABELS
            .iter()
            .find(|m| m.field == field && m.legacy == value && self.applies(m.replaced_in));
        Ok(Some(match relabel {
            Some(m) => m.current.to_string(),
            None => value.to_string(),
        }))
    }

    /// Observation start as (`YYYY-MM-DD`, `hh:mm:ss`)
    pub fn start_date_time(&self) -> Result<(Option<String>, Option<String>)> {
        let date = self.record.key_str("STT_DATE")?.map(str::to_string);
        let time = self.record.key_str("STT_TIME")?.map(str::to_string);
        if date.is_some() || time.is_some() || !self.applies(DATE_OBS_REPLACED_IN) {
            return Ok((date, time));
        }
        match self.record.key_str(LEGACY_DATE_OBS)? {
            Some(combined) => {
                let (date, time) = match combined.split_once('T') {
                    Some((date, time)) => (date, time),
                    None => {
                        warn!(target: "psrstore::codec", value = combined, "DATE-OBS without time part");
                        (combined, "")
                    }
                };
                Ok((Some(date.to_string()), Some(time.to_string())))
            }
            None => Ok((None, None)),
        }
    }
}
