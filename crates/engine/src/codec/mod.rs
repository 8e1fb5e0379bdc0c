//! Versioned binary codec
//!
//! Maps an [`Archive`] onto a [`Container`] of named records and back.
//!
//! | Record     | Holds                                                    |
//! |------------|----------------------------------------------------------|
//! | `PRIMARY`  | source, pointing centre, epoch, observation and receiver |
//! | `HISTORY`  | processing history, one row per step                     |
//! | `FEEDPAR`  | polarization calibrator solution                         |
//! | `SPECKURT` | spectral kurtosis, one row per integration               |
//! | `SUBINT`   | integrations, one row each, with all profiles            |
//!
//! Writing starts from the container template so every file carries the
//! canonical layout; records whose extension is absent are removed.
//! Records this codec does not understand are carried through unchanged.
//!
//! Reading understands every header revision from 1.0 to
//! [`Revision::CURRENT`], translating legacy field names as it goes (see
//! [`migration`]). Writing always produces the current revision.

pub mod migration;

mod calibrator;
mod history;
mod kurtosis;
mod primary;
mod profile_column;
mod subint;

use std::path::Path;
use std::sync::Arc;

use psrstore_core::{Error, Limits, Result, ResultExt};
use psrstore_durability::{AtomicPersist, ColumnType, Container, PersistReport, Record};
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::extensions::{ArchiveExtension, ProcessingHistory, UnknownRecord};
use crate::model::Archive;

pub use migration::Revision;

/// Primary header record
pub const PRIMARY: &str = "PRIMARY";
/// Processing history record
pub const HISTORY: &str = "HISTORY";
/// Polarization calibrator record
pub const FEEDPAR: &str = "FEEDPAR";
/// Spectral kurtosis record
pub const SPECKURT: &str = "SPECKURT";
/// Integration record
pub const SUBINT: &str = "SUBINT";

/// Records with a dedicated codec
pub const KNOWN_RECORDS: [&str; 5] = [PRIMARY, HISTORY, FEEDPAR, SPECKURT, SUBINT];

/// Fail with `NonFinite` at the first NaN or infinite value
pub(crate) fn check_finite<T: Copy + Into<f64>>(record: &str, field: &str, values: &[T]) -> Result<()> {
    check_finite_from(record, field, values, 0)
}

/// As [`check_finite`], reporting indices offset by `base`
pub(crate) fn check_finite_from<T: Copy + Into<f64>>(
    record: &str,
    field: &str,
    values: &[T],
    base: usize,
) -> Result<()> {
    match values.iter().position(|&v| !v.into().is_finite()) {
        Some(index) => Err(Error::non_finite(record, field, base + index)),
        None => Ok(()),
    }
}

/// Element count of a cell shaped `dims`
///
/// Fails with `InvalidValue` if the product overflows or exceeds the
/// container repeat limit, so a bogus dimension never reaches an allocation.
pub(crate) fn cell_len(record: &str, field: &str, dims: &[usize]) -> Result<usize> {
    let max = Limits::default().max_repeat;
    match dims.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n)) {
        Some(len) if len <= max => Ok(len),
        Some(len) => Err(Error::invalid_value(
            record,
            field,
            format!("{:?} is {} elements, limit {}", dims, len, max),
        )),
        None => Err(Error::invalid_value(record, field, format!("{:?} overflows", dims))),
    }
}

/// Fail unless `column`, when present, holds exactly `len` elements per row
pub(crate) fn check_repeat(record: &Record, column: &str, len: usize) -> Result<()> {
    match record.column(column) {
        Some(desc) if desc.repeat != len => Err(Error::invalid_value(
            record.name(),
            column,
            format!("length {}, expected {}", desc.repeat, len),
        )),
        _ => Ok(()),
    }
}

/// The named record, created empty if the template lacks it
pub(crate) fn writable_record<'a>(container: &'a mut Container, name: &str) -> &'a mut Record {
    if container.record(name).is_none() {
        container.insert_record(Record::new(name));
    }
    match container.record_mut(name) {
        Some(record) => record,
        None => unreachable!("record {} was just inserted", name),
    }
}

/// Make sure `name` exists with the given type and element count
pub(crate) fn ensure_column(record: &mut Record, name: &str, ty: ColumnType, repeat: usize) -> Result<()> {
    match record.column(name) {
        None => record.add_column(name, ty, repeat),
        Some(desc) if desc.ty != ty => record.redefine_column(name, ty, repeat),
        Some(desc) if desc.repeat != repeat => record.modify_vector_len(name, repeat),
        Some(_) => Ok(()),
    }
}

/// Decode the archive stored at `path`
pub(crate) fn load_archive(path: &Path, config: &StoreConfig) -> Result<Archive> {
    config.validate()?;
    let container = Arc::new(
        Container::open(path).with_context(|| format!("load '{}'", path.display()))?,
    );
    let storage = config.amp_storage()?;
    let mut archive = Archive::empty(storage.clone());

    let primary = container.require_record(PRIMARY)?;
    let header = primary::read(primary).context("decode PRIMARY")?;
    let revision = header.revision;
    let reference_epoch = header.reference_epoch;
    let header_centre = header.centre_frequency;
    let header_bandwidth = header.bandwidth;
    header.apply(&mut archive);

    let history = history::read(&container).context("decode HISTORY")?;
    let last_row = history.as_ref().and_then(ProcessingHistory::last).cloned();

    // missing OBSFREQ/OBSBW fall back to the latest processing step
    let centre_frequency = header_centre
        .or_else(|| last_row.as_ref().map(|row| row.centre_frequency))
        .unwrap_or(0.0);
    let bandwidth = header_bandwidth
        .or_else(|| {
            last_row
                .as_ref()
                .map(|row| row.channel_bandwidth * f64::from(row.nchan))
        })
        .unwrap_or(0.0);
    archive.centre_frequency = centre_frequency;
    archive.bandwidth = bandwidth;

    let ctx = subint::ReadContext {
        revision,
        reference_epoch,
        centre_frequency,
        bandwidth,
        last_history: last_row.as_ref(),
        storage: &storage,
        defer_amps: config.defer_amps,
    };
    if let Some(mut data) = subint::read(&container, &ctx).context("decode SUBINT")? {
        kurtosis::read(&container, &mut data.integrations, config.defer_amps)
            .context("decode SPECKURT")?;
        archive.set_geometry(data.npol, data.nchan, data.nbin);
        archive.state = data.state;
        archive.rotation_measure = data.rotation_measure;
        for integration in data.integrations {
            archive.push_integration(integration)?;
        }
        debug!(target: "psrstore::codec", nsubint = archive.nsubint(), "Decoded integrations");
    } else {
        if container.record(SPECKURT).is_some() {
            warn!(target: "psrstore::codec", "SPECKURT without SUBINT; ignoring it");
        }
        if let Some(row) = last_row.as_ref() {
            archive.set_geometry(row.npol as usize, row.nchan as usize, row.nbin as usize);
        }
    }
    if let Some(history) = history {
        archive.add_extension(history);
    }

    if let Some(cal) = calibrator::read(&container).context("decode FEEDPAR")? {
        archive.add_extension(cal);
    }

    for record in container.records() {
        if KNOWN_RECORDS.contains(&record.name()) {
            continue;
        }
        warn!(
            target: "psrstore::codec",
            record = record.name(),
            "Unrecognised record; carrying it through unchanged"
        );
        archive
            .extensions_mut()
            .attach_slot(ArchiveExtension::Unknown(UnknownRecord::new(record.clone())));
    }
    Ok(archive)
}

/// Encode `archive` into a fresh container built from the template
pub(crate) fn encode_archive(archive: &Archive, config: &StoreConfig) -> Result<Container> {
    archive.check_geometry()?;
    let template = config.resolve_template()?;
    let mut container = template.instantiate()?;

    primary::write(archive, writable_record(&mut container, PRIMARY)).context("encode PRIMARY")?;
    history::write(archive, &mut container).context("encode HISTORY")?;
    calibrator::write(archive, &mut container).context("encode FEEDPAR")?;
    kurtosis::write(archive, &mut container).context("encode SPECKURT")?;
    subint::write(archive, &mut container, config).context("encode SUBINT")?;

    for slot in archive.extensions().iter() {
        if let ArchiveExtension::Unknown(unknown) = slot {
            container.insert_record(unknown.record().clone());
        }
    }
    Ok(container)
}

/// Encode `archive` then atomically replace `path` with it
pub(crate) fn unload_archive(archive: &Archive, path: &Path, config: &StoreConfig) -> Result<PersistReport> {
    config.validate()?;
    let container = encode_archive(archive, config)?;
    AtomicPersist::new(path)
        .with_mode(config.file_mode)
        .run(|file| container.write_to(file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_finite_reports_index() {
        assert!(check_finite("R", "F", &[1.0f32, 2.0]).is_ok());
        match check_finite_from("R", "F", &[1.0f64, f64::NAN], 10) {
            Err(Error::NonFinite { index, .. }) => assert_eq!(index, 11),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ensure_column_reshapes() {
        let mut record = Record::new(SUBINT);
        ensure_column(&mut record, "DATA", ColumnType::F32, 4).unwrap();
        ensure_column(&mut record, "DATA", ColumnType::F32, 8).unwrap();
        assert_eq!(record.column("DATA").unwrap().repeat, 8);
        ensure_column(&mut record, "DATA", ColumnType::I16, 8).unwrap();
        assert_eq!(record.column("DATA").unwrap().ty, ColumnType::I16);
    }

    #[test]
    fn test_cell_len_bounds_shape() {
        assert_eq!(cell_len(SUBINT, "DATA", &[4, 64, 1024]).unwrap(), 4 * 64 * 1024);
        assert_eq!(cell_len(SUBINT, "DATA", &[]).unwrap(), 1);
        let err = cell_len(SUBINT, "NCHAN", &[1 << 40]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
        let err = cell_len(SUBINT, "DATA", &[usize::MAX, 2]).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn test_check_repeat_ignores_absent_column() {
        let mut record = Record::new(SUBINT);
        record.add_column("DAT_WTS", ColumnType::F32, 4).unwrap();
        assert!(check_repeat(&record, "DAT_WTS", 4).is_ok());
        assert!(check_repeat(&record, "DAT_FREQ", 4).is_ok());
        assert!(matches!(
            check_repeat(&record, "DAT_WTS", 8),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_writable_record_creates_missing() {
        let mut container = Container::new();
        writable_record(&mut container, FEEDPAR).set_keyword("NCPAR", 3i64);
        assert_eq!(
            container.record(FEEDPAR).unwrap().key_int("NCPAR").unwrap(),
            Some(3)
        );
    }
}
