//! HISTORY record: one row per processing step

use psrstore_core::Result;
use psrstore_durability::{ColumnType, Container, Record};
use tracing::warn;

use super::{check_finite, ensure_column, writable_record, HISTORY};
use crate::extensions::{HistoryRow, ProcessingHistory};
use crate::model::Archive;

/// Column layout of one history row
const COLUMNS: [(&str, ColumnType, usize); 17] = [
    ("DATE_PRO", ColumnType::Str, 24),
    ("PROC_CMD", ColumnType::Str, 256),
    ("POL_TYPE", ColumnType::Str, 8),
    ("NPOL", ColumnType::I32, 1),
    ("NBIN", ColumnType::I32, 1),
    ("NBIN_PRD", ColumnType::I32, 1),
    ("TBIN", ColumnType::F64, 1),
    ("CTR_FREQ", ColumnType::F64, 1),
    ("NCHAN", ColumnType::I32, 1),
    ("CHAN_BW", ColumnType::F64, 1),
    ("PAR_CORR", ColumnType::I32, 1),
    ("RM_CORR", ColumnType::I32, 1),
    ("DEDISP", ColumnType::I32, 1),
    ("SC_MTHD", ColumnType::Str, 32),
    ("CAL_MTHD", ColumnType::Str, 32),
    ("CAL_FILE", ColumnType::Str, 256),
    ("RFI_MTHD", ColumnType::Str, 32),
];

pub(crate) fn read(container: &Container) -> Result<Option<ProcessingHistory>> {
    let record = match container.record(HISTORY) {
        Some(record) => record,
        None => return Ok(None),
    };
    let rows = (0..record.nrows())
        .map(|row| read_row(record, row))
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(ProcessingHistory { rows }))
}

fn read_row(record: &Record, row: usize) -> Result<HistoryRow> {
    let int = |name: &str| -> Result<i32> { record.read_scalar::<i32>(name, row) };
    let count = |name: &str| -> Result<u32> { Ok(int(name)?.max(0) as u32) };
    Ok(HistoryRow {
        date: record.read_str("DATE_PRO", row)?,
        command: record.read_str("PROC_CMD", row)?,
        pol_type: record.read_str("POL_TYPE", row)?,
        npol: count("NPOL")?,
        nbin: count("NBIN")?,
        nbin_prd: count("NBIN_PRD")?,
        tbin: record.read_scalar("TBIN", row)?,
        centre_frequency: record.read_scalar("CTR_FREQ", row)?,
        nchan: count("NCHAN")?,
        channel_bandwidth: record.read_scalar("CHAN_BW", row)?,
        parallactic_corrected: int("PAR_CORR")? != 0,
        rm_corrected: int("RM_CORR")? != 0,
        dedispersed: int("DEDISP")? != 0,
        scattering_method: record.read_str("SC_MTHD", row)?,
        cal_method: record.read_str("CAL_MTHD", row)?,
        cal_file: record.read_str("CAL_FILE", row)?,
        rfi_method: record.read_str("RFI_MTHD", row)?,
    })
}

pub(crate) fn write(archive: &Archive, container: &mut Container) -> Result<()> {
    let history = match archive.get::<ProcessingHistory>() {
        Some(history) => history,
        None => {
            container.delete_record(HISTORY);
            return Ok(());
        }
    };
    let record = writable_record(container, HISTORY);
    for (name, ty, repeat) in COLUMNS {
        if record.column(name).is_none() {
            ensure_column(record, name, ty, repeat)?;
        }
    }
    record.set_rows(history.rows.len());
    for (row, entry) in history.rows.iter().enumerate() {
        check_finite(HISTORY, "TBIN", &[entry.tbin])?;
        check_finite(HISTORY, "CTR_FREQ", &[entry.centre_frequency])?;
        check_finite(HISTORY, "CHAN_BW", &[entry.channel_bandwidth])?;

        write_text(record, "DATE_PRO", row, &entry.date)?;
        write_text(record, "PROC_CMD", row, &entry.command)?;
        write_text(record, "POL_TYPE", row, &entry.pol_type)?;
        record.write_scalar("NPOL", row, entry.npol as i32)?;
        record.write_scalar("NBIN", row, entry.nbin as i32)?;
        record.write_scalar("NBIN_PRD", row, entry.nbin_prd as i32)?;
        record.write_scalar("TBIN", row, entry.tbin)?;
        record.write_scalar("CTR_FREQ", row, entry.centre_frequency)?;
        record.write_scalar("NCHAN", row, entry.nchan as i32)?;
        record.write_scalar("CHAN_BW", row, entry.channel_bandwidth)?;
        record.write_scalar("PAR_CORR", row, i32::from(entry.parallactic_corrected))?;
        record.write_scalar("RM_CORR", row, i32::from(entry.rm_corrected))?;
        record.write_scalar("DEDISP", row, i32::from(entry.dedispersed))?;
        write_text(record, "SC_MTHD", row, &entry.scattering_method)?;
        write_text(record, "CAL_MTHD", row, &entry.cal_method)?;
        write_text(record, "CAL_FILE", row, &entry.cal_file)?;
        write_text(record, "RFI_MTHD", row, &entry.rfi_method)?;
    }
    Ok(())
}

/// Write a string cell, clipping it to the column width
fn write_text(record: &mut Record, name: &str, row: usize, value: &str) -> Result<()> {
    let width = record.column(name).map_or(value.len(), |desc| desc.repeat);
    let mut end = value.len().min(width);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    if end < value.len() {
        warn!(target: "psrstore::codec", column = name, width, "History text clipped");
    }
    record.write_str(name, row, &value[..end])
}
