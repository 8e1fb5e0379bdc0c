//! Processing history
//!
//! One row per processing step applied to the archive. Rows are appended
//! explicitly with [`crate::Archive::record_history`]; unloading writes the
//! rows exactly as held.

use chrono::Utc;

use crate::model::Archive;

/// State of the archive after one processing step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryRow {
    /// Processing date, `YYYY-MM-DDThh:mm:ss`
    pub date: String,
    /// Command that was run
    pub command: String,
    /// Polarization state label
    pub pol_type: String,
    /// Number of polarizations
    pub npol: u32,
    /// Number of phase bins
    pub nbin: u32,
    /// Number of bins in the folding period (0 if unknown)
    pub nbin_prd: u32,
    /// Bin width in seconds (0 if unknown)
    pub tbin: f64,
    /// Centre frequency, MHz
    pub centre_frequency: f64,
    /// Number of channels
    pub nchan: u32,
    /// Channel bandwidth, MHz
    pub channel_bandwidth: f64,
    /// Parallactic angle corrected
    pub parallactic_corrected: bool,
    /// Faraday rotation corrected
    pub rm_corrected: bool,
    /// Dedispersed
    pub dedispersed: bool,
    /// Scattering correction method
    pub scattering_method: String,
    /// Calibration method
    pub cal_method: String,
    /// Calibrator file
    pub cal_file: String,
    /// RFI excision method
    pub rfi_method: String,
}

impl HistoryRow {
    /// Snapshot of `archive` after running `command`
    pub fn describe(archive: &Archive, command: &str) -> HistoryRow {
        let nchan = archive.nchan();
        let channel_bandwidth = if nchan > 0 {
            archive.bandwidth / nchan as f64
        } else {
            0.0
        };
        HistoryRow {
            date: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            command: command.to_string(),
            pol_type: archive.state.label().to_string(),
            npol: archive.npol() as u32,
            nbin: archive.nbin() as u32,
            nbin_prd: 0,
            tbin: 0.0,
            centre_frequency: archive.centre_frequency,
            nchan: nchan as u32,
            channel_bandwidth,
            parallactic_corrected: false,
            rm_corrected: false,
            dedispersed: false,
            scattering_method: "NONE".to_string(),
            cal_method: "NONE".to_string(),
            cal_file: "NONE".to_string(),
            rfi_method: "NONE".to_string(),
        }
    }
}

/// Ordered processing history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessingHistory {
    /// Rows, oldest first
    pub rows: Vec<HistoryRow>,
}

impl ProcessingHistory {
    /// Most recent row
    pub fn last(&self) -> Option<&HistoryRow> {
        self.rows.last()
    }

    /// Append a row describing `archive` after running `command`
    pub fn record_state(&mut self, archive: &Archive, command: &str) {
        self.rows.push(HistoryRow::describe(archive, command));
    }

    /// Append a row
    pub fn push(&mut self, row: HistoryRow) {
        self.rows.push(row);
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
