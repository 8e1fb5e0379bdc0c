//! File-level descriptive header

use chrono::Utc;
use psrstore_core::Mjd;

/// Descriptive fields of the primary header
///
/// Presence of this extension controls whether the descriptive keywords
/// (`DATE`, `TRK_MODE`, `STT_DATE`, `STT_TIME`, `STT_LST`) are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderInfo {
    /// File creation date, `YYYY-MM-DDThh:mm:ss`
    pub creation_date: String,
    /// Telescope tracking mode (TRACK, SCANGC, ...)
    pub track_mode: String,
    /// Observation start date, `YYYY-MM-DD`
    pub start_date: String,
    /// Observation start time, `hh:mm:ss`
    pub start_time: String,
    /// Local sidereal time at the start, in seconds
    pub start_lst: f64,
}

impl HeaderInfo {
    /// Header stamped with the current time and the start of `epoch`
    pub fn stamped(epoch: &Mjd) -> Self {
        HeaderInfo {
            creation_date: Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string(),
            track_mode: "TRACK".to_string(),
            start_date: epoch.date_string(),
            start_time: epoch.time_string(),
            start_lst: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamped_uses_epoch_for_start() {
        let epoch = Mjd::new(55000, 43200, 0.0).unwrap();
        let header = HeaderInfo::stamped(&epoch);
        assert_eq!(header.start_date, "2009-06-18");
        assert_eq!(header.start_time, "12:00:00");
        assert_eq!(header.creation_date.len(), 19);
    }
}
