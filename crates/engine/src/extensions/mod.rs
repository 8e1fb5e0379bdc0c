//! Optional metadata blocks attached to archives and integrations
//!
//! | Scope | Extensions |
//! |-------|-----------|
//! | Archive | [`ObsInfo`], [`HeaderInfo`], [`Receiver`], [`ProcessingHistory`], [`PolnCalibratorExtension`] |
//! | Integration | [`Pointing`], [`SpectralKurtosis`] |
//!
//! Both scopes also hold [`UnknownRecord`]s passed through from the file.

mod calibrator;
mod header;
mod history;
mod kurtosis;
mod obs_info;
mod pointing;
mod receiver;
mod unknown;

pub use calibrator::{CalChannel, PolnCalibratorExtension};
pub use header::HeaderInfo;
pub use history::{HistoryRow, ProcessingHistory};
pub use kurtosis::{KurtosisData, SpectralKurtosis};
pub use obs_info::ObsInfo;
pub use pointing::Pointing;
pub use receiver::{Basis, FeedTracking, Receiver};
pub use unknown::UnknownRecord;

use crate::registry::extension_set;

extension_set! {
    /// Extension slot of an [`crate::Archive`]
    pub enum ArchiveExtension {
        /// Observer, project and telescope
        ObsInfo(ObsInfo),
        /// Descriptive primary header fields
        HeaderInfo(HeaderInfo),
        /// Front-end receiver
        Receiver(Receiver),
        /// Processing history
        History(ProcessingHistory),
        /// Polarization calibrator solution
        PolnCalibrator(PolnCalibratorExtension),
    }
}

extension_set! {
    /// Extension slot of an [`crate::Integration`]
    pub enum IntegrationExtension {
        /// Telescope pointing
        Pointing(Pointing),
        /// Spectral kurtosis statistics
        SpectralKurtosis(SpectralKurtosis),
    }
}
