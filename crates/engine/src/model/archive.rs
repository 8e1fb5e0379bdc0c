//! The in-memory archive

use std::path::Path;

use psrstore_core::{Error, Mjd, Result, SkyCoord};
use psrstore_durability::PersistReport;
use psrstore_storage::AmpStorage;
use tracing::info;

use super::integration::Integration;
use super::state::{ObservationType, PolnState};
use crate::codec;
use crate::config::StoreConfig;
use crate::extensions::{ArchiveExtension, HistoryRow, ProcessingHistory};
use crate::registry::{Extension, Registry};

/// A pulsar observation: header metadata plus integrations of profiles
///
/// Every integration has the archive's `npol x nchan x nbin` geometry.
/// Archives are not internally synchronized; one owner mutates at a time.
#[derive(Debug, Clone)]
pub struct Archive {
    /// Source name
    pub source: String,
    /// Source coordinates
    pub coordinates: SkyCoord,
    /// Centre frequency, MHz
    pub centre_frequency: f64,
    /// Total bandwidth, MHz (negative if the band is inverted)
    pub bandwidth: f64,
    /// Dispersion measure, pc/cm^3
    pub dispersion_measure: f64,
    /// Rotation measure, rad/m^2
    pub rotation_measure: f64,
    /// Observation start epoch
    pub reference_epoch: Mjd,
    /// Kind of observation
    pub obs_type: ObservationType,
    /// What the polarization axis holds
    pub state: PolnState,
    nbin: usize,
    npol: usize,
    nchan: usize,
    integrations: Vec<Integration>,
    extensions: Registry<ArchiveExtension>,
    storage: AmpStorage,
    file_revision: Option<String>,
}

impl Archive {
    /// Archive of `nsubint` zero-filled integrations on the heap
    pub fn new(nsubint: usize, npol: usize, nchan: usize, nbin: usize) -> Result<Self> {
        Archive::with_storage(nsubint, npol, nchan, nbin, AmpStorage::Heap)
    }

    /// Archive whose profile samples are allocated from `storage`
    pub fn with_storage(
        nsubint: usize,
        npol: usize,
        nchan: usize,
        nbin: usize,
        storage: AmpStorage,
    ) -> Result<Self> {
        let mut archive = Archive::empty(storage);
        archive.npol = npol;
        archive.nchan = nchan;
        archive.nbin = nbin;
        archive.state = match npol {
            2 => PolnState::PPQQ,
            4 => PolnState::Stokes,
            _ => PolnState::Intensity,
        };
        archive.resize(nsubint)?;
        Ok(archive)
    }

    pub(crate) fn empty(storage: AmpStorage) -> Self {
        Archive {
            source: String::new(),
            coordinates: SkyCoord::default(),
            centre_frequency: 0.0,
            bandwidth: 0.0,
            dispersion_measure: 0.0,
            rotation_measure: 0.0,
            reference_epoch: Mjd::default(),
            obs_type: ObservationType::default(),
            state: PolnState::default(),
            nbin: 0,
            npol: 0,
            nchan: 0,
            integrations: Vec::new(),
            extensions: Registry::new(),
            storage,
            file_revision: None,
        }
    }

    /// Read an archive using the default configuration
    pub fn load(path: impl AsRef<Path>) -> Result<Archive> {
        Archive::load_with(path, &StoreConfig::default())
    }

    /// Read an archive
    pub fn load_with(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Archive> {
        let path = path.as_ref();
        let archive = codec::load_archive(path, config)?;
        info!(
            target: "psrstore::codec",
            path = %path.display(),
            nsubint = archive.nsubint(),
            npol = archive.npol,
            nchan = archive.nchan,
            nbin = archive.nbin,
            "Loaded archive"
        );
        Ok(archive)
    }

    /// Atomically write the archive using the default configuration
    pub fn unload(&self, path: impl AsRef<Path>) -> Result<PersistReport> {
        self.unload_with(path, &StoreConfig::default())
    }

    /// Atomically write the archive
    ///
    /// On error the file at `path`, if any, is left untouched.
    pub fn unload_with(&self, path: impl AsRef<Path>, config: &StoreConfig) -> Result<PersistReport> {
        codec::unload_archive(self, path.as_ref(), config)
    }

    /// Number of integrations
    pub fn nsubint(&self) -> usize {
        self.integrations.len()
    }

    /// Number of polarizations
    pub fn npol(&self) -> usize {
        self.npol
    }

    /// Number of channels
    pub fn nchan(&self) -> usize {
        self.nchan
    }

    /// Number of phase bins
    pub fn nbin(&self) -> usize {
        self.nbin
    }

    /// Where profile samples are allocated
    pub fn storage(&self) -> &AmpStorage {
        &self.storage
    }

    /// Header revision of the file this archive was read from
    pub fn file_revision(&self) -> Option<&str> {
        self.file_revision.as_deref()
    }

    pub(crate) fn set_file_revision(&mut self, revision: Option<String>) {
        self.file_revision = revision;
    }

    pub(crate) fn set_geometry(&mut self, npol: usize, nchan: usize, nbin: usize) {
        self.npol = npol;
        self.nchan = nchan;
        self.nbin = nbin;
    }

    /// All integrations
    pub fn integrations(&self) -> &[Integration] {
        &self.integrations
    }

    /// Integration `isub`
    pub fn integration(&self, isub: usize) -> Result<&Integration> {
        let count = self.integrations.len();
        self.integrations
            .get(isub)
            .ok_or_else(|| Error::invalid_param(format!("integration {} of {}", isub, count)))
    }

    /// Mutable integration `isub`
    pub fn integration_mut(&mut self, isub: usize) -> Result<&mut Integration> {
        let count = self.integrations.len();
        self.integrations
            .get_mut(isub)
            .ok_or_else(|| Error::invalid_param(format!("integration {} of {}", isub, count)))
    }

    /// Append an integration with matching geometry
    pub fn push_integration(&mut self, integration: Integration) -> Result<()> {
        if (integration.npol(), integration.nchan(), integration.nbin())
            != (self.npol, self.nchan, self.nbin)
        {
            return Err(Error::invalid_param(format!(
                "integration is {}x{}x{}, archive is {}x{}x{}",
                integration.npol(),
                integration.nchan(),
                integration.nbin(),
                self.npol,
                self.nchan,
                self.nbin
            )));
        }
        self.integrations.push(integration);
        Ok(())
    }

    /// Grow or shrink to `nsubint` integrations
    ///
    /// New integrations are zero-filled with unit weights.
    pub fn resize(&mut self, nsubint: usize) -> Result<()> {
        self.integrations.truncate(nsubint);
        while self.integrations.len() < nsubint {
            let integration = Integration::new(self.npol, self.nchan, self.nbin, &self.storage)?;
            self.integrations.push(integration);
        }
        Ok(())
    }

    /// Change the number of phase bins of every profile
    pub fn resize_nbin(&mut self, nbin: usize) -> Result<()> {
        for integration in &mut self.integrations {
            integration.resize_nbin(nbin)?;
        }
        self.nbin = nbin;
        Ok(())
    }

    /// Extension of kind `T`, if attached
    pub fn get<T: Extension<ArchiveExtension>>(&self) -> Option<&T> {
        self.extensions.find::<T>()
    }

    /// Mutable extension of kind `T`, if attached
    pub fn get_mut<T: Extension<ArchiveExtension>>(&mut self) -> Option<&mut T> {
        self.extensions.find_mut::<T>()
    }

    /// Extension of kind `T`, attaching a default one if absent
    pub fn getadd<T: Extension<ArchiveExtension>>(&mut self) -> &mut T {
        self.extensions.get_or_create::<T>()
    }

    /// Attach `ext`, returning the previous extension of that kind
    pub fn add_extension<T: Extension<ArchiveExtension>>(&mut self, ext: T) -> Option<T> {
        self.extensions.attach(ext)
    }

    /// Detach the extension of kind `T`
    pub fn remove_extension<T: Extension<ArchiveExtension>>(&mut self) -> Option<T> {
        self.extensions.remove::<T>()
    }

    /// Attached extensions, unknown records included
    pub fn extensions(&self) -> &Registry<ArchiveExtension> {
        &self.extensions
    }

    /// Mutable extensions
    pub fn extensions_mut(&mut self) -> &mut Registry<ArchiveExtension> {
        &mut self.extensions
    }

    /// Append a history row describing the current state
    pub fn record_history(&mut self, command: &str) {
        let row = HistoryRow::describe(self, command);
        self.getadd::<ProcessingHistory>().push(row);
    }

    /// Check that every integration has the archive geometry
    pub fn check_geometry(&self) -> Result<()> {
        for (isub, integration) in self.integrations.iter().enumerate() {
            if (integration.npol(), integration.nchan(), integration.nbin())
                != (self.npol, self.nchan, self.nbin)
            {
                return Err(Error::invalid_state(format!(
                    "integration {} is {}x{}x{}, archive is {}x{}x{}",
                    isub,
                    integration.npol(),
                    integration.nchan(),
                    integration.nbin(),
                    self.npol,
                    self.nchan,
                    self.nbin
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::ObsInfo;

    #[test]
    fn test_new_archive_geometry() {
        let archive = Archive::new(3, 4, 8, 16).unwrap();
        assert_eq!(archive.nsubint(), 3);
        assert_eq!(archive.state, PolnState::Stokes);
        assert_eq!(archive.integration(2).unwrap().profiles().len(), 32);
        assert!(archive.integration(3).is_err());
        archive.check_geometry().unwrap();
    }

    #[test]
    fn test_push_rejects_mismatched_geometry() {
        let mut archive = Archive::new(0, 1, 4, 8).unwrap();
        let wrong = Integration::new(1, 4, 16, &AmpStorage::Heap).unwrap();
        assert!(archive.push_integration(wrong).is_err());
        let right = Integration::new(1, 4, 8, &AmpStorage::Heap).unwrap();
        archive.push_integration(right).unwrap();
        assert_eq!(archive.nsubint(), 1);
    }

    #[test]
    fn test_add_extension_replaces() {
        let mut archive = Archive::new(1, 1, 1, 4).unwrap();
        archive.add_extension(ObsInfo {
            observer: "first".into(),
            ..ObsInfo::default()
        });
        let old = archive.add_extension(ObsInfo {
            observer: "second".into(),
            ..ObsInfo::default()
        });
        assert_eq!(old.unwrap().observer, "first");
        assert_eq!(archive.get::<ObsInfo>().unwrap().observer, "second");
        assert_eq!(archive.extensions().len(), 1);
    }

    #[test]
    fn test_record_history_appends() {
        let mut archive = Archive::new(1, 2, 4, 8).unwrap();
        archive.bandwidth = 64.0;
        archive.record_history("pam -m");
        archive.record_history("pac -x");

        let history = archive.get::<ProcessingHistory>().unwrap();
        assert_eq!(history.len(), 2);
        let last = history.last().unwrap();
        assert_eq!(last.command, "pac -x");
        assert_eq!(last.pol_type, "AABB");
        assert_eq!(last.channel_bandwidth, 16.0);
    }

    #[test]
    fn test_resize_nbin() {
        let mut archive = Archive::new(2, 1, 2, 8).unwrap();
        archive.resize_nbin(4).unwrap();
        assert_eq!(archive.nbin(), 4);
        archive.check_geometry().unwrap();
        assert_eq!(
            archive.integration(1).unwrap().profile(0, 1).unwrap().nbin(),
            4
        );
    }
}
