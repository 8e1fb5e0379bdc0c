//! One sub-integration of an archive

use psrstore_core::{Error, Mjd, Result};
use psrstore_storage::AmpStorage;

use super::profile::Profile;
use crate::extensions::IntegrationExtension;
use crate::registry::{Extension, Registry};

/// Profiles of all polarizations and channels over one time span
///
/// Profiles are stored polarization-major: index `ipol * nchan + ichan`.
#[derive(Debug, Clone)]
pub struct Integration {
    epoch: Mjd,
    duration: f64,
    npol: usize,
    nchan: usize,
    nbin: usize,
    frequencies: Vec<f64>,
    weights: Vec<f32>,
    profiles: Vec<Profile>,
    extensions: Registry<IntegrationExtension>,
}

impl Integration {
    /// Zero-filled integration with unit weights
    pub fn new(npol: usize, nchan: usize, nbin: usize, storage: &AmpStorage) -> Result<Self> {
        let profiles = (0..npol * nchan)
            .map(|_| Profile::new(nbin, storage))
            .collect::<Result<Vec<_>>>()?;
        Ok(Integration {
            epoch: Mjd::default(),
            duration: 0.0,
            npol,
            nchan,
            nbin,
            frequencies: vec![0.0; nchan],
            weights: vec![1.0; nchan],
            profiles,
            extensions: Registry::new(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        epoch: Mjd,
        duration: f64,
        npol: usize,
        nchan: usize,
        nbin: usize,
        frequencies: Vec<f64>,
        weights: Vec<f32>,
        profiles: Vec<Profile>,
    ) -> Self {
        Integration {
            epoch,
            duration,
            npol,
            nchan,
            nbin,
            frequencies,
            weights,
            profiles,
            extensions: Registry::new(),
        }
    }

    /// Mid-point epoch
    pub fn epoch(&self) -> Mjd {
        self.epoch
    }

    /// Set the mid-point epoch
    pub fn set_epoch(&mut self, epoch: Mjd) {
        self.epoch = epoch;
    }

    /// Integration length in seconds
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Set the integration length in seconds
    pub fn set_duration(&mut self, seconds: f64) {
        self.duration = seconds;
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

    /// Channel centre frequencies, MHz
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Centre frequency of `ichan`
    pub fn frequency(&self, ichan: usize) -> Result<f64> {
        self.check_chan(ichan)?;
        Ok(self.frequencies[ichan])
    }

    /// Set the centre frequency of `ichan`
    pub fn set_frequency(&mut self, ichan: usize, mhz: f64) -> Result<()> {
        self.check_chan(ichan)?;
        self.frequencies[ichan] = mhz;
        Ok(())
    }

    /// Channel weights
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight of `ichan`
    pub fn weight(&self, ichan: usize) -> Result<f32> {
        self.check_chan(ichan)?;
        Ok(self.weights[ichan])
    }

    /// Set the weight of `ichan`; zero excludes the channel
    pub fn set_weight(&mut self, ichan: usize, weight: f32) -> Result<()> {
        self.check_chan(ichan)?;
        self.weights[ichan] = weight;
        Ok(())
    }

    /// Profile of polarization `ipol`, channel `ichan`
    pub fn profile(&self, ipol: usize, ichan: usize) -> Result<&Profile> {
        let index = self.profile_index(ipol, ichan)?;
        Ok(&self.profiles[index])
    }

    /// Mutable profile of polarization `ipol`, channel `ichan`
    pub fn profile_mut(&mut self, ipol: usize, ichan: usize) -> Result<&mut Profile> {
        let index = self.profile_index(ipol, ichan)?;
        Ok(&mut self.profiles[index])
    }

    /// All profiles, polarization-major
    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Change the number of phase bins of every profile
    pub fn resize_nbin(&mut self, nbin: usize) -> Result<()> {
        for profile in &mut self.profiles {
            profile.resize(nbin)?;
        }
        self.nbin = nbin;
        Ok(())
    }

    /// Extension of kind `T`, if attached
    pub fn get<T: Extension<IntegrationExtension>>(&self) -> Option<&T> {
        self.extensions.find::<T>()
    }

    /// Extension of kind `T`, attaching a default one if absent
    pub fn getadd<T: Extension<IntegrationExtension>>(&mut self) -> &mut T {
        self.extensions.get_or_create::<T>()
    }

    /// Attach `ext`, returning the previous extension of that kind
    pub fn add_extension<T: Extension<IntegrationExtension>>(&mut self, ext: T) -> Option<T> {
        self.extensions.attach(ext)
    }

    /// Detach the extension of kind `T`
    pub fn remove_extension<T: Extension<IntegrationExtension>>(&mut self) -> Option<T> {
        self.extensions.remove::<T>()
    }

    /// Attached extensions
    pub fn extensions(&self) -> &Registry<IntegrationExtension> {
        &self.extensions
    }

    fn check_chan(&self, ichan: usize) -> Result<()> {
        if ichan >= self.nchan {
            return Err(Error::invalid_param(format!(
                "channel {} of {}",
                ichan, self.nchan
            )));
        }
        Ok(())
    }

    fn profile_index(&self, ipol: usize, ichan: usize) -> Result<usize> {
        if ipol >= self.npol {
            return Err(Error::invalid_param(format!(
                "polarization {} of {}",
                ipol, self.npol
            )));
        }
        self.check_chan(ichan)?;
        Ok(ipol * self.nchan + ichan)
    }
}
