//! Spectral kurtosis statistics of one integration

use psrstore_core::{Error, Result};

use crate::deferred::{Deferred, DeferredState, Loader};

/// Accumulated sums and hit counts
///
/// Sums are indexed `ipol * nchan + ichan`; hit counts by channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KurtosisData {
    /// Sum over filtered samples
    pub filtered_sum: Vec<f32>,
    /// Filtered hits per channel
    pub filtered_hits: Vec<u64>,
    /// Sum over unfiltered samples
    pub unfiltered_sum: Vec<f32>,
    /// Unfiltered hits per channel
    pub unfiltered_hits: Vec<u64>,
}

impl KurtosisData {
    /// Zero-filled data for the given dimensions
    pub fn zeroed(npol: usize, nchan: usize) -> Self {
        KurtosisData {
            filtered_sum: vec![0.0; npol * nchan],
            filtered_hits: vec![0; nchan],
            unfiltered_sum: vec![0.0; npol * nchan],
            unfiltered_hits: vec![0; nchan],
        }
    }

    pub(crate) fn check(&self, npol: usize, nchan: usize) -> Result<()> {
        let sums = npol * nchan;
        if self.filtered_sum.len() != sums
            || self.unfiltered_sum.len() != sums
            || self.filtered_hits.len() != nchan
            || self.unfiltered_hits.len() != nchan
        {
            return Err(Error::invalid_param(format!(
                "spectral kurtosis data does not match npol={} nchan={}",
                npol, nchan
            )));
        }
        Ok(())
    }
}

/// Spectral kurtosis extension
///
/// The bulk sums may be deferred until first accessed.
#[derive(Debug, Clone, Default)]
pub struct SpectralKurtosis {
    npol: usize,
    nchan: usize,
    /// Number of samples integrated per estimate
    pub integration_factor: u32,
    /// Excision threshold in standard deviations
    pub excision_threshold: f32,
    data: Deferred<KurtosisData>,
}

impl SpectralKurtosis {
    /// Zero-filled statistics
    pub fn new(npol: usize, nchan: usize, integration_factor: u32, excision_threshold: f32) -> Self {
        SpectralKurtosis {
            npol,
            nchan,
            integration_factor,
            excision_threshold,
            data: Deferred::new(KurtosisData::zeroed(npol, nchan)),
        }
    }

    pub(crate) fn deferred(
        npol: usize,
        nchan: usize,
        integration_factor: u32,
        excision_threshold: f32,
        loader: Box<dyn Loader<KurtosisData>>,
    ) -> Self {
        SpectralKurtosis {
            npol,
            nchan,
            integration_factor,
            excision_threshold,
            data: Deferred::lazy(loader),
        }
    }

    /// Number of polarizations
    pub fn npol(&self) -> usize {
        self.npol
    }

    /// Number of channels
    pub fn nchan(&self) -> usize {
        self.nchan
    }

    /// Sums and hit counts, loading them if needed
    pub fn data(&self) -> Result<&KurtosisData> {
        self.data.get()
    }

    /// Mutable sums and hit counts
    pub fn data_mut(&mut self) -> Result<&mut KurtosisData> {
        self.data.get_mut()
    }

    /// Replace sums and hit counts; dimensions must match
    pub fn set_data(&mut self, data: KurtosisData) -> Result<()> {
        data.check(self.npol, self.nchan)?;
        self.data.set(data);
        Ok(())
    }

    /// Whether the data has been loaded
    pub fn data_state(&self) -> DeferredState {
        self.data.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_data_checks_dimensions() {
        let mut sk = SpectralKurtosis::new(2, 4, 1024, 3.0);
        assert_eq!(sk.data().unwrap().filtered_sum.len(), 8);
        assert!(sk.set_data(KurtosisData::zeroed(1, 4)).is_err());

        let mut data = KurtosisData::zeroed(2, 4);
        data.filtered_hits[3] = 17;
        sk.set_data(data).unwrap();
        assert_eq!(sk.data().unwrap().filtered_hits[3], 17);
    }
}
