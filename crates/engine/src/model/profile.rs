//! One pulse profile: the samples of one polarization and channel

use psrstore_core::{Error, Result};
use psrstore_storage::{AmpBuffer, AmpStorage};

use crate::deferred::{Deferred, DeferredState, Loader};

/// Phase-resolved samples of one (polarization, channel) pair
///
/// Samples may be deferred: a profile read from a file holds a loader and
/// decodes its samples on first access. Optional higher moments (one per
/// bin) follow the same pattern.
#[derive(Debug, Clone)]
pub struct Profile {
    nbin: usize,
    storage: AmpStorage,
    amps: Deferred<AmpBuffer>,
    moments: Option<Deferred<Vec<f32>>>,
}

impl Profile {
    /// Zero-filled profile of `nbin` samples
    pub fn new(nbin: usize, storage: &AmpStorage) -> Result<Self> {
        Ok(Profile {
            nbin,
            storage: storage.clone(),
            amps: Deferred::new(storage.zeroed(nbin)?),
            moments: None,
        })
    }

    pub(crate) fn deferred(nbin: usize, storage: &AmpStorage, loader: Box<dyn Loader<AmpBuffer>>) -> Self {
        Profile {
            nbin,
            storage: storage.clone(),
            amps: Deferred::lazy(loader),
            moments: None,
        }
    }

    /// Number of phase bins
    pub fn nbin(&self) -> usize {
        self.nbin
    }

    /// Where samples are allocated
    pub fn storage(&self) -> &AmpStorage {
        &self.storage
    }

    /// Samples, loading them if needed
    pub fn get_amps(&self) -> Result<&[f32]> {
        self.amps.get().map(|amps| &**amps)
    }

    /// Mutable samples, loading them if needed
    pub fn get_amps_mut(&mut self) -> Result<&mut [f32]> {
        self.amps.get_mut().map(|amps| &mut **amps)
    }

    /// Replace all samples; `amps.len()` must equal `nbin`
    pub fn set_amps(&mut self, amps: &[f32]) -> Result<()> {
        if amps.len() != self.nbin {
            return Err(Error::invalid_param(format!(
                "profile has {} bins, got {} samples",
                self.nbin,
                amps.len()
            )));
        }
        self.amps.set(self.storage.from_slice(amps)?);
        Ok(())
    }

    /// Whether samples have been loaded
    pub fn amps_state(&self) -> DeferredState {
        self.amps.state()
    }

    /// Change the number of bins, keeping the leading samples
    pub fn resize(&mut self, nbin: usize) -> Result<()> {
        self.amps.get_mut()?.resize(nbin)?;
        if let Some(moments) = self.moments.as_mut() {
            moments.get_mut()?.resize(nbin, 0.0);
        }
        self.nbin = nbin;
        Ok(())
    }

    /// Higher moments, one per bin, if present
    pub fn moments(&self) -> Result<Option<&[f32]>> {
        match &self.moments {
            Some(moments) => Ok(Some(moments.get()?.as_slice())),
            None => Ok(None),
        }
    }

    /// True if moments are attached
    pub fn has_moments(&self) -> bool {
        self.moments.is_some()
    }

    /// Attach or remove moments; length must equal `nbin`
    pub fn set_moments(&mut self, moments: Option<Vec<f32>>) -> Result<()> {
        if let Some(values) = &moments {
            if values.len() != self.nbin {
                return Err(Error::invalid_param(format!(
                    "profile has {} bins, got {} moments",
                    self.nbin,
                    values.len()
                )));
            }
        }
        self.moments = moments.map(Deferred::new);
        Ok(())
    }

    pub(crate) fn set_moments_loader(&mut self, loader: Box<dyn Loader<Vec<f32>>>) {
        self.moments = Some(Deferred::lazy(loader));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psrstore_storage::SwapArena;
    use std::sync::Arc;

    #[test]
    fn test_set_amps_checks_length() {
        let mut profile = Profile::new(4, &AmpStorage::Heap).unwrap();
        assert!(profile.set_amps(&[1.0, 2.0]).is_err());
        profile.set_amps(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(profile.get_amps().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_resize_keeps_prefix() {
        let mut profile = Profile::new(4, &AmpStorage::Heap).unwrap();
        profile.set_amps(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        profile.set_moments(Some(vec![0.5; 4])).unwrap();

        profile.resize(2).unwrap();
        assert_eq!(profile.get_amps().unwrap(), &[1.0, 2.0]);
        assert_eq!(profile.moments().unwrap().unwrap().len(), 2);

        profile.resize(3).unwrap();
        assert_eq!(profile.get_amps().unwrap(), &[1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_swap_backed_profile() {
        let storage = AmpStorage::Swap(Arc::new(SwapArena::new().unwrap()));
        let mut profile = Profile::new(64, &storage).unwrap();
        profile.get_amps_mut().unwrap()[10] = 3.5;
        assert_eq!(profile.get_amps().unwrap()[10], 3.5);
        assert!(profile.storage().is_swap());
    }
}
