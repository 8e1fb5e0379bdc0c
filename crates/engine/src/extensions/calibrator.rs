//! Polarization calibrator solution

use psrstore_core::{Error, Mjd, Result};

/// Model solution for one channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalChannel {
    /// False if no solution exists for this channel
    pub valid: bool,
    /// Model parameters, `nparam` values
    pub params: Vec<f64>,
    /// Variance of each parameter
    pub variance: Vec<f64>,
}

impl CalChannel {
    /// Channel with no solution
    pub fn invalid(nparam: usize) -> Self {
        CalChannel {
            valid: false,
            params: vec![0.0; nparam],
            variance: vec![0.0; nparam],
        }
    }
}

/// Per-channel polarization calibrator model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolnCalibratorExtension {
    /// Model name (`SINGLE`, `BRITTON`, ...)
    pub model: String,
    nparam: usize,
    /// Epoch of the calibrator observation
    pub epoch: Option<Mjd>,
    /// Channel centre frequencies, MHz
    pub frequencies: Vec<f64>,
    channels: Vec<CalChannel>,
}

impl PolnCalibratorExtension {
    /// `nchan` invalid channels of an `nparam`-parameter model
    pub fn new(model: &str, nparam: usize, nchan: usize) -> Self {
        PolnCalibratorExtension {
            model: model.to_string(),
            nparam,
            epoch: None,
            frequencies: vec![0.0; nchan],
            channels: vec![CalChannel::invalid(nparam); nchan],
        }
    }

    /// Parameters per channel
    pub fn nparam(&self) -> usize {
        self.nparam
    }

    /// Number of channels
    pub fn nchan(&self) -> usize {
        self.channels.len()
    }

    /// All channels
    pub fn channels(&self) -> &[CalChannel] {
        &self.channels
    }

    /// One channel
    pub fn channel(&self, ichan: usize) -> Result<&CalChannel> {
        self.channels.get(ichan).ok_or_else(|| {
            Error::invalid_param(format!("channel {} of {}", ichan, self.channels.len()))
        })
    }

    /// Install a solution for `ichan`
    pub fn set_solution(&mut self, ichan: usize, params: Vec<f64>, variance: Vec<f64>) -> Result<()> {
        if params.len() != self.nparam || variance.len() != self.nparam {
            return Err(Error::invalid_param(format!(
                "calibrator solution needs {} parameters",
                self.nparam
            )));
        }
        let nchan = self.channels.len();
        let channel = self
            .channels
            .get_mut(ichan)
            .ok_or_else(|| Error::invalid_param(format!("channel {} of {}", ichan, nchan)))?;
        *channel = CalChannel {
            valid: true,
            params,
            variance,
        };
        Ok(())
    }

    /// Mark `ichan` as having no solution
    pub fn set_invalid(&mut self, ichan: usize) -> Result<()> {
        let nparam = self.nparam;
        let nchan = self.channels.len();
        let channel = self
            .channels
            .get_mut(ichan)
            .ok_or_else(|| Error::invalid_param(format!("channel {} of {}", ichan, nchan)))?;
        *channel = CalChannel::invalid(nparam);
        Ok(())
    }

    /// Number of channels with a solution
    pub fn valid_count(&self) -> usize {
        self.channels.iter().filter(|c| c.valid).count()
    }

    pub(crate) fn from_parts(
        model: String,
        nparam: usize,
        epoch: Option<Mjd>,
        frequencies: Vec<f64>,
        channels: Vec<CalChannel>,
    ) -> Self {
        PolnCalibratorExtension {
            model,
            nparam,
            epoch,
            frequencies,
            channels,
        }
    }
}
