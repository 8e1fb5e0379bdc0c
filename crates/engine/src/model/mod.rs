//! In-memory archive model
//!
//! An [`Archive`] owns its [`Integration`]s, each of which owns
//! `npol * nchan` [`Profile`]s of `nbin` samples.

mod archive;
mod integration;
mod profile;
mod state;

pub use archive::Archive;
pub use integration::Integration;
pub use profile::Profile;
pub use state::{ObservationType, PolnState};
