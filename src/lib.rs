//! psrstore - persistence engine for pulsar observation archives
//!
//! An [`Archive`] holds folded pulse profiles organised as
//! integrations × polarizations × channels × phase bins, plus optional
//! metadata extensions. Archives are stored as versioned binary containers
//! and written atomically: a failed or interrupted unload never damages the
//! file already on disk.
//!
//! # Quick Start
//!
//! ```no_run
//! use psrstore::{Archive, ObsInfo, StoreConfig};
//!
//! # fn main() -> psrstore::Result<()> {
//! let mut archive = Archive::new(4, 1, 64, 1024)?;
//! archive.source = "J0437-4715".to_string();
//! archive.getadd::<ObsInfo>().telescope = "Parkes".to_string();
//! archive.unload("J0437-4715.psrc")?;
//!
//! // profile samples are decoded on first access
//! let loaded = Archive::load_with("J0437-4715.psrc", &StoreConfig::default())?;
//! let amps = loaded.integration(0)?.profile(0, 0)?.get_amps()?;
//! assert_eq!(amps.len(), 1024);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `psrstore-core`: errors, units, decode limits
//! - `psrstore-storage`: heap or swap-arena sample buffers
//! - `psrstore-durability`: container format and atomic persist
//! - `psrstore-engine`: archive model, extensions, codec

pub use psrstore_core::{Error, Frame, Limits, Mjd, Result, ResultExt, SkyCoord};
pub use psrstore_durability::{Container, PersistReport, Record, Template};
pub use psrstore_engine::*;
pub use psrstore_storage::{AmpBuffer, AmpStorage, ArenaStats, SwapArena};

/// Remove pending persist temporaries when SIGINT or SIGTERM arrives
///
/// Call once at program start. Without it an interrupted unload can leave a
/// hidden temporary file next to its destination (the destination itself is
/// never damaged).
#[cfg(feature = "termination")]
pub fn install_cleanup_handler() -> Result<()> {
    psrstore_durability::install_signal_cleanup()
}
