//! Archive engine for psrstore
//!
//! This crate ties the lower layers together:
//! - Model: [`Archive`], [`Integration`], [`Profile`]
//! - Extensions: optional metadata blocks held in a typed [`Registry`]
//! - Deferred loading of bulk data on first access
//! - Codec: versioned mapping between archives and containers
//! - Configuration: [`StoreConfig`] and the container template
//!
//! ```no_run
//! use psrstore_engine::{Archive, ObsInfo};
//!
//! # fn main() -> psrstore_core::Result<()> {
//! let mut archive = Archive::load("J0437-4715.ar")?;
//! archive.getadd::<ObsInfo>().observer = "wvs".to_string();
//! archive.record_history("relabel");
//! archive.unload("J0437-4715.ar")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod deferred;
pub mod extensions;
pub mod model;
pub mod registry;

pub use codec::migration::{LegacyLabel, LegacyName, LEGACY_LABELS, LEGACY_NAMES};
pub use codec::Revision;
pub use config::{builtin_template, StoreConfig, CONFIG_FILE_NAME, TEMPLATE_ENV};
pub use deferred::{Deferred, DeferredState, Loader};
pub use extensions::{
    ArchiveExtension, Basis, CalChannel, FeedTracking, HeaderInfo, HistoryRow, IntegrationExtension,
    KurtosisData, ObsInfo, Pointing, PolnCalibratorExtension, ProcessingHistory, Receiver,
    SpectralKurtosis, UnknownRecord,
};
pub use model::{Archive, Integration, ObservationType, PolnState, Profile};
pub use registry::{Extension, ExtensionSlot, Registry, SlotTag};
