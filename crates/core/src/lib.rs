//! Core types for psrstore
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: typed error hierarchy with call-path context
//! - Mjd / SkyCoord: epoch and sky position units
//! - Limits: size limits enforced when decoding containers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod units;

pub use error::{Error, Result, ResultExt};
pub use limits::Limits;
pub use units::{Frame, Mjd, SkyCoord, SECONDS_PER_DAY};
